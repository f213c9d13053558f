//! Node references and the kinds attached to pipeline nodes.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// A reference to a node of the combined dependency graph.
///
/// Actions and resource nodes live in separate namespaces, so an action and a
/// resource may share a name without clashing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeRef {
    /// An action, addressed by its pipeline-unique name.
    Action(String),
    /// A resource node, addressed by its id.
    Resource(String),
}

impl NodeRef {
    /// Creates an action reference.
    #[must_use]
    pub fn action(name: impl Into<String>) -> Self {
        Self::Action(name.into())
    }

    /// Creates a resource reference.
    #[must_use]
    pub fn resource(id: impl Into<String>) -> Self {
        Self::Resource(id.into())
    }

    /// Returns the bare name or id.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Action(name) | Self::Resource(name) => name,
        }
    }

    /// Returns true for action references.
    #[must_use]
    pub fn is_action(&self) -> bool {
        matches!(self, Self::Action(_))
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Action(name) => write!(f, "action:{name}"),
            Self::Resource(id) => write!(f, "resource:{id}"),
        }
    }
}

impl FromStr for NodeRef {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some(("action", name)) if !name.is_empty() => Ok(Self::action(name)),
            Some(("resource", id)) if !id.is_empty() => Ok(Self::resource(id)),
            _ => Err(format!("invalid node reference '{s}'")),
        }
    }
}

impl Serialize for NodeRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for NodeRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// The kind of work an action performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Fetches source from a repository or object store.
    Source,
    /// Turns an input artifact into a build output.
    Build,
    /// Rolls an artifact out to a deployment target.
    Deploy,
    /// Anything else; must be bound to an explicit capability.
    #[default]
    Generic,
}

impl ActionKind {
    /// Returns the capability an action of this kind binds to by default.
    #[must_use]
    pub fn default_capability(self) -> Option<Capability> {
        match self {
            Self::Source => Some(Capability::SourceFetch),
            Self::Build => Some(Capability::Build),
            Self::Deploy => Some(Capability::Deploy),
            Self::Generic => None,
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Source => write!(f, "source"),
            Self::Build => write!(f, "build"),
            Self::Deploy => write!(f, "deploy"),
            Self::Generic => write!(f, "generic"),
        }
    }
}

/// External provider capability a node is executed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// `FetchSource(repositoryRef)`.
    SourceFetch,
    /// `RunBuild(buildRef, inputArtifact)`.
    Build,
    /// `WriteStorage(artifact, destinationKey)`.
    StoreWrite,
    /// `Deploy(targetRef, artifact, versionLabel)`.
    Deploy,
    /// Provisioning of resource nodes.
    Provision,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SourceFetch => write!(f, "source_fetch"),
            Self::Build => write!(f, "build"),
            Self::StoreWrite => write!(f, "store_write"),
            Self::Deploy => write!(f, "deploy"),
            Self::Provision => write!(f, "provision"),
        }
    }
}

/// Rule deciding when a stage is complete enough to unblock the next one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BarrierPolicy {
    /// Every action must succeed.
    #[default]
    AllOf,
    /// At least one action must succeed (alternate sources).
    AnyOf,
}

impl fmt::Display for BarrierPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AllOf => write!(f, "all_of"),
            Self::AnyOf => write!(f, "any_of"),
        }
    }
}

/// The kind of provisioned side effect a resource node stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// A source repository.
    Repository,
    /// An object storage bucket.
    Bucket,
    /// A build project definition.
    BuildProject,
    /// A write of objects into storage.
    StorageWrite,
    /// A hosted application.
    Application,
    /// A deployable application version.
    ApplicationVersion,
    /// A running environment of an application.
    Environment,
    /// Anything else.
    #[default]
    Generic,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_ref_display_and_parse() {
        let node = NodeRef::action("Build");
        assert_eq!(node.to_string(), "action:Build");
        assert_eq!("resource:CodeBucket".parse::<NodeRef>(), Ok(NodeRef::resource("CodeBucket")));
        assert!("bucket:x".parse::<NodeRef>().is_err());
        assert!("action:".parse::<NodeRef>().is_err());
    }

    #[test]
    fn test_node_ref_serializes_as_string() {
        let json = serde_json::to_string(&NodeRef::resource("AppVersion")).unwrap();
        assert_eq!(json, r#""resource:AppVersion""#);

        let back: NodeRef = serde_json::from_str(&json).unwrap();
        assert_eq!(back, NodeRef::resource("AppVersion"));
    }

    #[test]
    fn test_action_kind_default_capability() {
        assert_eq!(ActionKind::Source.default_capability(), Some(Capability::SourceFetch));
        assert_eq!(ActionKind::Deploy.default_capability(), Some(Capability::Deploy));
        assert_eq!(ActionKind::Generic.default_capability(), None);
    }

    #[test]
    fn test_kinds_serialize_snake_case() {
        assert_eq!(serde_json::to_string(&Capability::StoreWrite).unwrap(), r#""store_write""#);
        assert_eq!(serde_json::to_string(&BarrierPolicy::AnyOf).unwrap(), r#""any_of""#);
        assert_eq!(
            serde_json::to_string(&ResourceKind::ApplicationVersion).unwrap(),
            r#""application_version""#
        );
    }
}

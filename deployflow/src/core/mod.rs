//! Core domain types for deployflow.
//!
//! This module contains the vocabulary shared by every other module:
//! - Node references, action kinds and provider capabilities
//! - Node, stage and run statuses
//! - Runtime handles returned by providers

mod handles;
mod node;
mod status;

pub use handles::{ArtifactHandle, DeployReceipt, ProvisionedResource, StoredObject};
pub use node::{ActionKind, BarrierPolicy, Capability, NodeRef, ResourceKind};
pub use status::{NodeStatus, OverallStatus, SkipReason, StageOutcome};

//! Scripted providers for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::cancellation::CancellationToken;
use crate::core::{
    ArtifactHandle, Capability, DeployReceipt, ProvisionedResource, StoredObject,
};
use crate::errors::ProviderError;
use crate::pipeline::ResourceNode;
use crate::providers::{
    BuildProvider, DeployProvider, ResourceProvisioner, SourceProvider, StorageProvider,
};

/// One recorded provider call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderCall {
    /// The capability invoked.
    pub capability: Capability,
    /// Repository, project, destination key, target or resource id.
    pub reference: String,
    /// URIs of the input artifacts.
    pub inputs: Vec<String>,
    /// Version label of deploy calls.
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Copy, Default)]
enum Failures {
    #[default]
    Never,
    Times(u32),
    Always,
}

#[derive(Debug, Clone, Default)]
struct Script {
    failures: Failures,
    permanent: bool,
    panic: bool,
    delay: Option<Duration>,
    cancel: Option<Arc<CancellationToken>>,
}

impl Script {
    fn next_failure(&mut self) -> bool {
        match self.failures {
            Failures::Never => false,
            Failures::Always => true,
            Failures::Times(0) => false,
            Failures::Times(n) => {
                self.failures = Failures::Times(n - 1);
                true
            }
        }
    }
}

/// A provider for every capability whose behaviour is scripted per reference.
///
/// References are the binding values the executor passes: repository, build
/// project, destination key, deploy target, or resource id. Default bindings
/// use the action name, so scripting by action name works for them.
/// Unscripted references succeed.
#[derive(Debug, Default)]
pub struct ScriptedProvider {
    scripts: Mutex<HashMap<String, Script>>,
    calls: Mutex<Vec<ProviderCall>>,
    latency: Option<Duration>,
    sequence: AtomicU64,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedProvider {
    /// Creates a provider where every call succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a shared provider.
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Adds latency to every call.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    fn script(&self, reference: &str, apply: impl FnOnce(&mut Script)) {
        apply(self.scripts.lock().entry(reference.to_string()).or_default());
    }

    /// Fails the first `times` calls for `reference` with a retryable error.
    pub fn fail_times(&self, reference: &str, times: u32) {
        self.script(reference, |s| s.failures = Failures::Times(times));
    }

    /// Fails every call for `reference` with a retryable error.
    pub fn fail_always(&self, reference: &str) {
        self.script(reference, |s| s.failures = Failures::Always);
    }

    /// Fails every call for `reference` with a non-retryable error.
    pub fn fail_permanently(&self, reference: &str) {
        self.script(reference, |s| {
            s.failures = Failures::Always;
            s.permanent = true;
        });
    }

    /// Panics inside calls for `reference`.
    pub fn panic_on(&self, reference: &str) {
        self.script(reference, |s| s.panic = true);
    }

    /// Delays calls for `reference`.
    pub fn delay(&self, reference: &str, delay: Duration) {
        self.script(reference, |s| s.delay = Some(delay));
    }

    /// Cancels `token` when `reference` is called.
    pub fn cancel_on(&self, reference: &str, token: Arc<CancellationToken>) {
        self.script(reference, |s| s.cancel = Some(token));
    }

    /// Every call in arrival order.
    #[must_use]
    pub fn calls(&self) -> Vec<ProviderCall> {
        self.calls.lock().clone()
    }

    /// Number of calls for `reference`.
    #[must_use]
    pub fn calls_for(&self, reference: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.reference == reference).count()
    }

    /// Total number of calls.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Highest number of calls observed in flight at once.
    #[must_use]
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    async fn respond(&self, call: ProviderCall) -> Result<u64, ProviderError> {
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let capability = call.capability;
        let reference = call.reference.clone();
        self.calls.lock().push(call);

        let (fail, script) = {
            let mut scripts = self.scripts.lock();
            match scripts.get_mut(&reference) {
                Some(script) => (script.next_failure(), script.clone()),
                None => (false, Script::default()),
            }
        };

        if let Some(token) = &script.cancel {
            token.cancel(format!("cancelled by {reference}"));
        }

        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);
        if let Some(delay) = script.delay.or(self.latency) {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if script.panic {
            panic!("scripted panic in {reference}");
        }
        if fail {
            let message = format!("scripted failure in {reference}");
            return Err(if script.permanent {
                ProviderError::permanent(capability, message)
            } else {
                ProviderError::call(capability, message)
            });
        }
        Ok(seq)
    }
}

fn call(capability: Capability, reference: &str, inputs: &[&ArtifactHandle]) -> ProviderCall {
    ProviderCall {
        capability,
        reference: reference.to_string(),
        inputs: inputs.iter().map(|h| h.uri.clone()).collect(),
        detail: None,
    }
}

#[async_trait]
impl SourceProvider for ScriptedProvider {
    async fn fetch_source(&self, repository: &str) -> Result<ArtifactHandle, ProviderError> {
        let seq = self.respond(call(Capability::SourceFetch, repository, &[])).await?;
        Ok(ArtifactHandle::new(format!("source://{repository}/{seq}")))
    }
}

#[async_trait]
impl BuildProvider for ScriptedProvider {
    async fn run_build(
        &self,
        project: &str,
        inputs: &[ArtifactHandle],
    ) -> Result<ArtifactHandle, ProviderError> {
        let refs: Vec<&ArtifactHandle> = inputs.iter().collect();
        let seq = self.respond(call(Capability::Build, project, &refs)).await?;
        Ok(ArtifactHandle::new(format!("build://{project}/{seq}"))
            .with_metadata("inputs", inputs.len().to_string()))
    }
}

#[async_trait]
impl StorageProvider for ScriptedProvider {
    async fn write_storage(
        &self,
        artifact: &ArtifactHandle,
        destination_key: &str,
    ) -> Result<StoredObject, ProviderError> {
        let seq = self
            .respond(call(Capability::StoreWrite, destination_key, &[artifact]))
            .await?;
        Ok(StoredObject::new(format!("store://{destination_key}")).with_version(seq.to_string()))
    }
}

#[async_trait]
impl DeployProvider for ScriptedProvider {
    async fn deploy(
        &self,
        target: &str,
        artifact: &ArtifactHandle,
        version_label: &str,
    ) -> Result<DeployReceipt, ProviderError> {
        let mut record = call(Capability::Deploy, target, &[artifact]);
        record.detail = Some(version_label.to_string());
        let seq = self.respond(record).await?;
        Ok(DeployReceipt::new(format!("{target}-{seq}"), version_label))
    }
}

#[async_trait]
impl ResourceProvisioner for ScriptedProvider {
    async fn provision(&self, resource: &ResourceNode) -> Result<ProvisionedResource, ProviderError> {
        self.respond(call(Capability::Provision, &resource.id, &[])).await?;
        Ok(ProvisionedResource::new(format!("physical:{}", resource.id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ResourceKind;

    #[tokio::test]
    async fn test_fail_times_then_succeed() {
        let provider = ScriptedProvider::new();
        provider.fail_times("repo", 2);

        assert!(provider.fetch_source("repo").await.is_err());
        let err = provider.fetch_source("repo").await.unwrap_err();
        assert!(err.is_retryable());
        let handle = provider.fetch_source("repo").await.unwrap();

        assert_eq!(handle.uri, "source://repo/3");
        assert_eq!(provider.calls_for("repo"), 3);
    }

    #[tokio::test]
    async fn test_permanent_failure() {
        let provider = ScriptedProvider::new();
        provider.fail_permanently("proj");
        let err = provider.run_build("proj", &[]).await.unwrap_err();
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_records_inputs_and_labels() {
        let provider = ScriptedProvider::new();
        let bundle = ArtifactHandle::new("build://app/1");

        provider.write_storage(&bundle, "code.zip").await.unwrap();
        let receipt = provider.deploy("prod", &bundle, "v-1").await.unwrap();
        provider
            .provision(&ResourceNode::new("Bucket", ResourceKind::Bucket))
            .await
            .unwrap();

        assert_eq!(receipt.version_label, "v-1");
        let calls = provider.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0].inputs, vec!["build://app/1".to_string()]);
        assert_eq!(calls[1].detail.as_deref(), Some("v-1"));
        assert_eq!(calls[2].capability, Capability::Provision);
    }

    #[tokio::test]
    async fn test_cancel_on_call() {
        let provider = ScriptedProvider::new();
        let token = CancellationToken::shared();
        provider.cancel_on("repo", token.clone());

        provider.fetch_source("repo").await.unwrap();
        assert_eq!(token.reason().as_deref(), Some("cancelled by repo"));
    }
}

//! Executor configuration.

use crate::errors::LoadError;
use crate::pipeline::{FailureMode, RetryConfig};
use serde::{Deserialize, Serialize};

fn default_max_concurrency() -> usize {
    8
}

fn default_version_label_prefix() -> String {
    "v-".to_string()
}

/// Configuration for [`PipelineExecutor`](crate::executor::PipelineExecutor).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// What a fatal failure does to nodes that have not started.
    #[serde(default)]
    pub failure_mode: FailureMode,
    /// Maximum provider calls in flight within one batch.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Retry policy for nodes that declare none.
    #[serde(default)]
    pub default_retry: RetryConfig,
    /// Per-attempt timeout for nodes that declare none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_timeout_ms: Option<u64>,
    /// Prefix for generated deploy version labels.
    #[serde(default = "default_version_label_prefix")]
    pub version_label_prefix: String,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            failure_mode: FailureMode::default(),
            max_concurrency: default_max_concurrency(),
            default_retry: RetryConfig::default(),
            node_timeout_ms: None,
            version_label_prefix: default_version_label_prefix(),
        }
    }
}

impl ExecutorConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a JSON configuration.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::Json`] on malformed input.
    pub fn from_json_str(content: &str) -> Result<Self, LoadError> {
        Ok(serde_json::from_str(content)?)
    }

    /// Parses a YAML configuration.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::Yaml`] on malformed input.
    pub fn from_yaml_str(content: &str) -> Result<Self, LoadError> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Sets the failure mode.
    #[must_use]
    pub fn with_failure_mode(mut self, mode: FailureMode) -> Self {
        self.failure_mode = mode;
        self
    }

    /// Sets the concurrency bound. Zero is treated as one.
    #[must_use]
    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max.max(1);
        self
    }

    /// Sets the default retry policy.
    #[must_use]
    pub fn with_default_retry(mut self, retry: RetryConfig) -> Self {
        self.default_retry = retry;
        self
    }

    /// Sets the default per-attempt timeout.
    #[must_use]
    pub fn with_node_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.node_timeout_ms = Some(timeout_ms);
        self
    }

    /// Sets the version label prefix.
    #[must_use]
    pub fn with_version_label_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.version_label_prefix = prefix.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ExecutorConfig::default();
        assert_eq!(config.failure_mode, FailureMode::FailFast);
        assert_eq!(config.max_concurrency, 8);
        assert_eq!(config.default_retry.max_retries, 0);
        assert!(config.node_timeout_ms.is_none());
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config = ExecutorConfig::from_yaml_str(
            "failure_mode: continue_on_failure\ndefault_retry:\n  max_retries: 3\n",
        )
        .unwrap();
        assert_eq!(config.failure_mode, FailureMode::ContinueOnFailure);
        assert_eq!(config.default_retry.max_retries, 3);
        assert_eq!(config.default_retry.base_delay_ms, 200);
        assert_eq!(config.max_concurrency, 8);
        assert_eq!(config.version_label_prefix, "v-");
    }

    #[test]
    fn test_json_config() {
        let config = ExecutorConfig::from_json_str(r#"{"max_concurrency": 2, "node_timeout_ms": 500}"#).unwrap();
        assert_eq!(config.max_concurrency, 2);
        assert_eq!(config.node_timeout_ms, Some(500));
        assert!(ExecutorConfig::from_json_str("{").is_err());
    }

    #[test]
    fn test_zero_concurrency_clamped() {
        assert_eq!(ExecutorConfig::new().with_max_concurrency(0).max_concurrency, 1);
    }
}

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Langfuse backend configuration: credentials plus delivery tuning for
/// the batching ingestion client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LangfuseConfig {
    /// Base URL of the Langfuse deployment.
    #[serde(default = "default_host")]
    pub host: String,

    /// Public API key (basic-auth username). Required.
    #[serde(default)]
    pub public_key: String,

    /// Secret API key (basic-auth password). Required.
    #[serde(default)]
    pub secret_key: String,

    /// Maximum time a queued entity waits before delivery, in ms.
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,

    /// Maximum entities per ingestion request.
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    /// Queue capacity; entities beyond it are dropped.
    #[serde(default = "default_max_pending_items")]
    pub max_pending_items: usize,

    /// Bound on the shutdown flush, in seconds.
    #[serde(default = "default_flush_timeout_secs")]
    pub flush_timeout_secs: u64,
}

impl LangfuseConfig {
    pub fn flush_timeout(&self) -> Duration {
        Duration::from_secs(self.flush_timeout_secs)
    }

    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        if url::Url::parse(&self.host).is_err() {
            return Err(ConfigError::Validation(format!(
                "langfuse.host is not a valid URL: {}",
                self.host
            )));
        }
        if self.public_key.is_empty() || self.secret_key.is_empty() {
            return Err(ConfigError::Validation(
                "langfuse.public_key and langfuse.secret_key are required \
                 (set LANGFUSE_PUBLIC_KEY / LANGFUSE_SECRET_KEY)"
                    .into(),
            ));
        }
        if self.max_batch_size == 0 || self.max_pending_items == 0 {
            return Err(ConfigError::Validation(
                "langfuse batch limits must be nonzero".into(),
            ));
        }
        Ok(())
    }
}

impl Default for LangfuseConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            public_key: String::new(),
            secret_key: String::new(),
            flush_interval_ms: default_flush_interval_ms(),
            max_batch_size: default_max_batch_size(),
            max_pending_items: default_max_pending_items(),
            flush_timeout_secs: default_flush_timeout_secs(),
        }
    }
}

fn default_host() -> String {
    "https://cloud.langfuse.com".to_string()
}

fn default_flush_interval_ms() -> u64 {
    1000
}

fn default_max_batch_size() -> usize {
    100
}

fn default_max_pending_items() -> usize {
    10_000
}

fn default_flush_timeout_secs() -> u64 {
    5
}

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Observability configuration (logging only; the bridge's own traces
/// and metrics are out of scope).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ObservabilityConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ObservabilityConfig {
    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        const LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
        if !LEVELS.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::Validation(format!(
                "observability.logging.level must be one of {LEVELS:?}, got {:?}",
                self.logging.level
            )));
        }
        Ok(())
    }
}

/// Console logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Default verbosity. `RUST_LOG` overrides when set.
    #[serde(default = "default_level")]
    pub level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,

    /// Include timestamps in console output.
    #[serde(default = "default_timestamps")]
    pub timestamps: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::default(),
            timestamps: default_timestamps(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Pretty,
    #[default]
    Compact,
    Json,
}

fn default_level() -> String {
    "info".to_string()
}

fn default_timestamps() -> bool {
    true
}

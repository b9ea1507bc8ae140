//! Configuration for the telemetry bridge.
//!
//! The bridge is configured via an optional TOML file, with support for
//! environment variable interpolation using `${VAR_NAME}` syntax. On top
//! of the file, the flat environment variables of the deployment
//! contract (`OTLP_RECEIVER_PORT`, `SESSION_TIMEOUT`, `LANGFUSE_*`, ...)
//! override individual fields, so the bridge runs with no config file at
//! all in containerized deployments.
//!
//! # Example
//!
//! ```toml
//! [server]
//! port = 4318
//!
//! [langfuse]
//! host = "https://cloud.langfuse.com"
//! public_key = "${LANGFUSE_PUBLIC_KEY}"
//! secret_key = "${LANGFUSE_SECRET_KEY}"
//! ```

mod langfuse;
mod observability;
mod server;
mod session;

use std::path::Path;

pub use langfuse::*;
pub use observability::*;
use serde::{Deserialize, Serialize};
pub use server::*;
pub use session::*;

/// Root configuration. All sections are optional with defaults; only the
/// Langfuse credentials have no usable default.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BridgeConfig {
    /// OTLP receiver HTTP server.
    #[serde(default)]
    pub server: ServerConfig,

    /// Session lifecycle (idle timeout, sweeper cadence).
    #[serde(default)]
    pub session: SessionConfig,

    /// Langfuse backend credentials and delivery tuning.
    #[serde(default)]
    pub langfuse: LangfuseConfig,

    /// Ingress authentication.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Logging configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Ingress authentication configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    /// When set, `POST /v1/*` requires `Authorization: Bearer <api_key>`.
    /// `/health` stays open for probes.
    #[serde(default)]
    pub api_key: Option<String>,
}

impl BridgeConfig {
    /// Load the effective configuration: file (if given), then flat
    /// environment overrides, then validation.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file, expanding `${VAR_NAME}`.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(e, path.as_ref().to_path_buf()))?;
        Self::from_str(&contents)
    }

    /// Parse configuration from a TOML string, expanding `${VAR_NAME}`.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(contents: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(contents)?;
        toml::from_str(&expanded).map_err(ConfigError::Parse)
    }

    /// Apply the flat environment variables of the deployment contract.
    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(port) = env_parsed::<u16>("OTLP_RECEIVER_PORT")? {
            self.server.port = port;
        }
        if let Some(level) = env_nonempty("LOG_LEVEL") {
            self.observability.logging.level = level;
        }
        if let Some(timeout_ms) = env_parsed::<u64>("SESSION_TIMEOUT")? {
            self.session.idle_timeout_ms = timeout_ms;
        }
        if let Some(bytes) = env_parsed::<usize>("MAX_REQUEST_SIZE")? {
            self.server.max_request_size_bytes = bytes;
        }
        if let Some(host) = env_nonempty("LANGFUSE_HOST") {
            self.langfuse.host = host;
        }
        if let Some(key) = env_nonempty("LANGFUSE_PUBLIC_KEY") {
            self.langfuse.public_key = key;
        }
        if let Some(key) = env_nonempty("LANGFUSE_SECRET_KEY") {
            self.langfuse.secret_key = key;
        }
        if let Some(key) = env_nonempty("API_KEY") {
            self.auth.api_key = Some(key);
        }
        Ok(())
    }

    /// Validate the configuration for consistency and completeness.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Validation("server.port must be nonzero".into()));
        }
        if self.server.max_request_size_bytes == 0 {
            return Err(ConfigError::Validation(
                "server.max_request_size_bytes must be nonzero".into(),
            ));
        }
        if self.session.idle_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "session.idle_timeout_ms must be nonzero".into(),
            ));
        }
        self.langfuse.validate()?;
        self.observability.validate()?;
        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {1}: {0}")]
    Io(std::io::Error, std::path::PathBuf),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),

    #[error("Invalid value {value:?} for environment variable {name}")]
    InvalidEnvVar { name: String, value: String },

    #[error("Configuration validation error: {0}")]
    Validation(String),
}

fn env_nonempty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn env_parsed<T: std::str::FromStr>(name: &str) -> Result<Option<T>, ConfigError> {
    match env_nonempty(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnvVar {
                name: name.to_string(),
                value: raw,
            }),
        None => Ok(None),
    }
}

/// Expand `${VAR_NAME}` references, leaving commented-out text alone.
fn expand_env_vars(input: &str) -> Result<String, ConfigError> {
    let re = regex::Regex::new(r"\$\{([^}]+)\}").expect("static pattern");
    let mut out = String::with_capacity(input.len());
    let mut missing: Option<String> = None;

    for (i, line) in input.lines().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        // Only expand up to the first comment marker on the line.
        let (active, comment) = match line.find('#') {
            Some(pos) => line.split_at(pos),
            None => (line, ""),
        };
        let expanded = re.replace_all(active, |caps: &regex::Captures<'_>| {
            let name = &caps[1];
            match std::env::var(name) {
                Ok(value) => value,
                Err(_) => {
                    missing.get_or_insert_with(|| name.to_string());
                    String::new()
                }
            }
        });
        out.push_str(&expanded);
        out.push_str(comment);
    }

    match missing {
        Some(name) => Err(ConfigError::EnvVarNotFound(name)),
        None => Ok(out),
    }
}

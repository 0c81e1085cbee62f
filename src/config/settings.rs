//! Configuration structures for deserialisation.
//!
//! These structures map directly to the JSON configuration file format.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use tracing::Level;

use crate::error::ConfigError;
use crate::store::CaseSensitivity;

/// Root configuration structure.
///
/// This is the top-level structure that matches the JSON config file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Optional JSON schema reference (ignored during parsing).
    #[serde(rename = "$schema", default)]
    _schema: Option<String>,

    /// Optional comment field (ignored during parsing).
    #[serde(rename = "_comment", default)]
    _comment: Option<String>,

    /// Directory holding the text documents.
    #[serde(default = "default_documents_dir")]
    pub documents_dir: PathBuf,

    /// Search settings.
    #[serde(default)]
    pub search: SearchConfig,

    /// Client session settings.
    #[serde(default)]
    pub client: ClientConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            _schema: None,
            _comment: None,
            documents_dir: default_documents_dir(),
            search: SearchConfig::default(),
            client: ClientConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any validation checks fail.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.documents_dir.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError {
                message: "documents_dir cannot be empty".to_string(),
            });
        }

        if self.client.request_timeout_secs == 0 {
            return Err(ConfigError::ValidationError {
                message: "client.request_timeout_secs must be greater than zero".to_string(),
            });
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError {
                message: format!(
                    "Invalid log level '{}'. Must be one of: {}",
                    self.logging.level,
                    valid_levels.join(", ")
                ),
            });
        }

        Ok(())
    }
}

fn default_documents_dir() -> PathBuf {
    PathBuf::from("documents")
}

/// Document search configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SearchConfig {
    /// Whether `search_in_doc` matches case-sensitively unless the caller
    /// overrides it per call.
    /// Default: true
    #[serde(default = "default_true")]
    pub case_sensitive: bool,
}

impl SearchConfig {
    /// The configured default as a store setting.
    #[must_use]
    pub const fn case_sensitivity(&self) -> CaseSensitivity {
        CaseSensitivity::from_flag(self.case_sensitive)
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            case_sensitive: default_true(),
        }
    }
}

const fn default_true() -> bool {
    true
}

/// Client session configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    /// Seconds to wait for each response before reporting a timeout.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Milliseconds a closing server process gets to exit before it is killed.
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_ms: u64,
}

impl ClientConfig {
    /// Request timeout as a [`Duration`].
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Shutdown grace period as a [`Duration`].
    #[must_use]
    pub const fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout(),
            shutdown_grace_ms: default_shutdown_grace(),
        }
    }
}

const fn default_request_timeout() -> u64 {
    30
}

const fn default_shutdown_grace() -> u64 {
    500
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl LoggingConfig {
    /// Resolves the log level: `quiet` wins, then `-v` flags, then the
    /// configured level.
    #[must_use]
    #[allow(clippy::match_same_arms)] // Explicit "warn" arm for clarity
    pub fn resolve_level(&self, verbose: u8, quiet: bool) -> Level {
        if quiet {
            return Level::ERROR;
        }

        match verbose {
            0 => match self.level.to_lowercase().as_str() {
                "trace" => Level::TRACE,
                "debug" => Level::DEBUG,
                "info" => Level::INFO,
                "warn" => Level::WARN,
                "error" => Level::ERROR,
                _ => Level::WARN,
            },
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}

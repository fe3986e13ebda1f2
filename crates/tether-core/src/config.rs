//! Configuration system for Tether.

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::Error;
use crate::record::DEFAULT_CLIENT_ID;

/// Main configuration struct for Tether.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Session identity and local paths
    pub session: SessionConfig,
    /// Persistence throttle windows
    pub persistence: PersistenceConfig,
    /// Recovery poller intervals
    pub poller: PollerConfig,
    /// Readiness wait bounds
    pub readiness: ReadinessConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            persistence: PersistenceConfig::default(),
            poller: PollerConfig::default(),
            readiness: ReadinessConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Logical client identity
    pub client_id: String,
    /// Directory holding the session database; defaults to the data dir
    pub data_dir: Option<PathBuf>,
    /// Scratch directory a previous crashed run may have left behind
    pub scratch_dir: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            client_id: DEFAULT_CLIENT_ID.to_string(),
            data_dir: None,
            scratch_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Minimum spacing between event-driven credential writes (seconds)
    pub event_spacing_secs: u64,
    /// Minimum spacing between poller-driven forced passes (seconds)
    pub forced_spacing_secs: u64,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            event_spacing_secs: 5,
            forced_spacing_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollerConfig {
    /// Liveness probe interval (seconds)
    pub liveness_secs: u64,
    /// Forced-save interval (seconds)
    pub forced_save_secs: u64,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            liveness_secs: 5,
            forced_save_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessConfig {
    /// Grace period after the Ready transition before the send path may
    /// assume operations succeed (seconds). The driver's internal readiness
    /// lags its own ready signal.
    pub grace_secs: u64,
    /// Upper bound on waiting for readiness (seconds)
    pub wait_timeout_secs: u64,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            grace_secs: 15,
            wait_timeout_secs: 60,
        }
    }
}

/// Validation result with multiple issues.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    /// List of validation issues
    pub issues: Vec<ValidationIssue>,
}

impl ValidationResult {
    /// Create a new empty validation result.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if validation passed (no errors).
    pub fn is_ok(&self) -> bool {
        !self
            .issues
            .iter()
            .any(|i| i.severity == IssueSeverity::Error)
    }

    /// Get only error-level issues.
    pub fn errors(&self) -> Vec<&ValidationIssue> {
        self.issues
            .iter()
            .filter(|i| i.severity == IssueSeverity::Error)
            .collect()
    }

    /// Get only warning-level issues.
    pub fn warnings(&self) -> Vec<&ValidationIssue> {
        self.issues
            .iter()
            .filter(|i| i.severity == IssueSeverity::Warning)
            .collect()
    }

    /// Add an error.
    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.issues.push(ValidationIssue {
            severity: IssueSeverity::Error,
            field: field.into(),
            message: message.into(),
        });
    }

    /// Add a warning.
    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.issues.push(ValidationIssue {
            severity: IssueSeverity::Warning,
            field: field.into(),
            message: message.into(),
        });
    }
}

/// A single validation issue.
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    /// Severity of the issue
    pub severity: IssueSeverity,
    /// Field path (e.g., "poller.liveness_secs")
    pub field: String,
    /// Human-readable message
    pub message: String,
}

/// Severity level for validation issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueSeverity {
    /// Warnings don't prevent loading
    Warning,
    /// Errors prevent loading
    Error,
}

impl Config {
    /// Load configuration from all sources.
    pub fn load() -> Result<Self, figment::Error> {
        let config_dir = Self::config_dir();

        Figment::new()
            // Default values
            .merge(figment::providers::Serialized::defaults(Config::default()))
            // User config
            .merge(Toml::file(config_dir.join("config.toml")))
            // Local override (gitignored)
            .merge(Toml::file("tether.local.toml"))
            // Environment variables
            .merge(Env::prefixed("TETHER_").split("_"))
            .extract()
    }

    /// Load and validate configuration.
    pub fn load_validated() -> Result<Self, Error> {
        let config = Self::load().map_err(|e| Error::Config(e.to_string()))?;
        let result = config.validate();

        if !result.is_ok() {
            let errors: Vec<String> = result
                .errors()
                .iter()
                .map(|e| format!("{}: {}", e.field, e.message))
                .collect();
            return Err(Error::Config(format!(
                "Configuration validation failed:\n  {}",
                errors.join("\n  ")
            )));
        }

        for warning in result.warnings() {
            tracing::warn!("Config warning - {}: {}", warning.field, warning.message);
        }

        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::new();

        if self.session.client_id.is_empty() {
            result.add_error("session.client_id", "client_id cannot be empty");
        }

        if self.persistence.event_spacing_secs == 0 {
            result.add_error(
                "persistence.event_spacing_secs",
                "event_spacing_secs must be greater than 0",
            );
        }

        if self.persistence.forced_spacing_secs < self.persistence.event_spacing_secs {
            result.add_warning(
                "persistence.forced_spacing_secs",
                "forced spacing below event spacing defeats the poller throttle",
            );
        }

        if self.poller.liveness_secs == 0 {
            result.add_error("poller.liveness_secs", "liveness_secs must be greater than 0");
        }

        if self.poller.forced_save_secs == 0 {
            result.add_error(
                "poller.forced_save_secs",
                "forced_save_secs must be greater than 0",
            );
        }

        if self.readiness.wait_timeout_secs == 0 {
            result.add_error(
                "readiness.wait_timeout_secs",
                "wait_timeout_secs must be greater than 0",
            );
        }

        if self.readiness.grace_secs >= self.readiness.wait_timeout_secs {
            result.add_warning(
                "readiness.grace_secs",
                "grace period is at least as long as the wait timeout",
            );
        }

        result
    }

    /// Get the configuration directory.
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|p| p.join("tether"))
            .unwrap_or_else(|| PathBuf::from("~/.config/tether"))
    }

    /// Get the data directory (for the session database).
    pub fn data_dir(&self) -> PathBuf {
        self.session.data_dir.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .map(|p| p.join("tether"))
                .unwrap_or_else(|| PathBuf::from("~/.local/share/tether"))
        })
    }
}

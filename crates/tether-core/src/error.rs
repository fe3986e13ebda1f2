//! Error types for Tether.
//!
//! The engine itself never lets a failure escape a trigger path (a flaky
//! external session must not crash the host process), so most of these
//! variants surface only at the API boundary or in the CLI.

use thiserror::Error;

/// Result type alias using the core Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Tether.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Driver error with structured details
    #[error("{0}")]
    Driver(#[from] DriverError),

    /// Store error (flattened; the store crate keeps its own taxonomy)
    #[error("Store error: {0}")]
    Store(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Session never became ready within the configured bound
    #[error("Session not ready after {0}s")]
    ReadyTimeout(u64),

    /// Not found error
    #[error("Not found: {0}")]
    NotFound(String),
}

/// Driver-specific errors with detailed context.
#[derive(Error, Debug)]
pub enum DriverError {
    /// The underlying browser process or session is gone for good.
    #[error("Session closed: {message}")]
    SessionClosed { message: String },

    /// A liveness probe failed for a transient reason.
    #[error("Liveness probe failed: {message}")]
    Probe { message: String },

    /// The driver rejected the handshake.
    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    /// A driver operation failed for some other reason.
    #[error("Driver operation failed: {message}")]
    Operation { message: String },
}

impl DriverError {
    /// Whether this error means the underlying session/process is gone and
    /// further probing is pointless until the process restarts.
    pub fn is_terminal(&self) -> bool {
        match self {
            DriverError::SessionClosed { .. } => true,
            DriverError::Probe { message } | DriverError::Operation { message } => {
                let lower = message.to_lowercase();
                lower.contains("session closed") || lower.contains("browser has disconnected")
            }
            _ => false,
        }
    }

    /// Create a probe error from any displayable cause.
    pub fn probe(message: impl Into<String>) -> Self {
        DriverError::Probe {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_closed_is_terminal() {
        let err = DriverError::SessionClosed {
            message: "target closed".into(),
        };
        assert!(err.is_terminal());
    }

    #[test]
    fn test_probe_message_detection() {
        assert!(DriverError::probe("Protocol error: Session closed.").is_terminal());
        assert!(!DriverError::probe("navigation timeout").is_terminal());
    }

    #[test]
    fn test_auth_failure_not_terminal() {
        let err = DriverError::AuthenticationFailed {
            message: "bad pairing".into(),
        };
        assert!(!err.is_terminal());
    }
}

//! Error types for gvrpd.

use sonic_gvrp::GvrpError;
use thiserror::Error;

/// Result type for daemon operations.
pub type DaemonResult<T> = Result<T, DaemonError>;

/// Errors raised by the daemon around the protocol engine.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// The engine rejected a request.
    #[error("GVRP engine error: {0}")]
    Engine(#[from] GvrpError),

    /// The actor task is gone; no further requests can be served.
    #[error("GVRP actor is not running")]
    ActorStopped,

    /// Invalid daemon configuration.
    #[error("Configuration error in {field}: {message}")]
    Config { field: String, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DaemonError {
    pub fn config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Config {
            field: field.into(),
            message: message.into(),
        }
    }

    /// True for errors a caller may retry later.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Engine(e) => e.is_retryable(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sonic_gvrp::{AllocClass, Vid};

    #[test]
    fn test_engine_errors_keep_retryability() {
        let denied = DaemonError::from(GvrpError::ResourceDenied {
            vid: Vid::new(10).unwrap(),
            class: AllocClass::Default,
            limit: 20,
        });
        assert!(denied.is_retryable());
        assert!(!DaemonError::ActorStopped.is_retryable());
    }

    #[test]
    fn test_config_error_display() {
        let err = DaemonError::config("runtime.tick_interval_ms", "must be 10-1000");
        assert_eq!(
            err.to_string(),
            "Configuration error in runtime.tick_interval_ms: must be 10-1000"
        );
    }
}

//! Structured error types for tracecore
//!
//! Using thiserror for automatic Display implementation and error chaining.
//! Only non-signal paths report errors this way; the recording path signals
//! failure through counters instead.

use thiserror::Error;

/// Misconfiguration detected before a session is armed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Stripe count must be at least 1")]
    ZeroStripes,

    #[error("Maximum stack depth must be at least 1")]
    ZeroStackDepth,

    #[error("Maximum stack depth {requested} exceeds the limit of {limit}")]
    StackDepthTooLarge { requested: usize, limit: usize },

    #[error("Trace capacity must be at least 1")]
    ZeroTraceCapacity,

    #[error("Trace capacity {0} does not fit in a 31-bit trace id")]
    TraceCapacityTooLarge(usize),

    #[error("Frame arena capacity {frames} cannot hold even one {depth}-frame trace")]
    FrameCapacityTooSmall { frames: usize, depth: usize },

    #[error("Per-stripe sink capacity must be at least 1")]
    ZeroSinkCapacity,
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Invalid session configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    #[error("Profiling session is already running")]
    AlreadyRunning,

    #[error("Profiling session is not running")]
    NotRunning,
}

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Failed to write profile: {0}")]
    WriteFailed(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::StackDepthTooLarge { requested: 5000, limit: 2048 };
        assert_eq!(err.to_string(), "Maximum stack depth 5000 exceeds the limit of 2048");
    }

    #[test]
    fn test_session_error_wraps_config_error() {
        let err = SessionError::from(ConfigError::ZeroStripes);
        assert!(matches!(err, SessionError::InvalidConfig(ConfigError::ZeroStripes)));
        assert!(err.to_string().contains("Stripe count must be at least 1"));
    }
}

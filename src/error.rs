//! Unified error types for choreo.
//!
//! Timeline and program errors are returned to the caller. Nothing in the
//! core retries. The [`FailOpen`] helper covers the few places where a failure
//! is reported and a fallback value is used instead, such as sampling a
//! channel while assembling a state snapshot.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// The main error type for choreo operations.
#[derive(Error, Debug)]
pub enum ChoreoError {
    /// I/O errors from knowledge-base and config files.
    #[error("storage error at {path}: {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// JSON or TOML parsing/serialization errors.
    #[error("serialization error: {message}")]
    Serde { message: String },

    /// Configuration loading or validation errors.
    #[error("config error: {message}")]
    Config { message: String },

    /// A timeline channel that was never initialized.
    #[error("unknown channel: {channel}")]
    UnknownChannel { channel: String },

    /// Waypoints that cannot form a trajectory.
    #[error("malformed trajectory: {message}")]
    MalformedTrajectory { message: String },

    /// A required action, entity or label is missing.
    #[error("{what} not found: {name}")]
    NotFound { what: &'static str, name: String },

    /// Operation evaluation failures (type mismatch, division by zero).
    #[error("evaluation error: {message}")]
    Evaluation { message: String },

    /// A call whose arguments do not match the callee's parameters.
    #[error("parameter mismatch calling {callee}: expected {expected:?}, got {got:?}")]
    ParameterMismatch {
        callee: String,
        expected: Vec<String>,
        got: Vec<String>,
    },

    /// A loop construct ran past its iteration budget.
    #[error("loop exceeded {limit} iterations")]
    LoopLimit { limit: u64 },

    /// Execution was cancelled through a [`CancelToken`](crate::program::CancelToken).
    #[error("execution cancelled")]
    Cancelled,

    /// An alias chain longer than the configured maximum.
    #[error("alias chain for '{term}' exceeded depth {depth}")]
    AliasDepth { term: String, depth: usize },

    /// Invalid geometric input (zero-norm quaternion, non-finite values).
    #[error("geometry error: {message}")]
    Geometry { message: String },
}

/// A specialized Result type for choreo operations.
pub type Result<T> = std::result::Result<T, ChoreoError>;

impl ChoreoError {
    /// Create a storage error from an I/O error.
    pub fn storage(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Storage {
            path: path.into(),
            source,
        }
    }

    /// Create a serialization error.
    pub fn serde(message: impl Into<String>) -> Self {
        Self::Serde {
            message: message.into(),
        }
    }

    /// Create a config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an unknown channel error.
    pub fn unknown_channel(channel: impl Into<String>) -> Self {
        Self::UnknownChannel {
            channel: channel.into(),
        }
    }

    /// Create a malformed trajectory error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedTrajectory {
            message: message.into(),
        }
    }

    /// Create a not-found error for the given kind of item.
    pub fn not_found(what: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            what,
            name: name.into(),
        }
    }

    /// Create an evaluation error.
    pub fn evaluation(message: impl Into<String>) -> Self {
        Self::Evaluation {
            message: message.into(),
        }
    }

    /// Create a geometry error.
    pub fn geometry(message: impl Into<String>) -> Self {
        Self::Geometry {
            message: message.into(),
        }
    }
}

impl From<io::Error> for ChoreoError {
    fn from(err: io::Error) -> Self {
        Self::Storage {
            path: PathBuf::new(),
            source: err,
        }
    }
}

impl From<serde_json::Error> for ChoreoError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serde {
            message: err.to_string(),
        }
    }
}

/// Report-and-continue handling for non-critical failures.
pub trait FailOpen<T> {
    /// Log a warning and return the default value on error.
    fn fail_open_default(self, context: &str) -> T
    where
        T: Default;

    /// Log a warning and return the provided fallback on error.
    fn fail_open_with(self, context: &str, fallback: T) -> T;
}

impl<T> FailOpen<T> for Result<T> {
    fn fail_open_default(self, context: &str) -> T
    where
        T: Default,
    {
        match self {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!("{}: {} (using default)", context, err);
                T::default()
            }
        }
    }

    fn fail_open_with(self, context: &str, fallback: T) -> T {
        match self {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!("{}: {} (using fallback)", context, err);
                fallback
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_display() {
        let err = ChoreoError::storage(
            "/tmp/kb.json",
            io::Error::new(io::ErrorKind::NotFound, "file not found"),
        );
        assert!(err.to_string().contains("storage error"));
        assert!(err.to_string().contains("/tmp/kb.json"));
    }

    #[test]
    fn test_unknown_channel_display() {
        let err = ChoreoError::unknown_channel("left_arm");
        assert_eq!(err.to_string(), "unknown channel: left_arm");
    }

    #[test]
    fn test_not_found_display() {
        let err = ChoreoError::not_found("action", "grasp");
        assert_eq!(err.to_string(), "action not found: grasp");
    }

    #[test]
    fn test_parameter_mismatch_display() {
        let err = ChoreoError::ParameterMismatch {
            callee: "move_ee".to_string(),
            expected: vec!["agent".to_string(), "pose".to_string()],
            got: vec!["agent".to_string()],
        };
        let text = err.to_string();
        assert!(text.contains("move_ee"));
        assert!(text.contains("pose"));
    }

    #[test]
    fn test_loop_limit_display() {
        let err = ChoreoError::LoopLimit { limit: 10 };
        assert_eq!(err.to_string(), "loop exceeded 10 iterations");
    }

    #[test]
    fn test_alias_depth_display() {
        let err = ChoreoError::AliasDepth {
            term: "x".to_string(),
            depth: 4,
        };
        assert!(err.to_string().contains("'x'"));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "access denied");
        let err: ChoreoError = io_err.into();
        assert!(matches!(err, ChoreoError::Storage { .. }));
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid").unwrap_err();
        let err: ChoreoError = json_err.into();
        assert!(matches!(err, ChoreoError::Serde { .. }));
    }

    #[test]
    fn test_fail_open_default() {
        let result: Result<Vec<String>> = Err(ChoreoError::unknown_channel("arm"));
        assert!(result.fail_open_default("sampling").is_empty());
    }

    #[test]
    fn test_fail_open_with() {
        let result: Result<f64> = Err(ChoreoError::evaluation("bad"));
        assert_eq!(result.fail_open_with("sampling", 1.5), 1.5);
    }

    #[test]
    fn test_fail_open_success() {
        let result: Result<i32> = Ok(100);
        assert_eq!(result.fail_open_default("sampling"), 100);
    }
}

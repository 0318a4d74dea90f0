//! Error types exchanged across the process boundary and within the pool.
//!
//! This module defines two main error enums:
//!
//! - [`WorkerError`] — classified failures of individual worker processes.
//! - [`PoolError`] — errors raised by the pool configuration/runtime itself.
//!
//! [`ErrorRecord`] is the serializable `{name, message, stack}` form used on
//! the wire: a worker sends one inside a `softError` or `finished` message,
//! and the pool reconstructs a [`WorkerError::Soft`] from it.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// # Classified failures of a single worker process.
///
/// The origin of the error determines its variant:
/// - `Fork` is inferred from a nonzero exit code (hard failure);
/// - `Soft` is self-reported by the worker over its message channel;
/// - `Timeout` is raised by the per-worker supervision timer;
/// - `Spawn` means the OS process could not be created at all.
///
/// Every variant carries the id of the originating handle so errors stay
/// attributable after they are routed onto the pool's event stream.
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum WorkerError {
    /// Worker exited with a nonzero code.
    #[error("worker \"{id}\" exited with code {code}")]
    Fork {
        /// Id of the originating handle.
        id: String,
        /// Process exit code (`-1` when killed by a signal).
        code: i32,
    },

    /// Worker reported a caught, recoverable exception via its message channel.
    #[error("worker \"{id}\" reported an error: {message}")]
    Soft {
        /// Id of the originating handle.
        id: String,
        /// Error name as reported by the worker.
        name: String,
        /// Error message as reported by the worker.
        message: String,
        /// Optional stack trace as reported by the worker.
        stack: Option<String>,
    },

    /// Worker exceeded its kill timeout and was forcibly terminated.
    #[error("worker \"{id}\" timed out after {timeout:?}")]
    Timeout {
        /// Id of the originating handle.
        id: String,
        /// The kill timeout that was exceeded.
        timeout: Duration,
    },

    /// The OS spawn itself failed; no process was ever created.
    #[error("failed to spawn worker \"{id}\": {message}")]
    Spawn {
        /// Id of the originating handle.
        id: String,
        /// Message from the underlying spawn error.
        message: String,
    },
}

impl WorkerError {
    /// Returns the id of the handle this error originated from.
    pub fn id(&self) -> &str {
        match self {
            WorkerError::Fork { id, .. }
            | WorkerError::Soft { id, .. }
            | WorkerError::Timeout { id, .. }
            | WorkerError::Spawn { id, .. } => id,
        }
    }

    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            WorkerError::Fork { .. } => "worker_fork",
            WorkerError::Soft { .. } => "worker_soft",
            WorkerError::Timeout { .. } => "worker_timeout",
            WorkerError::Spawn { .. } => "worker_spawn",
        }
    }

    /// True for failures that indicate the process itself died or never ran.
    ///
    /// `Soft` errors are self-reported and by convention do not imply total
    /// task failure, though they are recorded and emitted identically.
    pub fn is_hard(&self) -> bool {
        matches!(self, WorkerError::Fork { .. } | WorkerError::Spawn { .. })
    }

    /// Converts to the serializable wire form.
    pub fn record(&self) -> ErrorRecord {
        match self {
            WorkerError::Soft {
                name,
                message,
                stack,
                ..
            } => ErrorRecord {
                name: name.clone(),
                message: message.clone(),
                stack: stack.clone(),
            },
            other => ErrorRecord {
                name: other.as_label().to_string(),
                message: other.to_string(),
                stack: None,
            },
        }
    }

    /// Builds a `Soft` error from a wire record received from a worker.
    pub(crate) fn soft(id: impl Into<String>, record: ErrorRecord) -> Self {
        WorkerError::Soft {
            id: id.into(),
            name: if record.name.is_empty() {
                "SoftError".to_string()
            } else {
                record.name
            },
            message: record.message,
            stack: record.stack,
        }
    }
}

/// Serializable `{name, message, stack}` error form for the wire protocol.
///
/// Workers send this inside `softError` (and optionally `finished`) messages;
/// see [`Reporter`](crate::Reporter) for the worker-side helper.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    /// Error name, e.g. the type of the caught exception.
    #[serde(default)]
    pub name: String,
    /// Human-readable message.
    #[serde(default)]
    pub message: String,
    /// Optional stack trace or context dump.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl ErrorRecord {
    /// Builds a record from any error value.
    pub fn from_error(err: &(dyn std::error::Error + 'static)) -> Self {
        Self {
            name: "SoftError".to_string(),
            message: err.to_string(),
            stack: err.source().map(|s| s.to_string()),
        }
    }

    /// True when the record carries no information at all.
    pub fn is_empty(&self) -> bool {
        self.name.is_empty() && self.message.is_empty() && self.stack.is_none()
    }
}

/// # Errors raised by the pool itself.
///
/// These represent misconfiguration of the pool rather than worker failures.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum PoolError {
    /// A custom message handler was registered under a reserved event tag.
    ///
    /// The tags `finished`, `softError` and `terminated` belong to the
    /// supervision protocol and are dispatched internally.
    #[error("\"{name}\" is a reserved worker event and cannot have a custom handler")]
    ReservedEvent {
        /// The offending tag.
        name: String,
    },
}

impl PoolError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            PoolError::ReservedEvent { .. } => "pool_reserved_event",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_roundtrips_through_json() {
        let record = ErrorRecord {
            name: "RangeError".to_string(),
            message: "index out of bounds".to_string(),
            stack: Some("at main".to_string()),
        };
        let json = serde_json::to_string(&record).unwrap();
        let back: ErrorRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn record_tolerates_missing_fields() {
        let record: ErrorRecord = serde_json::from_str("{\"message\":\"boom\"}").unwrap();
        assert_eq!(record.message, "boom");
        assert!(record.name.is_empty());
        assert!(record.stack.is_none());
        assert!(!record.is_empty());
    }

    #[test]
    fn soft_error_defaults_its_name() {
        let err = WorkerError::soft("w1", ErrorRecord::default());
        match err {
            WorkerError::Soft { name, .. } => assert_eq!(name, "SoftError"),
            other => panic!("expected Soft, got {other:?}"),
        }
    }

    #[test]
    fn errors_stay_attributable() {
        let err = WorkerError::Fork {
            id: "important".to_string(),
            code: 1,
        };
        assert_eq!(err.id(), "important");
        assert_eq!(err.as_label(), "worker_fork");
        assert!(err.is_hard());
    }
}

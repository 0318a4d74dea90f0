//! # Wire protocol between a worker process and the pool.
//!
//! A worker communicates upward by writing discrete messages to its stdout,
//! one JSON object per line: `{"event": <tag>, "data": <value>}`.
//!
//! ## Recognized tags
//! - [`EVENT_FINISHED`] — worker-initiated graceful completion; `data` is an
//!   optional [`ErrorRecord`](crate::ErrorRecord).
//! - [`EVENT_SOFT_ERROR`] — worker reports a caught, non-fatal exception;
//!   `data` is an [`ErrorRecord`](crate::ErrorRecord).
//! - any other tag — routed to a caller-registered handler by exact name,
//!   or ignored if none is registered.
//!
//! Lines that do not parse as a message are ignored: workers are free to
//! print ordinary output on stdout alongside protocol messages.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ErrorRecord;

/// Worker-initiated graceful completion.
pub const EVENT_FINISHED: &str = "finished";
/// Worker-reported caught exception.
pub const EVENT_SOFT_ERROR: &str = "softError";
/// Pool-side termination notification; never a valid wire tag.
pub const EVENT_TERMINATED: &str = "terminated";

/// Tags owned by the supervision protocol; custom handlers cannot claim them.
pub(crate) const RESERVED_EVENTS: &[&str] = &[EVENT_FINISHED, EVENT_SOFT_ERROR, EVENT_TERMINATED];

/// One discrete message from a worker process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerMessage {
    /// Event tag, dispatched by exact name.
    pub event: String,
    /// Arbitrary payload; an [`ErrorRecord`](crate::ErrorRecord) for the
    /// reserved tags.
    #[serde(default)]
    pub data: Value,
}

impl WorkerMessage {
    /// Creates a message with the given tag and payload.
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    /// Parses one stdout line; `None` when the line is not a protocol message.
    pub fn parse(line: &str) -> Option<Self> {
        let msg: WorkerMessage = serde_json::from_str(line.trim()).ok()?;
        if msg.event.is_empty() {
            return None;
        }
        Some(msg)
    }

    /// Extracts a non-empty error record from the payload, if present.
    pub fn record(&self) -> Option<ErrorRecord> {
        let record: ErrorRecord = serde_json::from_value(self.data.clone()).ok()?;
        if record.is_empty() {
            return None;
        }
        Some(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_protocol_lines() {
        let msg = WorkerMessage::parse(r#"{"event":"finished","data":{}}"#).unwrap();
        assert_eq!(msg.event, EVENT_FINISHED);
        assert!(msg.record().is_none());
    }

    #[test]
    fn ignores_plain_output() {
        assert!(WorkerMessage::parse("processed 14 files").is_none());
        assert!(WorkerMessage::parse(r#"{"data":{}}"#).is_none());
        assert!(WorkerMessage::parse("").is_none());
    }

    #[test]
    fn extracts_error_records() {
        let msg = WorkerMessage::new(
            EVENT_SOFT_ERROR,
            json!({"name": "RangeError", "message": "boom", "stack": "at main"}),
        );
        let record = msg.record().unwrap();
        assert_eq!(record.name, "RangeError");
        assert_eq!(record.message, "boom");
        assert_eq!(record.stack.as_deref(), Some("at main"));
    }

    #[test]
    fn empty_payload_is_not_an_error() {
        let msg = WorkerMessage::new(EVENT_FINISHED, json!({}));
        assert!(msg.record().is_none());
    }
}

//! # Lifecycle events emitted by the pool and worker supervisors.
//!
//! The [`EventKind`] enum classifies event types:
//! - **Per-worker events**: spawned, errored, terminated.
//! - **Pool events**: the single terminal `PoolFinished` per run.
//!
//! The [`PoolEvent`] struct carries the metadata for each kind: the handle
//! id, the classified [`WorkerError`], and the terminal [`PoolStatus`].
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases
//! monotonically. Use `seq` to restore the exact order when events are
//! observed from independent receivers.
//!
//! ## Error streams
//! `WorkerErrored` serves both views the pool exposes: the general stream
//! (every classified error, any handle) and the per-handle "namespaced"
//! stream, which is the same events filtered by `id` — see
//! [`Pool::worker_errors`](crate::Pool::worker_errors).

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::SystemTime;

use crate::error::WorkerError;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of pool events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// A worker process was spawned and its handle registered.
    ///
    /// Sets:
    /// - `id`: assigned handle id
    /// - `at`: wall-clock timestamp
    /// - `seq`: global sequence
    WorkerSpawned,

    /// A classified error was recorded against a handle.
    ///
    /// Emitted for every [`WorkerError`] exactly once, in addition to being
    /// appended to the pool's per-id error list.
    ///
    /// Sets:
    /// - `id`: originating handle id
    /// - `error`: the classified error
    /// - `at`: wall-clock timestamp
    /// - `seq`: global sequence
    WorkerErrored,

    /// A handle reached its terminal state.
    ///
    /// Emitted exactly once per handle, whichever signal arrived first
    /// (clean exit, nonzero exit, worker message, timeout, or kill).
    ///
    /// Sets:
    /// - `id`: handle id
    /// - `at`: wall-clock timestamp
    /// - `seq`: global sequence
    WorkerTerminated,

    /// The pool reached its terminal state for the current run.
    ///
    /// Emitted exactly once per run.
    ///
    /// Sets:
    /// - `status`: `Completed` or `Aborted`
    /// - `at`: wall-clock timestamp
    /// - `seq`: global sequence
    PoolFinished,
}

/// Terminal state of one pool run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolStatus {
    /// Every admitted task terminated within the pool's kill timeout.
    Completed,
    /// The global kill timeout elapsed first; remaining workers were killed.
    Aborted,
}

impl PoolStatus {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            PoolStatus::Completed => "completed",
            PoolStatus::Aborted => "aborted",
        }
    }
}

impl std::fmt::Display for PoolStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_label())
    }
}

/// Pool event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct PoolEvent {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,
    /// Handle id, for per-worker events.
    pub id: Option<Arc<str>>,
    /// Classified error, for `WorkerErrored`.
    pub error: Option<WorkerError>,
    /// Terminal status, for `PoolFinished`.
    pub status: Option<PoolStatus>,
}

impl PoolEvent {
    /// Creates a new event of the given kind with the current timestamp and
    /// the next global sequence number.
    pub fn now(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            id: None,
            error: None,
            status: None,
        }
    }

    /// Attaches a handle id.
    #[inline]
    pub fn with_id(mut self, id: impl Into<Arc<str>>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Attaches a classified worker error.
    #[inline]
    pub fn with_error(mut self, error: WorkerError) -> Self {
        self.error = Some(error);
        self
    }

    /// Attaches a terminal pool status.
    #[inline]
    pub fn with_status(mut self, status: PoolStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// True when this event is an error recorded against the given handle.
    #[inline]
    pub fn is_error_for(&self, id: &str) -> bool {
        self.kind == EventKind::WorkerErrored && self.id.as_deref() == Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seq_is_monotonic() {
        let a = PoolEvent::now(EventKind::WorkerSpawned);
        let b = PoolEvent::now(EventKind::WorkerTerminated);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn error_events_match_by_id() {
        let err = WorkerError::Fork {
            id: "w7".to_string(),
            code: 3,
        };
        let ev = PoolEvent::now(EventKind::WorkerErrored)
            .with_id("w7")
            .with_error(err);
        assert!(ev.is_error_for("w7"));
        assert!(!ev.is_error_for("w8"));
    }
}

//! # WorkerHandle: the live representation of one spawned process.
//!
//! A handle is created once the OS spawn succeeds (or, for spawn failures,
//! just long enough to attribute the error) and registered in the pool's
//! lookup maps. It owns the per-handle cancellation token that pairs timer
//! shutdown with termination.
//!
//! ## Rules
//! - `terminated` transitions false→true **exactly once** (atomic swap);
//!   every later `terminate` call is a no-op.
//! - Termination cancels the handle token, which stops the poll timer and
//!   the supervisor's message loop as one paired operation — no timer ever
//!   outlives its handle.
//! - The stored outcome is whatever error the winning `terminate` carried;
//!   it is what the task's completion callback receives.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

use crate::error::WorkerError;
use crate::events::{Bus, EventKind, PoolEvent};

/// Live process representation for one worker.
///
/// Owned by its task's supervisor for the duration of the run; the pool
/// holds non-owning lookup references in `forks_hash`.
pub struct WorkerHandle {
    id: Arc<str>,
    description: Option<String>,
    start_time: Instant,
    kill_timeout: Duration,
    poll_frequency: Duration,
    terminated: AtomicBool,
    connected: AtomicBool,
    completed: Arc<AtomicBool>,
    outcome: Mutex<Option<WorkerError>>,
    cancel: CancellationToken,
    bus: Bus,
}

impl WorkerHandle {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: String,
        description: Option<String>,
        kill_timeout: Duration,
        poll_frequency: Duration,
        connected: bool,
        completed: Arc<AtomicBool>,
        cancel: CancellationToken,
        bus: Bus,
    ) -> Self {
        Self {
            id: Arc::from(id),
            description,
            start_time: Instant::now(),
            kill_timeout,
            poll_frequency,
            terminated: AtomicBool::new(false),
            connected: AtomicBool::new(connected),
            completed,
            outcome: Mutex::new(None),
            cancel,
            bus,
        }
    }

    /// Unique id of this handle within the pool.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn id_arc(&self) -> Arc<str> {
        Arc::clone(&self.id)
    }

    /// Caller-supplied description, if any.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Instant the process was spawned.
    pub fn start_time(&self) -> Instant {
        self.start_time
    }

    /// Time since the process was spawned.
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Effective kill timeout for this worker.
    pub fn kill_timeout(&self) -> Duration {
        self.kill_timeout
    }

    /// Effective supervision poll interval for this worker.
    pub fn poll_frequency(&self) -> Duration {
        self.poll_frequency
    }

    /// True once the handle reached its terminal state.
    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    /// True while the worker's message channel is open.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub(crate) fn set_disconnected(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    /// Resolves when the handle has been terminated.
    pub(crate) fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }

    /// Moves the handle to its terminal state.
    ///
    /// Idempotent: only the first caller wins. The winner stores `err` as the
    /// task outcome, marks the owning task completed, publishes the single
    /// `WorkerTerminated` event, and cancels the handle token (stopping the
    /// poll timer and message loop). Returns whether this call terminated
    /// the handle.
    pub(crate) fn terminate(&self, err: Option<WorkerError>) -> bool {
        if self.terminated.swap(true, Ordering::SeqCst) {
            return false;
        }
        if let Ok(mut slot) = self.outcome.lock() {
            *slot = err;
        }
        self.completed.store(true, Ordering::SeqCst);
        tracing::debug!(id = %self.id, "worker terminated");
        self.bus
            .publish(PoolEvent::now(EventKind::WorkerTerminated).with_id(self.id_arc()));
        self.cancel.cancel();
        true
    }

    /// Takes the outcome stored by the winning `terminate` call.
    pub(crate) fn take_outcome(&self) -> Option<WorkerError> {
        self.outcome.lock().ok().and_then(|mut slot| slot.take())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(bus: &Bus) -> WorkerHandle {
        WorkerHandle::new(
            "w1".to_string(),
            None,
            Duration::from_secs(5),
            Duration::from_millis(50),
            true,
            Arc::new(AtomicBool::new(false)),
            CancellationToken::new(),
            bus.clone(),
        )
    }

    #[tokio::test]
    async fn terminate_is_idempotent() {
        let bus = Bus::new(16);
        let mut rx = bus.subscribe();
        let h = handle(&bus);

        assert!(h.terminate(None));
        assert!(!h.terminate(Some(WorkerError::Fork {
            id: "w1".to_string(),
            code: 1,
        })));
        assert!(h.is_terminated());
        // The losing call must not overwrite the stored outcome.
        assert!(h.take_outcome().is_none());

        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.kind, EventKind::WorkerTerminated);
        assert!(matches!(
            rx.try_recv(),
            Err(tokio::sync::broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn terminate_pairs_with_timer_cancellation() {
        let bus = Bus::new(16);
        let h = handle(&bus);
        let completed = Arc::clone(&h.completed);

        h.terminate(Some(WorkerError::Timeout {
            id: "w1".to_string(),
            timeout: Duration::from_secs(5),
        }));

        h.cancelled().await;
        assert!(completed.load(Ordering::SeqCst));
        assert!(matches!(
            h.take_outcome(),
            Some(WorkerError::Timeout { .. })
        ));
    }
}

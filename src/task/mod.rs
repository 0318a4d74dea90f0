//! Per-task supervision: the live process handle and its state machine.
//!
//! Internal modules:
//! - [`handle`]: [`WorkerHandle`] — the live process representation with the
//!   idempotent `terminate` operation;
//! - [`supervisor`]: drives one spawn from process creation to termination.

mod handle;
mod supervisor;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub use handle::WorkerHandle;
pub(crate) use supervisor::TaskSupervisor;

/// Engine-side bookkeeping for one submitted task.
///
/// Wraps the flags shared between the pool's registry and the task's
/// supervisor: whether the spawn has happened (the task left the pending
/// queue) and whether the task has completed.
#[derive(Clone, Default)]
pub(crate) struct TaskState {
    completed: Arc<AtomicBool>,
    spawned: Arc<AtomicBool>,
}

impl TaskState {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Marks the task admitted: its spawn action has started.
    pub(crate) fn mark_spawned(&self) {
        self.spawned.store(true, Ordering::SeqCst);
    }

    pub(crate) fn is_spawned(&self) -> bool {
        self.spawned.load(Ordering::SeqCst)
    }

    /// The completion flag, set by `WorkerHandle::terminate`.
    pub(crate) fn completed_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.completed)
    }
}

//! # Registry state shared between the pool and its task supervisors.
//!
//! [`PoolShared`] owns the mutable bookkeeping structures: the ordered
//! handle list, the id→handle lookup map, the per-id error accumulator, and
//! the caller-visible data bucket. The only writers are the controller's
//! own spawn/terminate/error-routing paths.
//!
//! ## Rules
//! - A handle id is unique across the live `forks_hash` at any instant;
//!   [`unique_id`] resolves collisions with a bounded retry loop.
//! - `errors[id]` exists from the moment a handle is registered until the
//!   pool is cleared or re-run; errors append, never overwrite.
//! - Every classified error is appended to its id's list **and** published
//!   as a `WorkerErrored` event, as one operation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::error::WorkerError;
use crate::events::{Bus, EventKind, PoolEvent};
use crate::task::WorkerHandle;
use crate::workers::handler::DataBucket;
use crate::workers::{HandlerMap, WorkerSpec};

/// Bounded retries for the timestamp-derived id fallback before switching to
/// the guaranteed-unique sequence suffix.
const MAX_ID_RETRIES: usize = 8;

/// Process-wide suffix for the last-resort id fallback.
static FALLBACK_SEQ: AtomicU64 = AtomicU64::new(0);

/// Pool-owned mutable state, shared with every task supervisor.
pub(crate) struct PoolShared {
    pub(crate) bus: Bus,
    pub(crate) handlers: HandlerMap,
    root: CancellationToken,
    kill_timeout: Duration,
    poll_frequency: Duration,
    data: DataBucket,
    forks: RwLock<Vec<Arc<WorkerHandle>>>,
    forks_hash: RwLock<HashMap<String, Arc<WorkerHandle>>>,
    errors: RwLock<HashMap<String, Vec<WorkerError>>>,
}

impl PoolShared {
    pub(crate) fn new(
        bus: Bus,
        handlers: HandlerMap,
        root: CancellationToken,
        kill_timeout: Duration,
        poll_frequency: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            bus,
            handlers,
            root,
            kill_timeout,
            poll_frequency,
            data: Arc::new(RwLock::new(HashMap::new())),
            forks: RwLock::new(Vec::new()),
            forks_hash: RwLock::new(HashMap::new()),
            errors: RwLock::new(HashMap::new()),
        })
    }

    /// The caller-shared data bucket.
    pub(crate) fn data_bucket(&self) -> DataBucket {
        Arc::clone(&self.data)
    }

    /// Creates and registers a handle for a freshly spawned worker.
    ///
    /// Resolves the worker's timeouts against the pool defaults, assigns a
    /// unique id under the registry lock, seeds its error list, and
    /// publishes `WorkerSpawned`.
    pub(crate) async fn register(
        &self,
        spec: &WorkerSpec,
        completed: Arc<AtomicBool>,
        connected: bool,
    ) -> Arc<WorkerHandle> {
        let kill_timeout = spec.kill_timeout.unwrap_or(self.kill_timeout);
        let poll_frequency = spec.poll_frequency.unwrap_or(self.poll_frequency);

        let handle = {
            let mut hash = self.forks_hash.write().await;
            let id = unique_id(spec.id.as_deref(), &hash);
            let handle = Arc::new(WorkerHandle::new(
                id.clone(),
                spec.description.clone(),
                kill_timeout,
                poll_frequency,
                connected,
                completed,
                self.root.child_token(),
                self.bus.clone(),
            ));
            hash.insert(id, Arc::clone(&handle));
            handle
        };

        // An id freed by kill_all may be reused; its earlier errors must
        // survive, so the list is created only if absent.
        self.errors
            .write()
            .await
            .entry(handle.id().to_string())
            .or_default();
        self.forks.write().await.push(Arc::clone(&handle));
        self.bus
            .publish(PoolEvent::now(EventKind::WorkerSpawned).with_id(handle.id_arc()));
        handle
    }

    /// Appends a classified error to its handle's list and publishes it.
    pub(crate) async fn report_error(&self, err: WorkerError) {
        let id: Arc<str> = Arc::from(err.id());
        self.errors
            .write()
            .await
            .entry(err.id().to_string())
            .or_default()
            .push(err.clone());
        self.bus.publish(
            PoolEvent::now(EventKind::WorkerErrored)
                .with_id(id)
                .with_error(err),
        );
    }

    /// Count of registered handles that have not terminated.
    pub(crate) async fn active_forks(&self) -> usize {
        self.forks
            .read()
            .await
            .iter()
            .filter(|h| !h.is_terminated())
            .count()
    }

    /// Snapshot of the ordered handle list.
    pub(crate) async fn forks(&self) -> Vec<Arc<WorkerHandle>> {
        self.forks.read().await.clone()
    }

    /// Snapshot of the per-id error lists.
    pub(crate) async fn errors_snapshot(&self) -> HashMap<String, Vec<WorkerError>> {
        self.errors.read().await.clone()
    }

    /// Terminates every registered handle and clears the id map.
    ///
    /// Termination cancels each handle's token; its supervisor delivers the
    /// kill signal and reaps the process on the way out. Clearing
    /// `forks_hash` frees every caller-chosen id for reuse by tasks added
    /// afterwards; the ordered handle list and the error lists stay
    /// inspectable until the next [`reset`](Self::reset). Safe to call when
    /// no handles exist.
    pub(crate) async fn kill_all(&self) {
        let handles = self.forks.read().await.clone();
        for handle in &handles {
            handle.terminate(None);
        }
        self.forks_hash.write().await.clear();
        if !handles.is_empty() {
            tracing::debug!(count = handles.len(), "killed all workers");
        }
    }

    /// Drops every handle and recorded error. Called by `run` so a re-run
    /// starts clean.
    pub(crate) async fn reset(&self) {
        self.forks.write().await.clear();
        self.forks_hash.write().await.clear();
        self.errors.write().await.clear();
    }
}

/// Assigns a handle id unique within the live id set.
///
/// Prefers the caller-declared id; on collision (or absence) falls back to a
/// timestamp-derived id, retried a bounded number of times with a random
/// salt, and finally to a strictly increasing sequence suffix, which always
/// terminates against a finite id set.
fn unique_id<V>(requested: Option<&str>, taken: &HashMap<String, V>) -> String {
    if let Some(id) = requested {
        if !taken.contains_key(id) {
            return id.to_string();
        }
        tracing::debug!(id, "worker id already taken; generating a fresh one");
    }
    for _ in 0..MAX_ID_RETRIES {
        let candidate = format!("{:x}{:02x}", clock_nanos(), rand::random::<u8>());
        if !taken.contains_key(&candidate) {
            return candidate;
        }
    }
    loop {
        let candidate = format!(
            "{:x}-{}",
            clock_nanos(),
            FALLBACK_SEQ.fetch_add(1, Ordering::SeqCst)
        );
        if !taken.contains_key(&candidate) {
            return candidate;
        }
    }
}

fn clock_nanos() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caller_id_wins_when_free() {
        let taken: HashMap<String, ()> = HashMap::new();
        assert_eq!(unique_id(Some("crawler"), &taken), "crawler");
    }

    #[test]
    fn collision_falls_back_to_generated_id() {
        let mut taken: HashMap<String, ()> = HashMap::new();
        taken.insert("crawler".to_string(), ());
        let id = unique_id(Some("crawler"), &taken);
        assert_ne!(id, "crawler");
        assert!(!taken.contains_key(&id));
    }

    #[tokio::test]
    async fn kill_all_frees_ids_and_keeps_errors() {
        let shared = PoolShared::new(
            Bus::new(16),
            HandlerMap::new(),
            CancellationToken::new(),
            Duration::from_secs(5),
            Duration::from_millis(50),
        );
        let spec = WorkerSpec::new("/bin/true").with_id("alpha");

        let first = shared
            .register(&spec, Arc::new(AtomicBool::new(false)), true)
            .await;
        assert_eq!(first.id(), "alpha");
        shared
            .report_error(WorkerError::Fork {
                id: "alpha".to_string(),
                code: 2,
            })
            .await;

        shared.kill_all().await;
        assert!(first.is_terminated());

        let second = shared
            .register(&spec, Arc::new(AtomicBool::new(false)), true)
            .await;
        assert_eq!(second.id(), "alpha");
        // Re-registration appends to the handle list and keeps the error
        // recorded before the kill.
        assert_eq!(shared.forks().await.len(), 2);
        assert_eq!(shared.errors_snapshot().await["alpha"].len(), 1);
    }

    #[test]
    fn generated_ids_avoid_the_live_set() {
        let mut taken: HashMap<String, ()> = HashMap::new();
        for _ in 0..64 {
            let id = unique_id(None, &taken);
            assert!(!taken.contains_key(&id), "collision on {id}");
            taken.insert(id, ());
        }
    }
}

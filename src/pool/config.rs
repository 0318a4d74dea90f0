//! # Pool configuration.
//!
//! Provides [`PoolConfig`], the centralized settings object passed to
//! [`Pool::new`](crate::Pool::new).
//!
//! ## Concurrency semantics
//! The effective concurrency cap is `min(concurrency, CPU cores)` unless
//! [`PoolConfig::no_limits`] is set; a silently lowered cap is logged and can
//! be queried after construction via
//! [`Pool::concurrency_limit`](crate::Pool::concurrency_limit).

use std::sync::Arc;
use std::time::Duration;

use crate::events::PoolStatus;
use crate::workers::{HandlerMap, HandlerRef, WorkerSpec};

/// Default number of workers run concurrently.
pub const DEFAULT_CONCURRENCY: usize = 3;
/// Default kill timeout, per worker and for the whole pool.
pub const DEFAULT_KILL_TIMEOUT: Duration = Duration::from_secs(60);
/// Default supervision poll interval.
pub const DEFAULT_POLL_FREQUENCY: Duration = Duration::from_secs(1);
/// Default event bus ring buffer size.
pub const DEFAULT_BUS_CAPACITY: usize = 1024;

pub(crate) type InitFn = Arc<dyn Fn() + Send + Sync>;
pub(crate) type FinishedFn = Arc<dyn Fn(PoolStatus) + Send + Sync>;

/// Configuration for a worker pool.
///
/// ## Field semantics
/// - `concurrency`: max parallel workers, capped at the CPU core count
///   unless `no_limits` is set (minimum 1)
/// - `kill_timeout`: global abort deadline; also the per-worker default
/// - `poll_frequency`: supervision poll interval; also the per-worker default
/// - `workers`: initial worklist submitted by [`Pool::run`](crate::Pool::run)
/// - `bus_capacity`: event bus ring buffer size (min 1; clamped by the bus)
#[derive(Clone)]
pub struct PoolConfig {
    /// Maximum number of workers running concurrently.
    pub concurrency: usize,
    /// Wall-clock deadline after which the run is aborted; also the default
    /// per-worker kill timeout.
    pub kill_timeout: Duration,
    /// Supervision poll interval; also the default per-worker poll interval.
    pub poll_frequency: Duration,
    /// Initial worklist.
    pub workers: Vec<WorkerSpec>,
    /// Disables the CPU-core cap on `concurrency`.
    pub no_limits: bool,
    /// Capacity of the event bus broadcast channel.
    pub bus_capacity: usize,

    pub(crate) handlers: HandlerMap,
    pub(crate) on_init: Option<InitFn>,
    pub(crate) on_finished: Option<FinishedFn>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            kill_timeout: DEFAULT_KILL_TIMEOUT,
            poll_frequency: DEFAULT_POLL_FREQUENCY,
            workers: Vec::new(),
            no_limits: false,
            bus_capacity: DEFAULT_BUS_CAPACITY,
            handlers: HandlerMap::new(),
            on_init: None,
            on_finished: None,
        }
    }
}

impl PoolConfig {
    /// Creates a config with default settings and no workers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the initial worklist.
    pub fn with_workers(mut self, workers: impl IntoIterator<Item = WorkerSpec>) -> Self {
        self.workers = workers.into_iter().collect();
        self
    }

    /// Appends one worker to the initial worklist.
    pub fn worker(mut self, spec: WorkerSpec) -> Self {
        self.workers.push(spec);
        self
    }

    /// Sets the requested concurrency cap.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Sets the global kill timeout.
    pub fn with_kill_timeout(mut self, timeout: Duration) -> Self {
        self.kill_timeout = timeout;
        self
    }

    /// Sets the supervision poll interval.
    pub fn with_poll_frequency(mut self, freq: Duration) -> Self {
        self.poll_frequency = freq;
        self
    }

    /// Disables the CPU-core cap.
    pub fn no_limits(mut self) -> Self {
        self.no_limits = true;
        self
    }

    /// Registers a custom message handler for a tag.
    ///
    /// Reserved tags are rejected by [`Pool::new`](crate::Pool::new).
    pub fn on(mut self, tag: impl Into<String>, handler: HandlerRef) -> Self {
        self.handlers = self.handlers.on(tag, handler);
        self
    }

    /// Called once after `run` has submitted all initial tasks.
    pub fn on_init(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_init = Some(Arc::new(f));
        self
    }

    /// Called once per run when the pool reaches its terminal state.
    pub fn on_finished(mut self, f: impl Fn(PoolStatus) + Send + Sync + 'static) -> Self {
        self.on_finished = Some(Arc::new(f));
        self
    }

    /// Resolves the effective concurrency cap.
    pub fn effective_concurrency(&self) -> usize {
        let requested = self.concurrency.max(1);
        if self.no_limits {
            requested
        } else {
            requested.min(num_cpus::get())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = PoolConfig::default();
        assert_eq!(cfg.concurrency, DEFAULT_CONCURRENCY);
        assert_eq!(cfg.kill_timeout, DEFAULT_KILL_TIMEOUT);
        assert_eq!(cfg.poll_frequency, DEFAULT_POLL_FREQUENCY);
        assert!(!cfg.no_limits);
        assert!(cfg.workers.is_empty());
    }

    #[test]
    fn concurrency_is_capped_at_cpu_count() {
        let cfg = PoolConfig::new().with_concurrency(usize::MAX);
        assert_eq!(cfg.effective_concurrency(), num_cpus::get());
    }

    #[test]
    fn no_limits_disables_the_cap() {
        let cfg = PoolConfig::new()
            .with_concurrency(num_cpus::get() + 32)
            .no_limits();
        assert_eq!(cfg.effective_concurrency(), num_cpus::get() + 32);
    }

    #[test]
    fn zero_concurrency_is_clamped_to_one() {
        let cfg = PoolConfig::new().with_concurrency(0);
        assert_eq!(cfg.effective_concurrency(), 1);
    }
}

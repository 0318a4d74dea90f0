//! # Pool: the bounded-concurrency process pool controller.
//!
//! Owns the [`TaskQueue`], the shared registry, and the per-run global
//! supervision loop. One `Pool` can be run any number of times; each `run`
//! resets the registry and error state before submitting the worklist.
//!
//! ```text
//!             ┌────────────────────────────────────────────┐
//!             │                    Pool                    │
//!             │  run ──► TaskQueue (FIFO, ≤ limit)         │
//!             │            │ admits                        │
//!             │            ▼                               │
//!             │      TaskSupervisor ──► child process      │
//!             │            │ registers / reports           │
//!             │            ▼                               │
//!             │        PoolShared ──► Bus ──► subscribers  │
//!             │                                            │
//!             │  supervision loop ──► PoolFinished         │
//!             └────────────────────────────────────────────┘
//! ```
//!
//! ## Rules
//! - The supervision loop is armed per run and fires `PoolFinished` exactly
//!   once per run, `Completed` or `Aborted`.
//! - `run` on a pool with live workers kills them first; old errors and
//!   handles never leak into the new run.
//! - Tasks added mid-run join the same FIFO queue and count toward the same
//!   terminal condition.
//! - Dropping the pool cancels the root token: the queue driver, every
//!   supervisor, and every poll timer stop, and live children are killed.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tokio::sync::{broadcast, mpsc, watch, RwLock};
use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::error::{PoolError, WorkerError};
use crate::events::{Bus, EventKind, PoolEvent, PoolStatus};
use crate::pool::config::{FinishedFn, PoolConfig};
use crate::pool::PoolShared;
use crate::queue::{DoneFn, TaskQueue};
use crate::task::{TaskState, TaskSupervisor, WorkerHandle};
use crate::workers::WorkerSpec;

/// Bounded-concurrency pool of worker processes.
pub struct Pool {
    cfg: PoolConfig,
    limit: usize,
    shared: Arc<PoolShared>,
    queue: TaskQueue<Option<WorkerError>>,
    root: CancellationToken,
    tasks: Arc<RwLock<Vec<TaskState>>>,
    run_token: RwLock<CancellationToken>,
    status: watch::Sender<Option<PoolStatus>>,
}

impl Pool {
    /// Creates a pool from the given configuration.
    ///
    /// Fails if a custom handler is registered under a reserved message tag.
    pub fn new(cfg: PoolConfig) -> Result<Self, PoolError> {
        cfg.handlers.validate()?;

        let limit = cfg.effective_concurrency();
        if !cfg.no_limits && limit < cfg.concurrency {
            tracing::warn!(
                requested = cfg.concurrency,
                effective = limit,
                "concurrency capped at the CPU core count",
            );
        }

        let root = CancellationToken::new();
        let bus = Bus::new(cfg.bus_capacity);
        let queue = TaskQueue::new(limit, root.child_token());
        let shared = PoolShared::new(
            bus,
            cfg.handlers.clone(),
            root.child_token(),
            cfg.kill_timeout,
            cfg.poll_frequency,
        );
        let (status, _) = watch::channel(None);

        Ok(Self {
            cfg,
            limit,
            shared,
            queue,
            root,
            tasks: Arc::new(RwLock::new(Vec::new())),
            run_token: RwLock::new(CancellationToken::new()),
            status,
        })
    }

    /// Starts (or restarts) the pool over its configured worklist.
    ///
    /// Kills any workers left over from a previous run, discards its queued
    /// tasks (their run token is cancelled before the registry is reset),
    /// clears recorded errors, submits every configured [`WorkerSpec`] to
    /// the queue in order, and arms the supervision loop for this run.
    pub async fn run(&self) {
        {
            let mut tok = self.run_token.write().await;
            tok.cancel();
            *tok = self.root.child_token();
        }
        self.shared.kill_all().await;
        self.shared.reset().await;
        self.tasks.write().await.clear();
        let _ = self.status.send(None);

        let started = Instant::now();
        tracing::debug!(workers = self.cfg.workers.len(), limit = self.limit, "pool run");

        for spec in self.cfg.workers.clone() {
            self.enqueue(spec, None).await;
        }

        let token = self.run_token.read().await.clone();
        self.spawn_supervision(started, token);

        if let Some(on_init) = &self.cfg.on_init {
            on_init();
        }
    }

    /// Adds one task to the current run.
    pub async fn add_task(&self, spec: WorkerSpec) {
        self.enqueue(spec, None).await;
    }

    /// Adds one task with a completion callback.
    ///
    /// The callback receives the task's classified outcome: `None` for a
    /// clean termination, or the error that terminated it.
    pub async fn add_task_with(
        &self,
        spec: WorkerSpec,
        done: impl FnOnce(Option<WorkerError>) + Send + 'static,
    ) {
        self.enqueue(spec, Some(Box::new(done))).await;
    }

    async fn enqueue(&self, spec: WorkerSpec, done: Option<DoneFn<Option<WorkerError>>>) {
        let state = TaskState::new();
        self.tasks.write().await.push(state.clone());
        let run_token = self.run_token.read().await.clone();
        let supervisor = TaskSupervisor::new(spec, Arc::clone(&self.shared), state, run_token);
        match done {
            Some(done) => self.queue.submit_with(supervisor.run(), done),
            None => self.queue.submit(supervisor.run()),
        }
    }

    /// Terminates every live worker. The run then finishes through the
    /// normal supervision path.
    pub async fn kill_all(&self) {
        self.shared.kill_all().await;
    }

    /// Number of spawned workers that have not yet terminated.
    pub async fn active_forks(&self) -> usize {
        self.shared.active_forks().await
    }

    /// Number of submitted tasks not yet spawned.
    pub async fn pending_tasks(&self) -> usize {
        self.tasks
            .read()
            .await
            .iter()
            .filter(|t| !t.is_spawned())
            .count()
    }

    /// Snapshot of every handle spawned during the current run, in spawn
    /// order.
    pub async fn forks(&self) -> Vec<Arc<WorkerHandle>> {
        self.shared.forks().await
    }

    /// Snapshot of the per-handle error lists for the current run.
    pub async fn errors(&self) -> HashMap<String, Vec<WorkerError>> {
        self.shared.errors_snapshot().await
    }

    /// Snapshot of the data bucket shared with custom message handlers.
    pub async fn data(&self) -> HashMap<String, Value> {
        self.shared.data_bucket().read().await.clone()
    }

    /// The effective concurrency cap resolved at construction.
    pub fn concurrency_limit(&self) -> usize {
        self.limit
    }

    /// Subscribes to the pool's event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<PoolEvent> {
        self.shared.bus.subscribe()
    }

    /// Per-handle error stream: every error recorded against `id`.
    ///
    /// The stream ends when the pool is dropped or the receiver is dropped.
    pub fn worker_errors(&self, id: impl Into<String>) -> mpsc::UnboundedReceiver<WorkerError> {
        let id = id.into();
        let (tx, rx) = mpsc::unbounded_channel();
        let mut events = self.shared.bus.subscribe();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(ev) if ev.is_error_for(&id) => {
                        if let Some(err) = ev.error {
                            if tx.send(err).is_err() {
                                break;
                            }
                        }
                    }
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        rx
    }

    /// Waits for the current run's terminal state.
    ///
    /// Resolves immediately if the run already finished. Resolves `Aborted`
    /// if the pool is dropped while waiting.
    pub async fn finished(&self) -> PoolStatus {
        let mut rx = self.status.subscribe();
        loop {
            if let Some(status) = *rx.borrow_and_update() {
                return status;
            }
            if rx.changed().await.is_err() {
                return PoolStatus::Aborted;
            }
        }
    }

    /// Arms the per-run supervision loop.
    ///
    /// The loop polls at the pool's `poll_frequency` until either the global
    /// `kill_timeout` elapses (abort) or the backlog, the queue, and the
    /// live-fork count all reach zero (complete). It then publishes the
    /// run's single `PoolFinished` event.
    fn spawn_supervision(&self, started: Instant, token: CancellationToken) {
        let shared = Arc::clone(&self.shared);
        let queue = self.queue.clone();
        let tasks = Arc::clone(&self.tasks);
        let status_tx = self.status.clone();
        let on_finished: Option<FinishedFn> = self.cfg.on_finished.clone();
        let kill_timeout = self.cfg.kill_timeout;
        let poll_frequency = self.cfg.poll_frequency;

        tokio::spawn(async move {
            let mut ticker = time::interval(poll_frequency);
            let status = loop {
                tokio::select! {
                    _ = token.cancelled() => return,
                    _ = ticker.tick() => {}
                }

                if started.elapsed() > kill_timeout {
                    tracing::warn!(timeout = ?kill_timeout, "pool exceeded its kill timeout");
                    shared.kill_all().await;
                    break PoolStatus::Aborted;
                }

                let pending = tasks.read().await.iter().filter(|t| !t.is_spawned()).count();
                if pending == 0 && queue.is_idle() && shared.active_forks().await == 0 {
                    break PoolStatus::Completed;
                }
            };

            tracing::debug!(status = %status, "pool finished");
            shared
                .bus
                .publish(PoolEvent::now(EventKind::PoolFinished).with_status(status));
            let _ = status_tx.send(Some(status));
            if let Some(on_finished) = on_finished {
                on_finished(status);
            }
        });
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        self.root.cancel();
    }
}

//! # TaskSupervisor: single-spawn supervisor.
//!
//! Drives exactly one worker from OS spawn to termination. The supervisor's
//! [`run`](TaskSupervisor::run) future is the job admitted by the pool's
//! [`TaskQueue`](crate::TaskQueue); it resolves only once the handle has
//! terminated and the process has been reaped.
//!
//! ## State machine (per handle)
//! ```text
//! spawned ──► running ──► terminated (absorbing)
//!
//! running transitions:
//!   message "finished"   → terminate(payload error, or clean)
//!   message "softError"  → record + emit Soft → terminate(Soft)
//!   message <custom tag> → dispatch to handler, stay running
//!   stdout EOF           → channel closed, await exit
//!   exit code 0          → terminate(clean)
//!   exit nonzero         → record + emit Fork → terminate(Fork)
//!   poll timer expiry    → record + emit Timeout → terminate(Timeout) + kill
//!   kill_all / re-run    → terminate(clean) + kill
//! ```
//!
//! ## Rules
//! - All buffered messages are drained before the exit status is classified,
//!   so a `softError` sent just before exiting is never lost to the race
//!   between the pipe and process reaping.
//! - A terminal message wins over the exit status: a handle that reported
//!   `finished` or `softError` is never reclassified by its exit code.
//!   `Fork` is recorded only for workers that exited nonzero without a
//!   terminal message, and at most once per handle.
//! - The supervisor always reaps the child before resolving — a handle that
//!   was terminated early (timeout, kill) gets a kill signal on the way out,
//!   never a zombie.

use std::process::ExitStatus;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::error::WorkerError;
use crate::pool::PoolShared;
use crate::task::{TaskState, WorkerHandle};
use crate::workers::{HandlerCtx, WorkerMessage, WorkerSpec, EVENT_FINISHED, EVENT_SOFT_ERROR};

/// Supervises the full lifecycle of one worker spawn.
pub(crate) struct TaskSupervisor {
    spec: WorkerSpec,
    shared: Arc<PoolShared>,
    state: TaskState,
    run_token: CancellationToken,
}

impl TaskSupervisor {
    pub(crate) fn new(
        spec: WorkerSpec,
        shared: Arc<PoolShared>,
        state: TaskState,
        run_token: CancellationToken,
    ) -> Self {
        Self {
            spec,
            shared,
            state,
            run_token,
        }
    }

    /// Runs the worker to termination and returns its classified outcome.
    ///
    /// Jobs still queued when their run is superseded by a new `run()` carry
    /// a cancelled run token and resolve without spawning or registering.
    pub(crate) async fn run(self) -> Option<WorkerError> {
        if self.run_token.is_cancelled() {
            tracing::debug!(path = %self.spec.path.display(), "skipping task from a superseded run");
            return None;
        }
        self.state.mark_spawned();

        let mut child = match self.spec.command().spawn() {
            Ok(child) => child,
            Err(e) => {
                let handle = self
                    .shared
                    .register(&self.spec, self.state.completed_flag(), false)
                    .await;
                let err = WorkerError::Spawn {
                    id: handle.id().to_string(),
                    message: e.to_string(),
                };
                tracing::warn!(id = %handle.id(), error = %err, "spawn failed");
                self.shared.report_error(err.clone()).await;
                handle.terminate(Some(err));
                return handle.take_outcome();
            }
        };

        // A new run may have reset the registry between the token check and
        // the spawn; a late registration here would leak into it.
        if self.run_token.is_cancelled() {
            let _ = child.start_kill();
            let _ = child.wait().await;
            return None;
        }

        let stdout = child.stdout.take();
        let handle = self
            .shared
            .register(&self.spec, self.state.completed_flag(), true)
            .await;
        tracing::debug!(
            id = %handle.id(),
            path = %self.spec.path.display(),
            description = self.spec.description.as_deref(),
            "spawned worker",
        );

        spawn_poll_timer(Arc::clone(&self.shared), Arc::clone(&handle));

        // Message channel: read until EOF or termination.
        if let Some(stdout) = stdout {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                tokio::select! {
                    _ = handle.cancelled() => break,
                    line = lines.next_line() => match line {
                        Ok(Some(line)) => self.on_line(&handle, &line).await,
                        Ok(None) | Err(_) => {
                            handle.set_disconnected();
                            break;
                        }
                    }
                }
            }
        }

        // Channel closed without a terminal message: converge via the exit code.
        if !handle.is_terminated() {
            tokio::select! {
                _ = handle.cancelled() => {}
                status = child.wait() => match status {
                    Ok(status) => self.on_exit(&handle, status).await,
                    Err(e) => {
                        tracing::warn!(id = %handle.id(), error = %e, "wait failed");
                        handle.terminate(None);
                    }
                }
            }
        }

        // Reap. Handles terminated by timeout or kill_all still have a live
        // process at this point.
        if !matches!(child.try_wait(), Ok(Some(_))) {
            let _ = child.start_kill();
            let _ = child.wait().await;
        }

        handle.terminate(None);
        handle.take_outcome()
    }

    /// Dispatches one stdout line.
    async fn on_line(&self, handle: &Arc<WorkerHandle>, line: &str) {
        let Some(msg) = WorkerMessage::parse(line) else {
            tracing::trace!(id = %handle.id(), "non-protocol worker output");
            return;
        };
        match msg.event.as_str() {
            EVENT_FINISHED => {
                let err = msg.record().map(|r| WorkerError::soft(handle.id(), r));
                if let Some(err) = &err {
                    self.shared.report_error(err.clone()).await;
                }
                handle.terminate(err);
            }
            EVENT_SOFT_ERROR => {
                let err = WorkerError::soft(handle.id(), msg.record().unwrap_or_default());
                self.shared.report_error(err.clone()).await;
                handle.terminate(Some(err));
            }
            tag => match self.shared.handlers.get(tag) {
                Some(handler) => {
                    let ctx = HandlerCtx::new(handle.id_arc(), self.shared.data_bucket());
                    handler.on_message(ctx, msg.data).await;
                }
                None => {
                    tracing::debug!(id = %handle.id(), tag, "no handler registered for worker event");
                }
            },
        }
    }

    /// Classifies the process exit status.
    async fn on_exit(&self, handle: &Arc<WorkerHandle>, status: ExitStatus) {
        if status.success() {
            handle.terminate(None);
            return;
        }
        let code = status.code().unwrap_or(-1);
        let err = WorkerError::Fork {
            id: handle.id().to_string(),
            code,
        };
        self.shared.report_error(err.clone()).await;
        handle.terminate(Some(err));
    }
}

/// Per-handle timeout timer: polls every `poll_frequency` and terminates the
/// worker once its lifetime exceeds `kill_timeout`.
///
/// The loop exits on the handle token, so termination from any path stops
/// the timer as a paired operation.
fn spawn_poll_timer(shared: Arc<PoolShared>, handle: Arc<WorkerHandle>) {
    tokio::spawn(async move {
        let mut ticker = time::interval(handle.poll_frequency());
        loop {
            tokio::select! {
                _ = handle.cancelled() => break,
                _ = ticker.tick() => {
                    if handle.elapsed() > handle.kill_timeout() {
                        let err = WorkerError::Timeout {
                            id: handle.id().to_string(),
                            timeout: handle.kill_timeout(),
                        };
                        tracing::warn!(
                            id = %handle.id(),
                            timeout = ?handle.kill_timeout(),
                            "worker exceeded its kill timeout",
                        );
                        shared.report_error(err.clone()).await;
                        handle.terminate(Some(err));
                        break;
                    }
                }
            }
        }
    });
}

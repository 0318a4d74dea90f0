//! # TaskQueue: generic bounded-parallelism FIFO runner.
//!
//! Accepts `(job, done)` pairs and runs at most `limit` jobs concurrently.
//! Jobs are admitted in submission order as concurrency slots free up; the
//! queue has no knowledge of what a job does.
//!
//! ## Architecture
//! ```text
//! submit(job, done) ──► mpsc (FIFO) ──► driver loop
//!                                          │ acquire semaphore permit (in order)
//!                                          ▼
//!                                   tokio::spawn(job)
//!                                          │ job resolves
//!                                          ├─► done(outcome)
//!                                          └─► release permit, notify drain
//! ```
//!
//! ## Rules
//! - `submit` never blocks; saturated queues simply buffer the job.
//! - Admission is strictly FIFO: the single driver acquires permits in order.
//! - A job's outcome is handed to its `done` callback and otherwise ignored;
//!   failures never affect scheduling of the next queued job.
//! - The drain [`Notify`] fires when the backlog and in-flight count both
//!   reach zero.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::{mpsc, Notify, Semaphore};
use tokio_util::sync::CancellationToken;

/// Completion callback invoked with a job's outcome.
pub type DoneFn<T> = Box<dyn FnOnce(T) + Send + 'static>;

struct QueueItem<T> {
    job: BoxFuture<'static, T>,
    done: Option<DoneFn<T>>,
}

struct QueueState {
    /// Submitted but not yet admitted.
    pending: AtomicUsize,
    /// Admitted and still running.
    in_flight: AtomicUsize,
    drained: Notify,
}

impl QueueState {
    fn is_idle(&self) -> bool {
        self.pending.load(Ordering::SeqCst) == 0 && self.in_flight.load(Ordering::SeqCst) == 0
    }
}

/// Bounded-parallelism FIFO execution queue.
///
/// Cloning produces another handle to the same queue.
pub struct TaskQueue<T: Send + 'static> {
    tx: mpsc::UnboundedSender<QueueItem<T>>,
    state: Arc<QueueState>,
}

impl<T: Send + 'static> Clone for TaskQueue<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            state: Arc::clone(&self.state),
        }
    }
}

impl<T: Send + 'static> TaskQueue<T> {
    /// Creates a queue running at most `limit` jobs concurrently.
    ///
    /// The driver loop stops when `token` is cancelled; buffered jobs are
    /// dropped at that point, in-flight jobs run to completion.
    pub fn new(limit: usize, token: CancellationToken) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<QueueItem<T>>();
        let state = Arc::new(QueueState {
            pending: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            drained: Notify::new(),
        });
        let semaphore = Arc::new(Semaphore::new(limit.max(1)));

        let st = Arc::clone(&state);
        tokio::spawn(async move {
            loop {
                let item = tokio::select! {
                    _ = token.cancelled() => break,
                    item = rx.recv() => match item {
                        Some(item) => item,
                        None => break,
                    },
                };
                let permit = tokio::select! {
                    _ = token.cancelled() => break,
                    permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_closed) => break,
                    },
                };

                st.pending.fetch_sub(1, Ordering::SeqCst);
                st.in_flight.fetch_add(1, Ordering::SeqCst);

                let st = Arc::clone(&st);
                tokio::spawn(async move {
                    let outcome = item.job.await;
                    if let Some(done) = item.done {
                        done(outcome);
                    }
                    drop(permit);
                    let was_last = st.in_flight.fetch_sub(1, Ordering::SeqCst) == 1;
                    if was_last && st.pending.load(Ordering::SeqCst) == 0 {
                        st.drained.notify_waiters();
                    }
                });
            }
        });

        Self { tx, state }
    }

    /// Enqueues a job. Never blocks.
    pub fn submit(&self, job: impl std::future::Future<Output = T> + Send + 'static) {
        self.push(Box::pin(job), None);
    }

    /// Enqueues a job with a completion callback.
    ///
    /// `done` is invoked with the job's outcome once it resolves, before the
    /// concurrency slot is released.
    pub fn submit_with(
        &self,
        job: impl std::future::Future<Output = T> + Send + 'static,
        done: impl FnOnce(T) + Send + 'static,
    ) {
        self.push(Box::pin(job), Some(Box::new(done)));
    }

    fn push(&self, job: BoxFuture<'static, T>, done: Option<DoneFn<T>>) {
        self.state.pending.fetch_add(1, Ordering::SeqCst);
        if self.tx.send(QueueItem { job, done }).is_err() {
            self.state.pending.fetch_sub(1, Ordering::SeqCst);
        }
    }

    /// Number of submitted jobs not yet admitted.
    pub fn pending(&self) -> usize {
        self.state.pending.load(Ordering::SeqCst)
    }

    /// True when the backlog is empty and no job is running.
    pub fn is_idle(&self) -> bool {
        self.state.is_idle()
    }

    /// Waits until the queue is idle.
    ///
    /// Returns immediately if the queue is already idle. An empty queue that
    /// never received a job counts as idle.
    pub async fn drained(&self) {
        loop {
            if self.state.is_idle() {
                return;
            }
            let notified = self.state.drained.notified();
            tokio::pin!(notified);
            // Register before the recheck so a wakeup between the two cannot
            // be lost.
            notified.as_mut().enable();
            if self.state.is_idle() {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn concurrency_never_exceeds_limit() {
        let queue = TaskQueue::<()>::new(3, CancellationToken::new());
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        for _ in 0..10 {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            queue.submit(async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                running.fetch_sub(1, Ordering::SeqCst);
            });
        }

        queue.drained().await;
        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert!(queue.is_idle());
    }

    #[tokio::test]
    async fn jobs_are_admitted_in_submission_order() {
        let queue = TaskQueue::<()>::new(1, CancellationToken::new());
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));

        for i in 0..5 {
            let order = Arc::clone(&order);
            queue.submit(async move {
                order.lock().unwrap().push(i);
            });
        }

        queue.drained().await;
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn done_callbacks_receive_outcomes() {
        let queue = TaskQueue::<u32>::new(2, CancellationToken::new());
        let sum = Arc::new(AtomicUsize::new(0));

        for i in 1..=4u32 {
            let sum = Arc::clone(&sum);
            queue.submit_with(async move { i }, move |n| {
                sum.fetch_add(n as usize, Ordering::SeqCst);
            });
        }

        queue.drained().await;
        assert_eq!(sum.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn drained_returns_immediately_when_empty() {
        let queue = TaskQueue::<()>::new(4, CancellationToken::new());
        queue.drained().await;
        assert!(queue.is_idle());
    }
}

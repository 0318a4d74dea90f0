//! # forq
//!
//! **Forq** is a bounded-concurrency task queue that runs each task as an
//! isolated OS process.
//!
//! Tasks are spawned as child processes, at most `concurrency` at a time,
//! admitted in submission order. Each child speaks a JSON-lines protocol on
//! its stdout: it can finish cleanly, finish with a recoverable error, or
//! emit custom messages that the pool dispatches to caller-registered
//! handlers. Every worker is watched by a per-handle timeout timer, and a
//! global supervision loop aborts the whole run when its deadline elapses.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │  WorkerSpec  │   │  WorkerSpec  │   │  WorkerSpec  │
//!     │  (task #1)   │   │  (task #2)   │   │  (task #3)   │
//!     └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!            ▼                  ▼                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Pool (controller)                                                │
//! │  - TaskQueue (FIFO admission, ≤ concurrency in flight)            │
//! │  - PoolShared (forks, forks_hash, per-id error lists, data)       │
//! │  - Bus (broadcast events)                                         │
//! │  - supervision loop (global kill timeout, terminal detection)     │
//! └──────┬──────────────────┬──────────────────┬──────────────────────┘
//!        ▼                  ▼                  ▼
//!  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!  │TaskSupervisor│   │TaskSupervisor│   │TaskSupervisor│
//!  │ + poll timer │   │ + poll timer │   │ + poll timer │
//!  └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!         │ spawns           │ spawns           │ spawns
//!         ▼                  ▼                  ▼
//!  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!  │child process │   │child process │   │child process │
//!  │ stdout: JSON │   │ stdout: JSON │   │ stdout: JSON │
//!  └──────────────┘   └──────────────┘   └──────────────┘
//!
//!  events (WorkerSpawned / WorkerErrored / WorkerTerminated /
//!  PoolFinished) flow through the Bus to any number of subscribers.
//! ```
//!
//! ### Worker lifecycle
//! ```text
//! WorkerSpec ──► TaskQueue ──► TaskSupervisor::run()
//!
//!   ├─► spawn child (stdin null, stdout piped)
//!   ├─► register handle, publish WorkerSpawned
//!   ├─► arm per-handle poll timer (kill_timeout / poll_frequency)
//!   ├─► read stdout lines:
//!   │     "finished"   ─► terminate (clean, or Soft if a record is attached)
//!   │     "softError"  ─► record Soft error ─► terminate
//!   │     custom tag   ─► dispatch to registered handler, keep reading
//!   ├─► on EOF: await exit status
//!   │     code 0       ─► terminate (clean)
//!   │     nonzero      ─► record Fork error ─► terminate
//!   ├─► on timer expiry: record Timeout error ─► terminate ─► kill
//!   └─► reap the child, resolve with the classified outcome
//! ```
//!
//! ## Features
//! | Area           | Description                                              | Key types                                 |
//! |----------------|----------------------------------------------------------|-------------------------------------------|
//! | **Pool**       | Run, re-run, add tasks mid-flight, kill all, wait.       | [`Pool`], [`PoolConfig`]                  |
//! | **Workers**    | Describe what to run and how to wire stdio.              | [`WorkerSpec`], [`WorkerOptions`]         |
//! | **Protocol**   | JSON-lines messages between worker and pool.             | [`WorkerMessage`], [`Reporter`]           |
//! | **Handlers**   | Dispatch custom message tags to caller code.             | [`MessageHandler`], [`HandlerFn`]         |
//! | **Events**     | Observe the run as a broadcast stream.                   | [`PoolEvent`], [`EventKind`], [`Bus`]     |
//! | **Errors**     | Classified per-worker failures, listed per handle id.    | [`WorkerError`], [`ErrorRecord`]          |
//! | **Queue**      | Generic bounded-parallelism FIFO runner.                 | [`TaskQueue`]                             |
//!
//! ## Example
//! ```rust,no_run
//! use forq::{Pool, PoolConfig, PoolStatus, WorkerSpec};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cfg = PoolConfig::new()
//!         .with_concurrency(2)
//!         .worker(WorkerSpec::new("./crawl.sh").arg("https://example.com"))
//!         .worker(WorkerSpec::new("./crawl.sh").arg("https://example.org"));
//!
//!     let pool = Pool::new(cfg)?;
//!     pool.run().await;
//!
//!     match pool.finished().await {
//!         PoolStatus::Completed => println!("all workers done"),
//!         PoolStatus::Aborted => println!("deadline hit, workers killed"),
//!     }
//!     for (id, errs) in pool.errors().await {
//!         for err in errs {
//!             eprintln!("{id}: {err}");
//!         }
//!     }
//!     Ok(())
//! }
//! ```

mod error;
mod events;
mod pool;
mod queue;
mod task;
mod workers;

// ---- Public re-exports ----

pub use error::{ErrorRecord, PoolError, WorkerError};
pub use events::{Bus, EventKind, PoolEvent, PoolStatus};
pub use pool::{
    Pool, PoolConfig, DEFAULT_BUS_CAPACITY, DEFAULT_CONCURRENCY, DEFAULT_KILL_TIMEOUT,
    DEFAULT_POLL_FREQUENCY,
};
pub use queue::{DoneFn, TaskQueue};
pub use task::WorkerHandle;
pub use workers::{
    HandlerCtx, HandlerFn, HandlerMap, HandlerRef, MessageHandler, Reporter, WorkerMessage,
    WorkerOptions, WorkerSpec, EVENT_FINISHED, EVENT_SOFT_ERROR, EVENT_TERMINATED,
};

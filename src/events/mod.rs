//! Pool events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish/subscribe to lifecycle events emitted by the pool and its
//! per-worker supervisors.
//!
//! ## Contents
//! - [`EventKind`], [`PoolEvent`], [`PoolStatus`] — event classification and payload
//! - [`Bus`] — thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `Pool` (finished), `TaskSupervisor` and its poll timer
//!   (spawned/errored), `WorkerHandle::terminate` (terminated).
//! - **Consumers**: callers via [`Pool::subscribe`](crate::Pool::subscribe) and
//!   the per-id filter [`Pool::worker_errors`](crate::Pool::worker_errors).

mod bus;
mod event;

pub use bus::Bus;
pub use event::{EventKind, PoolEvent, PoolStatus};

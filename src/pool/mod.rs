//! Pool core: configuration, shared bookkeeping, and the controller.
//!
//! Internal modules:
//! - [`config`]: [`PoolConfig`] — caller-facing configuration and defaults;
//! - [`shared`]: registry state shared between the pool and its supervisors;
//! - [`core`]: [`Pool`] — run/add_task/kill_all and the global supervision loop.

mod config;
mod core;
mod shared;

pub use config::{
    PoolConfig, DEFAULT_BUS_CAPACITY, DEFAULT_CONCURRENCY, DEFAULT_KILL_TIMEOUT,
    DEFAULT_POLL_FREQUENCY,
};
pub use self::core::Pool;
pub(crate) use shared::PoolShared;

//! Worker descriptors, the wire protocol, and the caller/worker seams.
//!
//! Internal modules:
//! - [`spec`]: [`WorkerSpec`]/[`WorkerOptions`] — what to run and how to wire stdio;
//! - [`message`]: the JSON-lines message protocol between worker and pool;
//! - [`handler`]: typed dispatch of custom message tags to caller handlers;
//! - [`reporter`]: the helper a worker program uses to speak the protocol.

pub(crate) mod handler;
mod message;
mod reporter;
mod spec;

pub use handler::{HandlerCtx, HandlerFn, HandlerMap, HandlerRef, MessageHandler};
pub use message::{WorkerMessage, EVENT_FINISHED, EVENT_SOFT_ERROR, EVENT_TERMINATED};
pub use reporter::Reporter;
pub use spec::{WorkerOptions, WorkerSpec};

//! # Typed dispatch of custom worker messages.
//!
//! Messages whose tag is neither `finished` nor `softError` are routed to a
//! caller-registered [`MessageHandler`] by exact name. The [`HandlerMap`] is
//! validated when the pool is constructed, not at delivery time: reserved
//! tags are rejected up front.
//!
//! Handlers receive the handle as an explicit [`HandlerCtx`] — a narrow view
//! carrying the handle id and an accessor for the pool's shared data bucket —
//! rather than any implicit context.
//!
//! ## Concurrency
//! Handler invocations for a single handle are serialized (they run inline in
//! that handle's message loop). Handlers for *different* handles may run
//! concurrently; when mutating the shared bucket, prefer commutative updates
//! via [`HandlerCtx::update`] over read-modify-write across awaits.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::error::PoolError;
use crate::workers::message::RESERVED_EVENTS;

/// Shared caller-visible data bucket, keyed by arbitrary strings.
pub(crate) type DataBucket = Arc<RwLock<HashMap<String, Value>>>;

/// Narrow view of a worker handle passed to message handlers.
#[derive(Clone)]
pub struct HandlerCtx {
    id: Arc<str>,
    data: DataBucket,
}

impl HandlerCtx {
    pub(crate) fn new(id: Arc<str>, data: DataBucket) -> Self {
        Self { id, data }
    }

    /// Id of the handle whose worker sent the message.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Applies a closure to the pool's shared data bucket under its write lock.
    pub async fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut HashMap<String, Value>),
    {
        let mut data = self.data.write().await;
        f(&mut data);
    }

    /// Reads one key from the shared data bucket.
    pub async fn get(&self, key: &str) -> Option<Value> {
        self.data.read().await.get(key).cloned()
    }
}

/// # Asynchronous handler for one custom message tag.
///
/// Implementors receive the message payload together with an explicit
/// [`HandlerCtx`] for the originating handle.
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    /// Called once per matching message, in arrival order for a given handle.
    async fn on_message(&self, ctx: HandlerCtx, data: Value);
}

/// Shared handler reference.
pub type HandlerRef = Arc<dyn MessageHandler>;

/// Function-backed message handler.
///
/// Wraps a closure that creates a fresh future per message.
///
/// ## Example
/// ```
/// use forq::{HandlerCtx, HandlerFn, HandlerRef};
/// use serde_json::Value;
///
/// let h: HandlerRef = HandlerFn::arc(|ctx: HandlerCtx, data: Value| async move {
///     println!("worker {} sent {data}", ctx.id());
/// });
/// # let _ = h;
/// ```
pub struct HandlerFn<F> {
    f: F,
}

impl<F> HandlerFn<F> {
    /// Creates a new function-backed handler.
    pub fn new(f: F) -> Self {
        Self { f }
    }

    /// Creates the handler and returns it as a shared [`HandlerRef`].
    pub fn arc(f: F) -> Arc<Self> {
        Arc::new(Self::new(f))
    }
}

#[async_trait]
impl<F, Fut> MessageHandler for HandlerFn<F>
where
    F: Fn(HandlerCtx, Value) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    async fn on_message(&self, ctx: HandlerCtx, data: Value) {
        (self.f)(ctx, data).await;
    }
}

/// Dispatch table from message tag to handler.
#[derive(Clone, Default)]
pub struct HandlerMap {
    inner: HashMap<String, HandlerRef>,
}

impl HandlerMap {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler for a tag, replacing any previous one.
    pub fn on(mut self, tag: impl Into<String>, handler: HandlerRef) -> Self {
        self.inner.insert(tag.into(), handler);
        self
    }

    /// Rejects reserved tags. Called once at pool construction.
    pub(crate) fn validate(&self) -> Result<(), PoolError> {
        for tag in self.inner.keys() {
            if RESERVED_EVENTS.contains(&tag.as_str()) {
                return Err(PoolError::ReservedEvent { name: tag.clone() });
            }
        }
        Ok(())
    }

    pub(crate) fn get(&self, tag: &str) -> Option<&HandlerRef> {
        self.inner.get(tag)
    }

    /// True when no handlers are registered.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workers::message::EVENT_SOFT_ERROR;

    fn noop() -> HandlerRef {
        HandlerFn::arc(|_ctx: HandlerCtx, _data: Value| async {})
    }

    #[test]
    fn reserved_tags_are_rejected() {
        let map = HandlerMap::new().on(EVENT_SOFT_ERROR, noop());
        let err = map.validate().unwrap_err();
        assert!(matches!(err, PoolError::ReservedEvent { name } if name == EVENT_SOFT_ERROR));
    }

    #[test]
    fn custom_tags_pass_validation() {
        let map = HandlerMap::new().on("progress", noop()).on("metrics", noop());
        assert!(map.validate().is_ok());
        assert!(map.get("progress").is_some());
        assert!(map.get("unknown").is_none());
    }

    #[tokio::test]
    async fn ctx_updates_the_shared_bucket() {
        let data: DataBucket = Arc::new(RwLock::new(HashMap::new()));
        let ctx = HandlerCtx::new(Arc::from("w1"), Arc::clone(&data));

        ctx.update(|d| {
            let n = d.get("count").and_then(Value::as_i64).unwrap_or(0);
            d.insert("count".to_string(), Value::from(n + 1));
        })
        .await;

        assert_eq!(ctx.get("count").await, Some(Value::from(1)));
        assert_eq!(ctx.id(), "w1");
    }
}

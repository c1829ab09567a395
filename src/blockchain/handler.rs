use async_trait::async_trait;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::error::WatcherError;
use crate::logging::{ErrorLogger, LogContext};

pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;
pub type HandlerResult = Result<(), HandlerError>;

/// A callback invoked for every event a watcher reports.
///
/// Delivery is at-least-once: the same event may reach a handler again after
/// a failed poll, so handlers must be idempotent. Any async closure taking
/// the event implements this trait.
#[async_trait]
pub trait EventHandler<E: Send + 'static>: Send + Sync {
    async fn handle(&self, event: E) -> HandlerResult;
}

#[async_trait]
impl<E, F, Fut> EventHandler<E> for F
where
    E: Send + 'static,
    F: Fn(E) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    async fn handle(&self, event: E) -> HandlerResult {
        (self)(event).await
    }
}

/// Identifies a registered handler so it can be removed later
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

/// Ordered set of handlers for one event type
pub(crate) struct HandlerSet<E: Send + 'static> {
    handlers: RwLock<Vec<(HandlerId, Arc<dyn EventHandler<E>>)>>,
    next_id: AtomicU64,
}

impl<E: Send + 'static> HandlerSet<E> {
    pub(crate) fn new() -> Self {
        Self {
            handlers: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub(crate) fn add(&self, handler: Arc<dyn EventHandler<E>>) -> HandlerId {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((id, handler));
        id
    }

    pub(crate) fn remove(&self, id: HandlerId) -> bool {
        let mut handlers = self.handlers.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        let before = handlers.len();
        handlers.retain(|(existing, _)| *existing != id);
        handlers.len() != before
    }

    /// Replace every registered handler with `handler`
    pub(crate) fn replace(&self, handler: Arc<dyn EventHandler<E>>) -> HandlerId {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        *self.handlers.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = vec![(id, handler)];
        id
    }

    /// Handlers in registration order, as of now
    pub(crate) fn snapshot(&self) -> Vec<Arc<dyn EventHandler<E>>> {
        self.handlers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.handlers.read().unwrap_or_else(|poisoned| poisoned.into_inner()).len()
    }
}

/// Run `handler` on `event` in its own task without waiting for it.
///
/// Errors and panics stay inside the task and are logged against `context`.
pub(crate) fn dispatch<E: Send + 'static>(
    handler: Arc<dyn EventHandler<E>>,
    event: E,
    context: LogContext,
) {
    tokio::spawn(async move {
        let invocation = tokio::spawn(async move { handler.handle(event).await });

        match invocation.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                ErrorLogger::log_error(&WatcherError::Handler(e.to_string()), Some(context));
            }
            Err(join_error) if join_error.is_panic() => {
                ErrorLogger::log_error(
                    &WatcherError::Handler("handler panicked".to_string()),
                    Some(context),
                );
            }
            Err(_) => context.debug("Handler task cancelled"),
        }
    });
}

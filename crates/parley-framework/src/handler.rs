//! Command handlers.
//!
//! A [`CommandHandler`] is either a synchronous function or an asynchronous
//! one. Both shapes receive the shared [`InboundEvent`] and, when the command
//! is owner-bound, the shared instance of the owning type.
//!
//! Whichever the shape, the dispatch engine awaits the handler to completion
//! before reading the event's propagation flag:
//!
//! - async handlers run on a Tokio worker task,
//! - sync handlers run on the blocking thread pool.
//!
//! Running on a separate task means a panic inside a handler is reported as
//! an [`InvocationError::Panicked`] instead of tearing down the dispatch loop.
//!
//! # Example
//!
//! ```rust,ignore
//! use parley_framework::CommandHandler;
//!
//! // Free-standing, synchronous
//! let ping = CommandHandler::from_fn(|event| {
//!     event.stop_propagation();
//!     Ok(())
//! });
//!
//! // Free-standing, asynchronous
//! let echo = CommandHandler::from_async(|event| async move {
//!     event.reply(event.text()).await?;
//!     Ok(())
//! });
//!
//! // Bound to a shared `Counter` instance
//! let count = CommandHandler::method(|counter: &Counter, _event| {
//!     counter.bump();
//!     Ok(())
//! });
//! ```

use std::any::{Any, type_name};
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::task::JoinError;

use crate::error::{InstanceError, InvocationError};
use parley_core::InboundEvent;

/// The shared instance of an owner type, type-erased.
pub type Instance = Arc<dyn Any + Send + Sync>;

/// What every handler returns.
pub type HandlerResult = anyhow::Result<()>;

type SyncFn = dyn Fn(Option<Instance>, Arc<InboundEvent>) -> HandlerResult + Send + Sync;

type AsyncFn =
    dyn Fn(Option<Instance>, Arc<InboundEvent>) -> BoxFuture<'static, HandlerResult> + Send + Sync;

/// A registered command's logic, in one of two shapes.
#[derive(Clone)]
pub enum CommandHandler {
    /// Runs to completion on the calling thread's blocking pool.
    Sync(Arc<SyncFn>),
    /// Returns a future that is awaited on a worker task.
    Async(Arc<AsyncFn>),
}

impl CommandHandler {
    /// Wraps a free-standing synchronous function.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&InboundEvent) -> HandlerResult + Send + Sync + 'static,
    {
        Self::Sync(Arc::new(
            move |_: Option<Instance>, event: Arc<InboundEvent>| f(&*event),
        ))
    }

    /// Wraps a free-standing asynchronous function.
    pub fn from_async<F, Fut>(f: F) -> Self
    where
        F: Fn(Arc<InboundEvent>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        Self::Async(Arc::new(
            move |_: Option<Instance>, event: Arc<InboundEvent>| f(event).boxed(),
        ))
    }

    /// Wraps a synchronous function bound to the shared instance of `T`.
    pub fn method<T, F>(f: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&T, &InboundEvent) -> HandlerResult + Send + Sync + 'static,
    {
        Self::Sync(Arc::new(
            move |instance: Option<Instance>, event: Arc<InboundEvent>| -> HandlerResult {
                let this = downcast_instance::<T>(instance)?;
                f(&*this, &*event)
            },
        ))
    }

    /// Wraps an asynchronous function bound to the shared instance of `T`.
    pub fn async_method<T, F, Fut>(f: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(Arc<T>, Arc<InboundEvent>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let f = Arc::new(f);
        Self::Async(Arc::new(move |instance: Option<Instance>, event: Arc<InboundEvent>| {
            let f = Arc::clone(&f);
            async move {
                let this = downcast_instance::<T>(instance)?;
                f(this, event).await
            }
            .boxed()
        }))
    }

    /// Returns `true` for the asynchronous shape.
    pub fn is_async(&self) -> bool {
        matches!(self, Self::Async(_))
    }

    /// Runs the handler to completion.
    pub(crate) async fn invoke(
        &self,
        instance: Option<Instance>,
        event: Arc<InboundEvent>,
    ) -> Result<(), InvocationError> {
        let joined = match self {
            Self::Sync(f) => {
                let f = Arc::clone(f);
                tokio::task::spawn_blocking(move || f(instance, event)).await
            }
            Self::Async(f) => {
                let f = Arc::clone(f);
                tokio::spawn(async move { f(instance, event).await }).await
            }
        };

        match joined {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(InvocationError::Failed(e)),
            Err(e) => Err(join_failure(e)),
        }
    }
}

impl std::fmt::Debug for CommandHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sync(_) => f.write_str("CommandHandler::Sync"),
            Self::Async(_) => f.write_str("CommandHandler::Async"),
        }
    }
}

fn downcast_instance<T: Send + Sync + 'static>(
    instance: Option<Instance>,
) -> Result<Arc<T>, InstanceError> {
    instance
        .and_then(|i| i.downcast::<T>().ok())
        .ok_or(InstanceError::Mismatch {
            expected: type_name::<T>(),
        })
}

fn join_failure(err: JoinError) -> InvocationError {
    if err.is_panic() {
        let payload = err.into_panic();
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        InvocationError::Panicked(message)
    } else {
        InvocationError::Cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parley_core::{ApiResult, Bot, ConnectionId, PrivateMessage};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct NullBot;

    #[async_trait]
    impl Bot for NullBot {
        fn id(&self) -> &str {
            "null"
        }

        async fn send(&self, _event: &InboundEvent, _message: &str) -> ApiResult<String> {
            Ok(String::new())
        }
    }

    fn event() -> Arc<InboundEvent> {
        Arc::new(InboundEvent::private(
            PrivateMessage {
                connection: ConnectionId::new("c"),
                user_id: 1,
                text: "x".into(),
            },
            Arc::new(NullBot),
        ))
    }

    #[derive(Default)]
    struct Counter(AtomicUsize);

    #[tokio::test]
    async fn test_sync_handler_runs() {
        let handler = CommandHandler::from_fn(|event| {
            event.stop_propagation();
            Ok(())
        });
        let ev = event();
        assert!(!handler.is_async());
        handler.invoke(None, Arc::clone(&ev)).await.unwrap();
        assert!(!ev.is_propagating());
    }

    #[tokio::test]
    async fn test_async_handler_error_is_reported() {
        let handler = CommandHandler::from_async(|_| async { Err::<(), _>(anyhow::anyhow!("boom")) });
        let err = handler.invoke(None, event()).await.unwrap_err();
        assert!(matches!(err, InvocationError::Failed(e) if e.to_string() == "boom"));
    }

    #[tokio::test]
    async fn test_panic_is_isolated() {
        let handler = CommandHandler::from_fn(|_| panic!("kaboom"));
        let err = handler.invoke(None, event()).await.unwrap_err();
        assert!(matches!(err, InvocationError::Panicked(m) if m == "kaboom"));
    }

    #[tokio::test]
    async fn test_method_receives_instance() {
        let counter: Instance = Arc::new(Counter::default());
        let handler = CommandHandler::method(|c: &Counter, _| {
            c.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        handler.invoke(Some(Arc::clone(&counter)), event()).await.unwrap();

        let counter = counter.downcast::<Counter>().unwrap();
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_async_method_without_instance_fails() {
        let handler = CommandHandler::async_method(|_: Arc<Counter>, _| async { Ok::<_, anyhow::Error>(()) });
        let err = handler.invoke(None, event()).await.unwrap_err();
        assert!(matches!(err, InvocationError::Failed(e) if e.to_string().contains("Counter")));
    }
}

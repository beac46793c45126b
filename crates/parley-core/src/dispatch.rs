//! The dispatcher seam between the runtime and the command engine.

use std::sync::Arc;

use async_trait::async_trait;

use crate::event::InboundEvent;

/// Event dispatcher: receives normalized messages and routes them.
///
/// Implemented by the dispatch engine. Adapters that only route events can
/// hold an `Arc<dyn Dispatcher>`.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Routes `event` and returns whether the caller should continue its own
    /// generic event pipeline for it.
    async fn dispatch(&self, event: Arc<InboundEvent>) -> bool;
}

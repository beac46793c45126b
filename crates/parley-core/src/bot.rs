//! Bot trait and related types.
//!
//! A [`Bot`] is the outbound half of one peer connection. Parley only needs
//! a single capability from it: sending text back to the conversation an
//! event came from.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ApiResult;
use crate::event::InboundEvent;

/// The reply capability attached to every [`InboundEvent`].
///
/// Concrete implementations live in protocol adapters; they extract the
/// session (user id, group id) from the event and issue the protocol call.
#[async_trait]
pub trait Bot: Send + Sync + 'static {
    /// Returns the bot's unique identifier.
    fn id(&self) -> &str;

    /// Sends a text message in response to an event.
    ///
    /// # Returns
    ///
    /// The message ID if successful.
    async fn send(&self, event: &InboundEvent, message: &str) -> ApiResult<String>;

    /// Called when the transport connection is lost.
    ///
    /// The default implementation does nothing.
    async fn on_disconnect(&self) {}
}

/// A boxed Bot trait object.
pub type BoxedBot = Arc<dyn Bot>;

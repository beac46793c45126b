//! Error types shared across the Parley crates.
//!
//! Engine-level errors (pattern compilation, registration, waits) live in
//! `parley-framework`.

use thiserror::Error;

// =============================================================================
// API Errors
// =============================================================================

/// Error type for replies sent through a [`Bot`](crate::Bot).
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// The connection the event arrived on is gone.
    #[error("bot is not connected")]
    NotConnected,
    /// The transport failed to deliver the message.
    #[error("{0}")]
    Other(String),
}

// =============================================================================
// Event Errors
// =============================================================================

/// Errors raised while turning a normalized record into an [`InboundEvent`].
///
/// [`InboundEvent`]: crate::InboundEvent
#[derive(Debug, Clone, Error)]
pub enum EventError {
    /// The record is neither a group nor a private message.
    #[error("unsupported message type '{0}'")]
    UnsupportedMessageType(String),

    /// A group message arrived without a group id.
    #[error("group message from user {user_id} has no group id")]
    MissingGroupId {
        /// Sender of the malformed record.
        user_id: i64,
    },

    /// An unknown member role string.
    #[error("unknown member role '{0}'")]
    UnknownRole(String),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for API calls.
pub type ApiResult<T> = Result<T, ApiError>;

/// Result type for event conversion.
pub type EventResult<T> = Result<T, EventError>;

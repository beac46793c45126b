//! # Parley Core
//!
//! The foundation types shared by every Parley crate.
//!
//! This crate provides:
//! - **Event model**: the normalized inbound message ([`InboundEvent`]), a
//!   tagged union over group and private messages ([`MessageKind`]), and the
//!   identity types used to correlate follow-up messages ([`ConnectionId`],
//!   [`MessageSource`]).
//! - **Reply capability**: the [`Bot`] trait every connection implements so
//!   that handlers (and the dispatch engine's failure notices) can answer the
//!   originating conversation.
//! - **Dispatcher seam**: the [`Dispatcher`] trait the runtime drives.
//!
//! ## Data flow
//!
//! ```text
//! ┌─────────────┐     ┌──────────────┐     ┌────────────────┐
//! │   Adapter   │────▶│ InboundEvent │────▶│   Dispatcher   │
//! │ (transport) │     │  + BoxedBot  │     │ (continuations │
//! └─────────────┘     └──────────────┘     │   + commands)  │
//!        ▲                                 └───────┬────────┘
//!        └──────────── Bot::send ◀─────────────────┘
//! ```

pub mod bot;
pub mod dispatch;
pub mod error;
pub mod event;

pub use bot::{Bot, BoxedBot};
pub use dispatch::Dispatcher;
pub use error::{ApiError, ApiResult, EventError, EventResult};
pub use event::{
    ConnectionId, GroupMessage, InboundEvent, MemberRole, MessageKind, MessageSource,
    NormalizedMessage, PrivateMessage, Scope,
};

/// Prelude for common imports.
pub mod prelude {
    pub use super::bot::{Bot, BoxedBot};
    pub use super::dispatch::Dispatcher;
    pub use super::event::*;
}

//! # Parley
//!
//! Command dispatch and conversation continuation for chat bots.
//!
//! ## Overview
//!
//! Parley routes normalized chat messages to registered command handlers and
//! lets a running handler pause until the same sender says something else.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌───────────────┐     ┌────────────────────────────────┐
//! │   Adapter   │────▶│ ParleyRuntime │────▶│ DispatchEngine                 │
//! │ (your code) │     │               │     │  1. resume waiting handlers    │
//! └─────────────┘     │               │     │  2. match commands by priority │
//!                     │               │◀────│  3. pass-through flag          │
//!                     │   fallback    │     └────────────────────────────────┘
//!                     │   listeners   │
//!                     └───────────────┘
//! ```
//!
//! - **Runtime**: configuration, logging, connections and the fallback pipeline
//! - **Engine**: registry, handler instance cache and continuation table
//! - **Commands**: declared with [`CommandSpec`](framework::CommandSpec) and
//!   collected in [`COMMAND_CATALOG`](framework::COMMAND_CATALOG)
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use parley::prelude::*;
//!
//! #[distributed_slice(COMMAND_CATALOG)]
//! #[linkme(crate = parley::framework::linkme)]
//! fn ping() -> CatalogEntry {
//!     CatalogEntry::free(
//!         CommandSpec::group("ping", ["/ping"]).description("replies pong"),
//!         CommandHandler::from_async(|event: Arc<InboundEvent>| async move {
//!             event.reply("pong").await?;
//!             event.stop_propagation();
//!             Ok(())
//!         }),
//!     )
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = Arc::new(ParleyRuntime::builder().build()?);
//!     runtime.register_linked_catalog();
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config`: `parley.toml` configuration files (default)
//! - `yaml-config`: `parley.yaml` configuration files
//! - `json-log`: JSON log lines

pub use parley_core as core;
pub use parley_framework as framework;
pub use parley_runtime as runtime;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use parley::prelude::*;
/// ```
pub mod prelude {
    // Runtime - main entry point
    pub use parley_runtime::{ParleyConfig, ParleyRuntime, RuntimeBuilder};

    // Event model and reply capability
    pub use parley_core::{
        Bot, BoxedBot, ConnectionId, GroupMessage, InboundEvent, MemberRole, MessageKind,
        NormalizedMessage, PrivateMessage, Scope,
    };

    // Declaring and registering commands
    pub use parley_framework::linkme::distributed_slice;
    pub use parley_framework::{
        COMMAND_CATALOG, CatalogEntry, CommandGroup, CommandHandler, CommandSpec, DispatchEngine,
        HandlerResult, MatchFlags, MatchMode,
    };

    // Waiting for follow-up messages
    pub use parley_framework::{ContinuationTable, PendingContinuation, WaitError};

    pub use std::sync::Arc;
}

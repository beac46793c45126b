//! # Parley Framework
//!
//! The command dispatch and conversation-continuation engine.
//!
//! This layer provides:
//! - Pattern compilation for the three match modes ([`MatchMode`])
//! - A scope-separated, priority-ordered [`CommandRegistry`]
//! - A lazily populated [`HandlerInstanceCache`] for owner-bound handlers
//! - The [`ContinuationTable`] that lets a handler wait for a correlated
//!   follow-up message
//! - The [`DispatchEngine`], the per-event entry point tying them together
//! - A [`RegistrationScanner`] that bulk-registers a [`CommandCatalog`]
//!
//! # Dispatch order
//!
//! ```text
//! event ──▶ ContinuationTable::resolve ──(≥1 resumed)──▶ false
//!                 │
//!                 ▼ (none)
//!          CommandRegistry::match_candidates ──(empty)──▶ true
//!                 │
//!                 ▼
//!          for candidate in priority order:
//!              role check ─▶ instance ─▶ invoke ─▶ Ok: event.is_propagating()
//!                                               └▶ Err: log, notify, next
//! ```

pub mod catalog;
pub mod continuation;
pub mod descriptor;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod instance;
pub mod pattern;
pub mod registry;
pub mod scanner;

pub use catalog::{COMMAND_CATALOG, CatalogEntry, CommandCatalog, LinkedCatalog};
pub use continuation::{ContinuationRequest, ContinuationTable, PendingContinuation};
pub use descriptor::{CommandDescriptor, CommandSpec};
pub use dispatcher::{DispatchEngine, EngineOptions};
pub use error::{
    InstanceError, InstanceResult, InvocationError, PatternError, PatternResult,
    RegistrationError, RegistrationResult, WaitError, WaitResult,
};
pub use handler::{CommandHandler, HandlerResult, Instance};
pub use instance::{CommandGroup, HandlerInstanceCache, OwnerType};
pub use pattern::{MatchFlags, MatchMode, PatternSet};
pub use registry::{CommandRegistry, RegisterOutcome};
pub use scanner::{RegistrationScanner, ScanReport};

// Re-exported so `#[distributed_slice(COMMAND_CATALOG)]` works at call sites.
#[doc(hidden)]
pub use linkme;

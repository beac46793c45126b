//! Parley Runtime - Orchestration layer for the Parley command engine.
//!
//! This crate provides:
//! - Configuration loading (`ConfigLoader`, `ParleyConfig`)
//! - Logging setup (`LoggingBuilder`, `init_from_config`)
//! - Connection management (`ConnectionRegistry`)
//! - Runtime orchestration (`ParleyRuntime`) with a fallback pipeline for
//!   events no command consumed
//!
//! ```ignore
//! use parley_runtime::ParleyRuntime;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = Arc::new(ParleyRuntime::builder().build()?);
//!     runtime.register_linked_catalog();
//!
//!     runtime
//!         .on_unhandled(|event| async move {
//!             tracing::debug!(text = event.text(), "No command consumed the event");
//!         })
//!         .await;
//!
//!     // Adapters attach bots and feed events through `runtime.spawn_handle`.
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod registry;
pub mod runtime;

// Re-exports
pub use config::{
    CommandConfig, ConfigError, ConfigLoader, ConfigResult, LoggingConfig, ParleyConfig,
};
pub use error::{LoggingError, RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};
pub use registry::{ConnectionRegistry, RuntimeStats};
pub use runtime::{FallbackListener, ParleyRuntime, RuntimeBuilder};

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;

/// Prelude module for convenient imports.
///
/// This provides all the commonly used logging macros:
/// - `trace!`, `debug!`, `info!`, `warn!`, `error!`
/// - `span`, `event`
/// - `instrument` attribute
/// - `Level` for span creation
pub mod prelude {
    pub use tracing::{Level, debug, error, event, info, instrument, span, trace, warn};
}

//! Configuration for the Parley runtime.
//!
//! Configuration is layered with figment (defaults, files, `PARLEY_*`
//! environment variables, programmatic overrides) and checked by
//! [`validate_config`] before the runtime uses it.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    CommandConfig, LogFormat, LogLevel, LogOutput, LogRotation, LoggingConfig, ParleyConfig,
    SpanEventConfig,
};
pub use validation::validate_config;

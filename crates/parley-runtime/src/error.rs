//! Runtime error types.

use thiserror::Error;

use crate::config::ConfigError;

/// Errors that can occur during runtime operations.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Configuration could not be loaded or failed validation.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Logging could not be initialized.
    #[error("Logging error: {0}")]
    Logging(#[from] LoggingError),

    /// A connection with this id is already attached.
    #[error("Connection already attached: {0}")]
    ConnectionExists(String),

    /// No connection with this id is attached.
    #[error("Connection not found: {0}")]
    ConnectionNotFound(String),
}

/// Errors raised while installing the global subscriber.
#[derive(Error, Debug)]
pub enum LoggingError {
    /// A global subscriber is already installed.
    #[error("failed to install subscriber: {0}")]
    Init(#[from] tracing_subscriber::util::TryInitError),

    /// The log file appender could not be created.
    #[error("failed to create log file appender: {0}")]
    Appender(#[from] tracing_appender::rolling::InitError),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;

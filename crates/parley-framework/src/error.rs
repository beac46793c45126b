//! Error types for the Parley framework.
//!
//! None of these are fatal to the engine: registration errors skip one
//! declaration, invocation errors skip one candidate, wait errors end one
//! conversation.

use thiserror::Error;

/// Errors raised while compiling a raw pattern list.
#[derive(Debug, Clone, Error)]
pub enum PatternError {
    /// The raw pattern list was empty.
    #[error("pattern list is empty")]
    Empty,

    /// The match mode string is not one of `full`, `regex`, `keyword`.
    #[error("unknown match mode '{0}'")]
    UnknownMode(String),

    /// A pattern is not a valid regular expression once expanded.
    #[error("invalid pattern '{pattern}': {source}")]
    Invalid {
        /// The expanded pattern that failed to compile.
        pattern: String,
        /// Underlying regex error.
        #[source]
        source: regex::Error,
    },
}

/// Errors raised by the handler instance cache.
#[derive(Debug, Clone, Error)]
pub enum InstanceError {
    /// The owner type's factory returned an error.
    #[error("cannot create instance of '{owner}': {reason}")]
    Construction {
        /// Owner type name.
        owner: &'static str,
        /// Rendered factory error.
        reason: String,
    },

    /// The owner type's factory panicked.
    #[error("constructor of '{owner}' panicked")]
    Panicked {
        /// Owner type name.
        owner: &'static str,
    },

    /// A bound handler received no instance or one of the wrong type.
    #[error("handler expected an instance of '{expected}'")]
    Mismatch {
        /// Type the handler is bound to.
        expected: &'static str,
    },
}

/// Errors raised while registering a single command declaration.
#[derive(Debug, Clone, Error)]
pub enum RegistrationError {
    /// The command's patterns did not compile.
    #[error("command '{command}' has unusable patterns: {source}")]
    Pattern {
        /// Command name.
        command: String,
        /// Compilation error.
        #[source]
        source: PatternError,
    },

    /// The command's owner type could not be constructed.
    #[error("command '{command}' has no usable owner instance: {source}")]
    Instance {
        /// Command name.
        command: String,
        /// Construction error.
        #[source]
        source: InstanceError,
    },
}

/// Errors raised by a single handler invocation.
#[derive(Debug, Error)]
pub enum InvocationError {
    /// The handler returned an error.
    #[error("{0:#}")]
    Failed(anyhow::Error),

    /// The handler panicked.
    #[error("handler panicked: {0}")]
    Panicked(String),

    /// The task running the handler was cancelled.
    #[error("handler task was cancelled")]
    Cancelled,
}

/// Errors returned to a caller waiting on a continuation.
#[derive(Debug, Clone, Error)]
pub enum WaitError {
    /// No correlated message arrived in time.
    #[error("timed out waiting for a follow-up message")]
    Timeout,

    /// The wait was closed (connection dropped or engine shut down).
    #[error("continuation closed before a follow-up message arrived")]
    Closed,

    /// A blocking wait was attempted outside a Tokio runtime.
    #[error("blocking wait requires a Tokio runtime")]
    NoRuntime,

    /// The follow-up patterns did not compile.
    #[error(transparent)]
    Pattern(#[from] PatternError),
}

/// Result type for pattern compilation.
pub type PatternResult<T> = Result<T, PatternError>;

/// Result type for instance cache operations.
pub type InstanceResult<T> = Result<T, InstanceError>;

/// Result type for registration.
pub type RegistrationResult<T> = Result<T, RegistrationError>;

/// Result type for continuation waits.
pub type WaitResult<T> = Result<T, WaitError>;

//! Configuration schema definitions.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use parley_framework::EngineOptions;
use serde::{Deserialize, Serialize};

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParleyConfig {
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Command engine settings.
    #[serde(default)]
    pub commands: CommandConfig,
}

// =============================================================================
// Commands
// =============================================================================

/// Command engine settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandConfig {
    /// When disabled, no commands are registered and every event passes
    /// through to the fallback pipeline.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Reply to the sender when a described command fails.
    #[serde(default = "default_true")]
    pub failure_notice: bool,

    /// First line of the failure notice.
    #[serde(default = "default_failure_notice_prefix")]
    pub failure_notice_prefix: String,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_notice: true,
            failure_notice_prefix: default_failure_notice_prefix(),
        }
    }
}

impl CommandConfig {
    /// Converts to the dispatch engine's options.
    pub fn to_engine_options(&self) -> EngineOptions {
        EngineOptions {
            enabled: self.enabled,
            failure_notice: self.failure_notice,
            failure_notice_prefix: self.failure_notice_prefix.clone(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_failure_notice_prefix() -> String {
    EngineOptions::default().failure_notice_prefix
}

// =============================================================================
// Logging
// =============================================================================

/// Log verbosity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Returns the lowercase level name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    /// Converts to a `tracing` level.
    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log line format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    /// Requires the `json-log` feature; falls back to `full` without it.
    Json,
}

/// Where log lines go.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    File,
}

/// How often the log file rolls over.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    #[default]
    Never,
    Minutely,
    Hourly,
    Daily,
}

/// Which span lifecycle events are logged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanEventConfig {
    #[serde(default)]
    pub new: bool,
    #[serde(default)]
    pub enter: bool,
    #[serde(default)]
    pub exit: bool,
    #[serde(default)]
    pub close: bool,
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Base level for every target.
    #[serde(default)]
    pub level: LogLevel,

    /// Line format.
    #[serde(default)]
    pub format: LogFormat,

    /// Destination.
    #[serde(default)]
    pub output: LogOutput,

    /// Span lifecycle events, e.g. `close` to time each dispatch.
    #[serde(default)]
    pub span_events: SpanEventConfig,

    /// Include thread ids.
    #[serde(default)]
    pub thread_ids: bool,

    /// Include file and line of the call site.
    #[serde(default)]
    pub file_location: bool,

    /// Log file path, for `output = "file"`.
    #[serde(default)]
    pub file_path: Option<PathBuf>,

    /// File rollover period.
    #[serde(default)]
    pub rotation: LogRotation,

    /// Number of rolled files to keep.
    #[serde(default = "default_max_files")]
    pub max_files: u32,

    /// Per-target levels, e.g. `parley_framework = "debug"`.
    #[serde(default)]
    pub filters: HashMap<String, LogLevel>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::default(),
            format: LogFormat::default(),
            output: LogOutput::default(),
            span_events: SpanEventConfig::default(),
            thread_ids: false,
            file_location: false,
            file_path: None,
            rotation: LogRotation::default(),
            max_files: default_max_files(),
            filters: HashMap::new(),
        }
    }
}

fn default_max_files() -> u32 {
    5
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ParleyConfig::default();
        assert_eq!(config.logging.level, LogLevel::Info);
        assert_eq!(config.logging.format, LogFormat::Compact);
        assert!(config.commands.enabled);
        assert!(config.commands.failure_notice);
        assert_eq!(config.commands.failure_notice_prefix, "command execution failed");
    }

    #[test]
    fn test_engine_options_follow_config() {
        let commands = CommandConfig {
            enabled: false,
            failure_notice: false,
            failure_notice_prefix: "oops".into(),
        };
        let options = commands.to_engine_options();
        assert!(!options.enabled);
        assert!(!options.failure_notice);
        assert_eq!(options.failure_notice_prefix, "oops");
    }

    #[test]
    fn test_level_conversion() {
        assert_eq!(LogLevel::Warn.to_tracing_level(), tracing::Level::WARN);
        assert_eq!(LogLevel::Trace.to_string(), "trace");
    }
}

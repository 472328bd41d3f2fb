//! Configuration schema definitions.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use figment::value::Value;
use serde::{Deserialize, Serialize};

/// Root configuration structure.
///
/// ```toml
/// [logging]
/// level = "debug"
///
/// [manager]
/// adapter_queue_capacity = 128
///
/// [adapters.loopback]
/// echo = true
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FerryConfig {
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Transport manager settings.
    #[serde(default)]
    pub manager: ManagerConfig,

    /// Per-adapter settings, keyed by `ConfigurableAdapter::name()`.
    #[serde(default)]
    pub adapters: BTreeMap<String, Value>,
}

// =============================================================================
// Manager
// =============================================================================

/// Transport manager settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Capacity of each adapter's event queue. A full queue blocks the
    /// reporting adapter, never the dispatch context.
    #[serde(default = "default_adapter_queue_capacity")]
    pub adapter_queue_capacity: usize,

    /// Capacity of the request queue shared by all callers.
    #[serde(default = "default_command_queue_capacity")]
    pub command_queue_capacity: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            adapter_queue_capacity: default_adapter_queue_capacity(),
            command_queue_capacity: default_command_queue_capacity(),
        }
    }
}

fn default_adapter_queue_capacity() -> usize {
    64
}

fn default_command_queue_capacity() -> usize {
    256
}

// =============================================================================
// Logging
// =============================================================================

/// Log severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
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
    /// Returns the level as a filter directive string.
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
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    /// Requires the `json-log` feature; falls back to `Full` without it.
    Json,
}

/// Log destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    File,
}

/// Log file rotation policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    #[default]
    Never,
    Hourly,
    Daily,
}

/// Which span lifecycle events are logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
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
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct LoggingConfig {
    /// Base level for all targets.
    #[serde(default)]
    pub level: LogLevel,

    #[serde(default)]
    pub format: LogFormat,

    #[serde(default)]
    pub output: LogOutput,

    /// Required when `output = "file"`.
    #[serde(default)]
    pub file_path: Option<PathBuf>,

    #[serde(default)]
    pub rotation: LogRotation,

    /// Include thread ids in log lines.
    #[serde(default)]
    pub thread_ids: bool,

    /// Include source file and line in log lines.
    #[serde(default)]
    pub file_location: bool,

    #[serde(default)]
    pub span_events: SpanEventConfig,

    /// Per-target levels, e.g. `ferry_adapter_tcp = "trace"`.
    #[serde(default)]
    pub filters: BTreeMap<String, LogLevel>,
}

//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber
//! - Define the `LogEntry` value type components report through
//! - Provide sinks: `TracingLog` for production, `MemoryLog` for inspection in tests
//!
//! # Design Decisions
//! - Components never call `tracing` macros for domain events directly; they write a
//!   `LogEntry` to an injected `LogService` so that sender and arguments travel together
//! - Every sink forwards to `tracing`, so the subscriber stays the single output

use std::fmt;
use std::sync::{Arc, Mutex};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter used when neither `RUST_LOG` nor an explicit level is given.
pub const DEFAULT_FILTER: &str = "relay_hub=debug,tower_http=debug";

/// Initialize the global tracing subscriber.
///
/// `level` takes precedence over `RUST_LOG`. Calling this twice is harmless.
pub fn init_tracing(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into()),
    };

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

/// Importance of a warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum WarningLevel {
    Low,
    Normal,
    High,
    Critical,
}

/// Severity of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning(WarningLevel),
    Error,
}

/// An observability event reported by an internal component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub severity: Severity,
    /// Component (and optionally operation) that produced the entry.
    pub sender: String,
    pub text: String,
    pub arguments: Vec<String>,
}

impl LogEntry {
    /// Informational message.
    pub fn message(sender: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            severity: Severity::Info,
            sender: sender.into(),
            text: text.into(),
            arguments: Vec::new(),
        }
    }

    /// Warning with an explicit level.
    pub fn warning(level: WarningLevel, sender: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning(level),
            sender: sender.into(),
            text: text.into(),
            arguments: Vec::new(),
        }
    }

    /// Error carrying the failure's display text.
    pub fn error(error: &dyn std::error::Error, sender: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            sender: sender.into(),
            text: error.to_string(),
            arguments: Vec::new(),
        }
    }

    /// Attach an argument.
    pub fn with_arg(mut self, arg: impl fmt::Display) -> Self {
        self.arguments.push(arg.to_string());
        self
    }

    pub fn is_warning(&self) -> bool {
        matches!(self.severity, Severity::Warning(_))
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.sender.is_empty() {
            write!(f, "{}", self.text)
        } else {
            write!(f, "[{}] {}", self.sender, self.text)
        }
    }
}

/// Sink for `LogEntry` values.
pub trait LogService: Send + Sync {
    fn write(&self, entry: LogEntry);
}

/// Shared handle to a log sink.
pub type SharedLog = Arc<dyn LogService>;

/// Forwards entries to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLog;

impl TracingLog {
    pub fn shared() -> SharedLog {
        Arc::new(Self)
    }
}

impl LogService for TracingLog {
    fn write(&self, entry: LogEntry) {
        emit(&entry);
    }
}

fn emit(entry: &LogEntry) {
    let sender = entry.sender.as_str();
    let args = entry.arguments.join(", ");
    match entry.severity {
        Severity::Info => tracing::info!(sender, args = %args, "{}", entry.text),
        Severity::Warning(level) => {
            tracing::warn!(sender, level = ?level, args = %args, "{}", entry.text)
        }
        Severity::Error => tracing::error!(sender, args = %args, "{}", entry.text),
    }
}

/// Keeps every entry in memory and forwards it to `tracing`.
#[derive(Debug, Default)]
pub struct MemoryLog {
    entries: Mutex<Vec<LogEntry>>,
}

impl MemoryLog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Snapshot of all recorded entries.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn warnings(&self) -> Vec<LogEntry> {
        self.entries().into_iter().filter(LogEntry::is_warning).collect()
    }

    pub fn errors(&self) -> Vec<LogEntry> {
        self.entries().into_iter().filter(LogEntry::is_error).collect()
    }
}

impl LogService for MemoryLog {
    fn write(&self, entry: LogEntry) {
        emit(&entry);
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(entry);
    }
}

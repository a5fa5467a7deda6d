//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Hub / ConfigStore / HostController
//!     → LogEntry written to the injected LogService (logging.rs)
//!     → tracing subscriber (stdout)
//!
//! Hub / HostController
//!     → metrics.rs (counters, gauges)
//!     → Prometheus endpoint (optional)
//! ```

pub mod logging;
pub mod metrics;

pub use logging::{LogEntry, LogService, MemoryLog, Severity, SharedLog, TracingLog, WarningLevel};

//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! ServerSettings.json + RELAY_* environment
//!     → loader.rs (parse each layer, merge)
//!     → validation.rs (per-field rules, defaults substituted)
//!     → AppSetting (validated, immutable)
//!     → store.rs publishes Arc<AppSetting> on a watch channel
//!
//! On file change:
//!     watcher.rs detects change
//!     → debounce.rs collapses the burst
//!     → store.rs reloads and publishes
//!     → HostController reboots the listener
//! ```
//!
//! # Design Decisions
//! - A snapshot is never rejected; invalid fields fall back to defaults with a warning
//! - Subscribers read the latest value; intermediate snapshots may be skipped

pub mod debounce;
pub mod loader;
pub mod schema;
pub mod store;
pub mod validation;
pub mod watcher;

pub use debounce::Debouncer;
pub use loader::ConfigError;
pub use schema::{AppSetting, RawAppSetting, TlsSetting};
pub use store::{ConfigSource, ConfigStore, EnvLayer, DEFAULT_CONFIG_PATH};
pub use validation::Violation;

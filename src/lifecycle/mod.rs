//! Process lifecycle.
//!
//! ```text
//! startup.rs   build store, hub, host  →  watcher + signal tasks  →  host run loop
//! signals.rs   SIGINT / SIGTERM        →  Shutdown::trigger
//!              SIGHUP                  →  ConfigStore::reload_now
//! shutdown.rs  root CancellationToken; the host, watcher and sessions hold children
//! ```

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::Relay;

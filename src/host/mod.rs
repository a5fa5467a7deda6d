//! Network host lifecycle.
//!
//! # Data Flow
//! ```text
//! ConfigStore snapshot (watch channel)
//!     → controller.rs reboot: stop current listeners, drain sessions
//!     → listener.rs binds every configured port (TLS when https)
//!     → axum-server serves http::server router on each port
//! ```

pub mod controller;
pub mod listener;

pub use controller::{HostController, HostError, HostState};

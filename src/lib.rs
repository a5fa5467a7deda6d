//! Real-time message relay library.

pub mod auth;
pub mod config;
pub mod domain;
pub mod host;
pub mod http;
pub mod hub;
pub mod lifecycle;
pub mod observability;
pub mod persistence;

pub use config::schema::AppSetting;
pub use host::HostController;
pub use hub::Hub;
pub use lifecycle::{Relay, Shutdown};

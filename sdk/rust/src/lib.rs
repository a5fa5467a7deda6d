//! Client SDK for the relay hub.
//!
//! - `RelayClient`: login and control API over HTTP
//! - `HubConnection`: a WebSocket hub session

pub mod client;
pub mod hub;

pub use client::RelayClient;
pub use hub::{HubConnection, HubFrame};

/// Error type used throughout the SDK.
pub type SdkError = Box<dyn std::error::Error + Send + Sync>;

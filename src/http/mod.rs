//! HTTP surface of the relay.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection (host::listener)
//!     → server.rs (router, middleware)
//!     → request.rs (x-request-id)
//!     → /api/v1/Auth/login            → auth::handlers
//!     → /api/v1/serverHub/...         → control.rs → Hub
//!     → {RouteHub} (WebSocket)        → hub::session
//!     → response.rs (error → status code)
//! ```

pub mod control;
pub mod request;
pub mod response;
pub mod server;

pub use request::{RequestIdExt, X_REQUEST_ID};
pub use server::{build_router, AppState};

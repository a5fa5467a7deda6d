//! Real-time message hub.
//!
//! # Data Flow
//! ```text
//! WebSocket session (session.rs)
//!     → Hub::connect registers the connection (registry.rs)
//!     → client invocations decoded (protocol.rs)
//!     → Hub routes to all / group / user / caller (router.rs)
//!     → per-session outbound queue → socket
//! ```

pub mod protocol;
pub mod registry;
pub mod router;
pub mod session;

pub use protocol::{ClientFrame, Invocation, ServerFrame};
pub use registry::{ConnectionRegistry, RegistryError, ANONYMOUS, PUBLIC_GROUP};
pub use router::{ConnectionState, Hub, HubError, DEFAULT_GROUP, NOTIFY, RECEIVE, RECEIVE_MESSAGE};
pub use session::SEND_TIMEOUT;

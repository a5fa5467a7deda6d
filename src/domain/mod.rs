//! Domain value types.

pub mod messages;

pub use messages::{Alarm, Message, Notification};

//! JSON frames exchanged over a hub session.
//!
//! Every frame is a text message tagged by `type`:
//! ```text
//! client → server   invocation | ping
//! server → client   handshake | invocation | completion | pong | close
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A hub method call from a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invocation {
    /// Present when the client wants a completion frame back.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invocation_id: Option<String>,
    pub target: String,
    #[serde(default)]
    pub arguments: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Invocation(Invocation),
    Ping,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// First frame of every session.
    Handshake { connection_id: String },
    /// A client-side method to run.
    Invocation { target: String, arguments: Vec<Value> },
    Completion {
        invocation_id: String,
        #[serde(default)]
        error: Option<String>,
    },
    Pong,
    Close {
        #[serde(default)]
        error: Option<String>,
    },
}

impl ServerFrame {
    pub fn invocation(target: &str, arguments: Vec<Value>) -> Self {
        ServerFrame::Invocation {
            target: target.to_string(),
            arguments,
        }
    }

    pub fn completion(invocation_id: String, error: Option<String>) -> Self {
        ServerFrame::Completion {
            invocation_id,
            error,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl ClientFrame {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

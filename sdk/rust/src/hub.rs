//! WebSocket hub session.

use std::collections::VecDeque;

use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use crate::SdkError;

/// A frame sent by the hub.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HubFrame {
    Handshake {
        connection_id: String,
    },
    Invocation {
        target: String,
        arguments: Vec<Value>,
    },
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

pub struct HubConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    connection_id: String,
    next_invocation: u64,
    buffered: VecDeque<HubFrame>,
}

impl HubConnection {
    /// Connect to `hub_url` (e.g. `ws://localhost:8080/hub`) and wait for the handshake.
    pub async fn connect(hub_url: &str, token: &str) -> Result<Self, SdkError> {
        let separator = if hub_url.contains('?') { '&' } else { '?' };
        let url = format!("{}{}access_token={}", hub_url, separator, token);
        let (stream, _) = connect_async(url.as_str()).await?;

        let mut connection = Self {
            stream,
            connection_id: String::new(),
            next_invocation: 1,
            buffered: VecDeque::new(),
        };
        match connection.read_frame().await? {
            Some(HubFrame::Handshake { connection_id }) => {
                connection.connection_id = connection_id;
                Ok(connection)
            }
            other => Err(format!("expected handshake, got {:?}", other).into()),
        }
    }

    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    /// Call a hub method and wait for its completion. Returns the hub's error, if any.
    pub async fn invoke(&mut self, target: &str, arguments: Vec<Value>) -> Result<Option<String>, SdkError> {
        let invocation_id = self.next_invocation.to_string();
        self.next_invocation += 1;
        self.write(json!({
            "type": "invocation",
            "invocation_id": invocation_id,
            "target": target,
            "arguments": arguments,
        }))
        .await?;

        loop {
            match self.read_frame().await? {
                Some(HubFrame::Completion {
                    invocation_id: id,
                    error,
                }) if id == invocation_id => return Ok(error),
                Some(frame) => self.buffered.push_back(frame),
                None => return Err("connection closed before completion".into()),
            }
        }
    }

    /// Call a hub method without waiting for a completion.
    pub async fn send(&mut self, target: &str, arguments: Vec<Value>) -> Result<(), SdkError> {
        self.write(json!({ "type": "invocation", "target": target, "arguments": arguments }))
            .await
    }

    pub async fn ping(&mut self) -> Result<(), SdkError> {
        self.write(json!({ "type": "ping" })).await
    }

    /// Next frame from the hub, `None` once the connection is closed.
    pub async fn next_frame(&mut self) -> Result<Option<HubFrame>, SdkError> {
        if let Some(frame) = self.buffered.pop_front() {
            return Ok(Some(frame));
        }
        self.read_frame().await
    }

    /// Next client-side invocation with the given target, skipping other frames.
    pub async fn next_invocation(&mut self, target: &str) -> Result<Option<Vec<Value>>, SdkError> {
        loop {
            match self.next_frame().await? {
                Some(HubFrame::Invocation {
                    target: t,
                    arguments,
                }) if t == target => return Ok(Some(arguments)),
                Some(_) => continue,
                None => return Ok(None),
            }
        }
    }

    pub async fn close(mut self) -> Result<(), SdkError> {
        self.stream.close(None).await?;
        Ok(())
    }

    async fn write(&mut self, frame: Value) -> Result<(), SdkError> {
        self.stream.send(Message::Text(frame.to_string().into())).await?;
        Ok(())
    }

    async fn read_frame(&mut self) -> Result<Option<HubFrame>, SdkError> {
        while let Some(message) = self.stream.next().await {
            match message? {
                Message::Text(text) => return Ok(Some(serde_json::from_str(text.as_str())?)),
                Message::Close(_) => return Ok(None),
                _ => continue,
            }
        }
        Ok(None)
    }
}

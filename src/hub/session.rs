//! WebSocket session loop.
//!
//! # Data Flow
//! ```text
//! handshake request (token verified by auth middleware)
//!     → upgrade → Hub::connect → handshake frame
//!     → loop: outbound queue → socket | socket → Hub::invoke → queued frames, then completion
//!     → Hub::disconnect (with the failure as reason when abnormal)
//! ```

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Extension, State,
    },
    response::Response,
};
use futures_util::{
    stream::{SplitSink, StreamExt},
    SinkExt,
};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::auth::Claims;
use crate::hub::protocol::{ClientFrame, ServerFrame};
use crate::hub::router::Hub;
use crate::observability::{LogEntry, WarningLevel};

const SENDER: &str = "Hub.Session";

/// Upper bound for writing one frame to the socket.
pub const SEND_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Error)]
enum SessionError {
    #[error("transport error: {0}")]
    Transport(#[from] axum::Error),

    #[error("send timed out after {0:?}")]
    SendTimeout(Duration),

    #[error("failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Hub endpoint: upgrade the request and run a session for the authenticated user.
pub async fn hub_endpoint(
    ws: WebSocketUpgrade,
    State(hub): State<Arc<Hub>>,
    State(shutdown): State<CancellationToken>,
    Extension(claims): Extension<Claims>,
) -> Response {
    ws.on_upgrade(move |socket| run_session(socket, hub, claims.name, shutdown))
}

/// Drive one session until the client leaves, the transport fails or `shutdown` fires.
pub async fn run_session(socket: WebSocket, hub: Arc<Hub>, user: String, shutdown: CancellationToken) {
    let (connection_id, mut outbound) = hub.connect(Some(user.as_str()));
    let (mut sink, mut stream) = socket.split();

    let result: Result<(), SessionError> = async {
        send_frame(
            &mut sink,
            &ServerFrame::Handshake {
                connection_id: connection_id.clone(),
            },
        )
        .await?;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    let _ = send_frame(&mut sink, &ServerFrame::Close { error: None }).await;
                    let _ = sink.send(Message::Close(None)).await;
                    return Ok(());
                }
                frame = outbound.recv() => match frame {
                    Some(frame) => send_frame(&mut sink, &frame).await?,
                    // Evicted by the hub.
                    None => return Ok(()),
                },
                incoming = stream.next() => match incoming {
                    Some(Ok(Message::Text(text))) => {
                        for frame in respond(&hub, &connection_id, text.as_str(), &mut outbound) {
                            send_frame(&mut sink, &frame).await?;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => return Ok(()),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e.into()),
                },
            }
        }
    }
    .await;

    // An abnormal end is logged by the hub with the reason.
    let reason = result.err().map(|e| e.to_string());
    hub.disconnect(&connection_id, reason.as_deref());
}

/// Frames to write for one inbound text frame.
///
/// Frames the call queued for this session come first, so a caller sees
/// what its invocation produced before the completion.
fn respond(
    hub: &Hub,
    caller: &str,
    text: &str,
    outbound: &mut mpsc::Receiver<ServerFrame>,
) -> Vec<ServerFrame> {
    let reply = handle_text(hub, caller, text);
    let mut frames = Vec::new();
    if reply.is_some() {
        while let Ok(frame) = outbound.try_recv() {
            frames.push(frame);
        }
    }
    frames.extend(reply);
    frames
}

fn handle_text(hub: &Hub, caller: &str, text: &str) -> Option<ServerFrame> {
    match ClientFrame::parse(text) {
        Ok(ClientFrame::Ping) => Some(ServerFrame::Pong),
        Ok(ClientFrame::Invocation(invocation)) => {
            let result = hub.invoke(caller, &invocation);
            invocation
                .invocation_id
                .map(|id| ServerFrame::completion(id, result.err().map(|e| e.to_string())))
        }
        Err(e) => {
            hub.log().write(
                LogEntry::warning(WarningLevel::Low, SENDER, format!("Ignoring malformed frame: {}", e))
                    .with_arg(caller),
            );
            None
        }
    }
}

async fn send_frame(
    sink: &mut SplitSink<WebSocket, Message>,
    frame: &ServerFrame,
) -> Result<(), SessionError> {
    let text = frame.to_json()?;
    match tokio::time::timeout(SEND_TIMEOUT, sink.send(Message::Text(text.into()))).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(SessionError::SendTimeout(SEND_TIMEOUT)),
    }
}

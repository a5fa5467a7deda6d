//! Session table and message routing.
//!
//! # Responsibilities
//! - Register sessions on connect and revoke them on disconnect
//! - Fan messages out to all connections, a group, a user or the caller
//! - Dispatch client invocations to the matching operation
//! - Log every routing failure with the operation that produced it
//!
//! # Design Decisions
//! - Each session owns a bounded outbound queue; routing only does `try_send`, so a
//!   slow client never blocks a broadcast and a full queue fails that one delivery
//! - Delivery is at-most-once; nothing is retried
//! - Lifecycle messages go to the default group

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::hub::protocol::{Invocation, ServerFrame};
use crate::hub::registry::{ConnectionRegistry, RegistryError};
use crate::observability::{metrics, LogEntry, SharedLog, WarningLevel};

/// Group every session joins on connect.
pub const DEFAULT_GROUP: &str = "Private Group";

/// Outbound frames buffered per session.
pub const OUTBOUND_CAPACITY: usize = 1024;

/// Client target for hub traffic.
pub const RECEIVE_MESSAGE: &str = "ReceiveMessage";
/// Client target for control broadcasts.
pub const RECEIVE: &str = "Receive";
/// Client target for control notifications.
pub const NOTIFY: &str = "Notify";

const SENDER: &str = "Hub";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HubError {
    #[error("group '{0}' has no connections")]
    UnknownGroup(String),

    #[error(transparent)]
    User(#[from] RegistryError),

    #[error("connection '{0}' was not found")]
    ConnectionNotFound(String),

    #[error("hub method '{0}' does not exist")]
    UnknownMethod(String),

    #[error("invalid arguments for {method}: {reason}")]
    InvalidArguments { method: String, reason: String },

    #[error("delivery failed for {failed} of {attempted} connections")]
    SendFailed { attempted: usize, failed: usize },

    #[error("{0}")]
    Fault(String),
}

impl HubError {
    pub fn status(&self) -> StatusCode {
        match self {
            HubError::UnknownGroup(_)
            | HubError::User(_)
            | HubError::ConnectionNotFound(_)
            | HubError::UnknownMethod(_) => StatusCode::NOT_FOUND,
            HubError::InvalidArguments { .. } => StatusCode::BAD_REQUEST,
            HubError::SendFailed { .. } => StatusCode::BAD_GATEWAY,
            HubError::Fault(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn invalid(method: &str, reason: impl Into<String>) -> Self {
        HubError::InvalidArguments {
            method: method.to_string(),
            reason: reason.into(),
        }
    }
}

impl IntoResponse for HubError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}

/// Per-connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnecting,
    Disconnected,
}

#[derive(Debug)]
struct Session {
    outbound: mpsc::Sender<ServerFrame>,
    state: ConnectionState,
}

/// The message hub.
pub struct Hub {
    sessions: DashMap<String, Session>,
    registry: ConnectionRegistry,
    log: SharedLog,
}

impl Hub {
    pub fn new(log: SharedLog) -> Self {
        Self {
            sessions: DashMap::new(),
            registry: ConnectionRegistry::new(),
            log,
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn log(&self) -> &SharedLog {
        &self.log
    }

    /// Open a session for `user` and announce it to the default group.
    ///
    /// Returns the new connection id and the session's outbound queue.
    pub fn connect(&self, user: Option<&str>) -> (String, mpsc::Receiver<ServerFrame>) {
        let connection_id = Uuid::new_v4().to_string();
        let (outbound, rx) = mpsc::channel(OUTBOUND_CAPACITY);

        self.sessions.insert(
            connection_id.clone(),
            Session {
                outbound,
                state: ConnectionState::Connecting,
            },
        );
        self.registry
            .add_connection(&connection_id, Some(DEFAULT_GROUP), user);

        let text = format!(
            "A new session has been created and added to '{}' group. New connection - {}.",
            DEFAULT_GROUP, connection_id
        );
        self.log.write(LogEntry::message(SENDER, text.clone()));
        let members = self.registry.group_members(DEFAULT_GROUP);
        let _ = self.deliver(
            "OnConnected",
            "group",
            members,
            ServerFrame::invocation(RECEIVE_MESSAGE, vec![json!(text)]),
        );

        if let Some(mut session) = self.sessions.get_mut(&connection_id) {
            session.state = ConnectionState::Connected;
        }
        metrics::record_connections(self.sessions.len());
        (connection_id, rx)
    }

    /// Close a session and announce it to the default group.
    ///
    /// `reason` is set when the session ended abnormally. Unknown or already
    /// closing connections are ignored.
    pub fn disconnect(&self, connection_id: &str, reason: Option<&str>) {
        let claimed = match self.sessions.get_mut(connection_id) {
            Some(mut session) if session.state != ConnectionState::Disconnecting => {
                session.state = ConnectionState::Disconnecting;
                true
            }
            _ => false,
        };
        if !claimed {
            return;
        }

        self.registry.remove_connection(connection_id);
        self.sessions.remove(connection_id);

        let mut text = format!("Session with {} was closed.", connection_id);
        self.log.write(LogEntry::message(SENDER, text.clone()));
        if let Some(reason) = reason {
            self.log.write(
                LogEntry::warning(WarningLevel::Normal, SENDER, reason)
                    .with_arg(connection_id),
            );
            text.push_str(&format!(" InnerException: {}.", reason));
        }

        let members = self.registry.group_members(DEFAULT_GROUP);
        let _ = self.deliver(
            "OnDisconnected",
            "group",
            members,
            ServerFrame::invocation(RECEIVE_MESSAGE, vec![json!(text)]),
        );
        metrics::record_connections(self.sessions.len());
    }

    /// Tell every other connection that `connection_id` came back.
    pub fn reconnected(&self, connection_id: &str) -> Result<usize, HubError> {
        let others: Vec<String> = self
            .registry
            .get_all_connection_ids()
            .into_iter()
            .filter(|id| id != connection_id)
            .collect();
        let text = format!("{} reconnected to group.", connection_id);
        self.deliver(
            "Reconnected",
            "others",
            others,
            ServerFrame::invocation(RECEIVE_MESSAGE, vec![json!(text)]),
        )
    }

    /// Lifecycle state of a connection; unknown ids are `Disconnected`.
    pub fn connection_state(&self, connection_id: &str) -> ConnectionState {
        self.sessions
            .get(connection_id)
            .map(|s| s.state)
            .unwrap_or(ConnectionState::Disconnected)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Disconnect every remaining session with `reason`. Returns how many were evicted.
    pub fn evict_all(&self, reason: &str) -> usize {
        let ids: Vec<String> = self.sessions.iter().map(|s| s.key().clone()).collect();
        for id in &ids {
            self.disconnect(id, Some(reason));
        }
        ids.len()
    }

    pub fn send_to_all(&self, message: Value) -> Result<usize, HubError> {
        let ids = self.registry.get_all_connection_ids();
        self.deliver(
            "SendToAll",
            "all",
            ids,
            ServerFrame::invocation(RECEIVE_MESSAGE, vec![message]),
        )
    }

    /// Send to `group`, or the default group when none is given. `user` only labels the message.
    pub fn send_to_group(
        &self,
        user: &str,
        message: Value,
        group: Option<&str>,
    ) -> Result<usize, HubError> {
        let group = group.filter(|g| !g.is_empty()).unwrap_or(DEFAULT_GROUP);
        let members = self.registry.group_members(group);
        if members.is_empty() {
            return Err(self.fail("SendToGroup", HubError::UnknownGroup(group.to_string())));
        }
        self.deliver(
            "SendToGroup",
            "group",
            members,
            ServerFrame::invocation(RECEIVE_MESSAGE, vec![json!(user), message]),
        )
    }

    /// Send to the single connection registered under `user`.
    pub fn send_to_user(&self, user: &str, message: Value) -> Result<usize, HubError> {
        let connection_id = self
            .registry
            .get_connection_id_by_user(user)
            .map_err(|e| self.fail("SendToUser", e.into()))?;
        self.deliver(
            "SendToUser",
            "user",
            vec![connection_id],
            ServerFrame::invocation(RECEIVE_MESSAGE, vec![json!(user), message]),
        )
    }

    pub fn send_to_caller(&self, caller: &str, user: &str, message: Value) -> Result<usize, HubError> {
        if !self.sessions.contains_key(caller) {
            return Err(self.fail("SendToCaller", HubError::ConnectionNotFound(caller.to_string())));
        }
        self.deliver(
            "SendToCaller",
            "caller",
            vec![caller.to_string()],
            ServerFrame::invocation(RECEIVE_MESSAGE, vec![json!(user), message]),
        )
    }

    /// Invoke `target` on every connection.
    pub fn broadcast(&self, target: &str, arguments: Vec<Value>) -> Result<usize, HubError> {
        let ids = self.registry.get_all_connection_ids();
        self.deliver("Broadcast", "all", ids, ServerFrame::invocation(target, arguments))
    }

    /// Invoke `target` on one connection.
    pub fn send_to_connection(
        &self,
        connection_id: &str,
        target: &str,
        arguments: Vec<Value>,
    ) -> Result<usize, HubError> {
        if !self.sessions.contains_key(connection_id) {
            return Err(self.fail(
                "SendToConnection",
                HubError::ConnectionNotFound(connection_id.to_string()),
            ));
        }
        self.deliver(
            "SendToConnection",
            "connection",
            vec![connection_id.to_string()],
            ServerFrame::invocation(target, arguments),
        )
    }

    /// Log a fault raised by `caller`. The returned error is reported to the caller only.
    pub fn raise_fault(&self, caller: &str, reason: Option<&str>) -> HubError {
        let reason = reason
            .filter(|r| !r.is_empty())
            .unwrap_or("An unexpected error occurred invoking the hub method.");
        let error = HubError::Fault(reason.to_string());
        self.log
            .write(LogEntry::error(&error, format!("{}.RaiseFault", SENDER)).with_arg(caller));
        metrics::record_routing_failure("RaiseFault");
        error
    }

    /// Run a client invocation on behalf of `caller`.
    pub fn invoke(&self, caller: &str, invocation: &Invocation) -> Result<usize, HubError> {
        let args = &invocation.arguments;
        match invocation.target.as_str() {
            "SendMessageToAll" => {
                let message = required(args, 0, "SendMessageToAll")
                    .map_err(|e| self.fail("SendToAll", e))?;
                self.send_to_all(message)
            }
            "SendMessageToGroup" => {
                let (user, message) = user_and_message(args, "SendMessageToGroup")
                    .map_err(|e| self.fail("SendToGroup", e))?;
                let group = optional_text(args, 2);
                self.send_to_group(&user, message, group.as_deref())
            }
            "SendMessageToUser" => {
                let (user, message) = user_and_message(args, "SendMessageToUser")
                    .map_err(|e| self.fail("SendToUser", e))?;
                self.send_to_user(&user, message)
            }
            "SendMessageToCaller" => {
                let (user, message) = user_and_message(args, "SendMessageToCaller")
                    .map_err(|e| self.fail("SendToCaller", e))?;
                self.send_to_caller(caller, &user, message)
            }
            "ThrowException" => Err(self.raise_fault(caller, optional_text(args, 0).as_deref())),
            "Reconnected" => self.reconnected(caller),
            other => Err(self.fail("Invoke", HubError::UnknownMethod(other.to_string()))),
        }
    }

    /// Attempt one delivery per id that still has a session.
    fn deliver(
        &self,
        operation: &'static str,
        route: &'static str,
        ids: Vec<String>,
        frame: ServerFrame,
    ) -> Result<usize, HubError> {
        let mut attempted = 0;
        let mut failed = 0;
        for id in &ids {
            // Removed between the registry snapshot and now.
            let Some(session) = self.sessions.get(id) else {
                continue;
            };
            attempted += 1;
            if session.outbound.try_send(frame.clone()).is_err() {
                failed += 1;
            }
        }
        metrics::record_delivery(route, attempted);

        if failed > 0 {
            return Err(self.fail(operation, HubError::SendFailed { attempted, failed }));
        }
        Ok(attempted)
    }

    fn fail(&self, operation: &'static str, error: HubError) -> HubError {
        self.log
            .write(LogEntry::error(&error, format!("{}.{}", SENDER, operation)));
        metrics::record_routing_failure(operation);
        error
    }
}

impl std::fmt::Debug for Hub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hub")
            .field("sessions", &self.sessions.len())
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

fn required(args: &[Value], index: usize, method: &str) -> Result<Value, HubError> {
    args.get(index)
        .cloned()
        .ok_or_else(|| HubError::invalid(method, format!("argument {} is missing", index)))
}

fn user_and_message(args: &[Value], method: &str) -> Result<(String, Value), HubError> {
    let user = match required(args, 0, method)? {
        Value::String(user) => user,
        other => {
            return Err(HubError::invalid(
                method,
                format!("user name must be a string, got {}", other),
            ))
        }
    };
    Ok((user, required(args, 1, method)?))
}

fn optional_text(args: &[Value], index: usize) -> Option<String> {
    args.get(index).and_then(Value::as_str).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::MemoryLog;
    use std::sync::Arc;

    fn hub() -> (Hub, Arc<MemoryLog>) {
        let log = MemoryLog::new();
        (Hub::new(log.clone()), log)
    }

    fn drain(rx: &mut mpsc::Receiver<ServerFrame>) -> Vec<ServerFrame> {
        let mut frames = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            frames.push(frame);
        }
        frames
    }

    fn received(frames: &[ServerFrame]) -> Vec<Vec<Value>> {
        frames
            .iter()
            .filter_map(|f| match f {
                ServerFrame::Invocation { target, arguments } if target == RECEIVE_MESSAGE => {
                    Some(arguments.clone())
                }
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_group_then_all_after_disconnect() {
        let (hub, _log) = hub();
        let (a, mut rx_a) = hub.connect(Some("alice"));
        let (b, mut rx_b) = hub.connect(Some("bob"));
        drain(&mut rx_a);
        drain(&mut rx_b);

        assert_eq!(hub.send_to_group("alice", json!("hi"), None).unwrap(), 2);
        assert_eq!(received(&drain(&mut rx_a)), vec![vec![json!("alice"), json!("hi")]]);
        assert_eq!(received(&drain(&mut rx_b)), vec![vec![json!("alice"), json!("hi")]]);

        hub.disconnect(&b, None);
        assert_eq!(hub.connection_state(&b), ConnectionState::Disconnected);

        assert_eq!(hub.send_to_all(json!("bye")).unwrap(), 1);
        let frames = received(&drain(&mut rx_a));
        assert_eq!(
            frames,
            vec![
                vec![json!(format!("Session with {} was closed.", b))],
                vec![json!("bye")],
            ]
        );
        assert!(drain(&mut rx_b).is_empty());
        assert_eq!(hub.registry().get_all_connection_ids(), vec![a]);
    }

    #[test]
    fn test_connect_announces_to_default_group() {
        let (hub, log) = hub();
        let (a, mut rx_a) = hub.connect(None);

        assert_eq!(hub.connection_state(&a), ConnectionState::Connected);
        assert_eq!(hub.registry().user_of(&a).as_deref(), Some("Anonymous"));

        let expected = format!(
            "A new session has been created and added to 'Private Group' group. New connection - {}.",
            a
        );
        assert_eq!(received(&drain(&mut rx_a)), vec![vec![json!(expected.clone())]]);
        assert!(log.entries().iter().any(|e| e.text == expected));
    }

    #[test]
    fn test_abnormal_disconnect_carries_reason() {
        let (hub, log) = hub();
        let (a, mut rx_a) = hub.connect(None);
        let (b, _rx_b) = hub.connect(None);
        drain(&mut rx_a);

        hub.disconnect(&b, Some("connection reset"));
        hub.disconnect(&b, Some("connection reset"));

        let frames = received(&drain(&mut rx_a));
        assert_eq!(
            frames,
            vec![vec![json!(format!(
                "Session with {} was closed. InnerException: connection reset.",
                b
            ))]]
        );
        assert_eq!(log.warnings().len(), 1);
        assert_eq!(hub.session_count(), 1);
        assert!(hub.registry().contains(&a));
    }

    #[test]
    fn test_send_to_user_requires_unique_label() {
        let (hub, log) = hub();
        assert!(matches!(
            hub.send_to_user("alice", json!("x")),
            Err(HubError::User(RegistryError::NotFound { matches: 0, .. }))
        ));

        let (_a, mut rx_a) = hub.connect(Some("alice"));
        drain(&mut rx_a);
        assert_eq!(hub.send_to_user("alice", json!("x")).unwrap(), 1);
        assert_eq!(received(&drain(&mut rx_a)), vec![vec![json!("alice"), json!("x")]]);

        let _second = hub.connect(Some("alice"));
        assert!(matches!(
            hub.send_to_user("alice", json!("x")),
            Err(HubError::User(RegistryError::NotFound { matches: 2, .. }))
        ));

        let errors = log.errors();
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().all(|e| e.sender == "Hub.SendToUser"));
    }

    #[test]
    fn test_unknown_group_fails() {
        let (hub, _log) = hub();
        let _a = hub.connect(None);
        assert_eq!(
            hub.send_to_group("alice", json!("x"), Some("nobody")),
            Err(HubError::UnknownGroup("nobody".into()))
        );
        assert!(hub.send_to_group("alice", json!("x"), Some("")).is_ok());
    }

    #[test]
    fn test_full_queue_fails_only_that_delivery() {
        let (hub, log) = hub();
        let (_slow, _rx_slow) = hub.connect(None);
        let (_fast, mut rx_fast) = hub.connect(None);

        // The slow session already holds two lifecycle frames.
        for i in 0..OUTBOUND_CAPACITY - 2 {
            drain(&mut rx_fast);
            hub.send_to_all(json!(i)).unwrap();
        }
        drain(&mut rx_fast);

        assert_eq!(
            hub.send_to_all(json!("overflow")),
            Err(HubError::SendFailed {
                attempted: 2,
                failed: 1
            })
        );
        assert_eq!(received(&drain(&mut rx_fast)), vec![vec![json!("overflow")]]);
        assert_eq!(log.errors().len(), 1);
        assert_eq!(log.errors()[0].sender, "Hub.SendToAll");
    }

    #[test]
    fn test_invoke_dispatch() {
        let (hub, log) = hub();
        let (a, mut rx_a) = hub.connect(Some("alice"));
        let (_b, mut rx_b) = hub.connect(Some("bob"));
        drain(&mut rx_a);
        drain(&mut rx_b);

        let call = |target: &str, arguments: Vec<Value>| Invocation {
            invocation_id: Some("1".into()),
            target: target.into(),
            arguments,
        };

        assert_eq!(
            hub.invoke(&a, &call("SendMessageToCaller", vec![json!("alice"), json!("me")]))
                .unwrap(),
            1
        );
        assert_eq!(received(&drain(&mut rx_a)), vec![vec![json!("alice"), json!("me")]]);
        assert!(drain(&mut rx_b).is_empty());

        assert_eq!(hub.invoke(&a, &call("Reconnected", vec![])).unwrap(), 1);
        assert_eq!(
            received(&drain(&mut rx_b)),
            vec![vec![json!(format!("{} reconnected to group.", a))]]
        );
        assert!(drain(&mut rx_a).is_empty());

        assert_eq!(
            hub.invoke(&a, &call("ThrowException", vec![json!("boom")])),
            Err(HubError::Fault("boom".into()))
        );
        assert!(drain(&mut rx_b).is_empty());

        assert!(matches!(
            hub.invoke(&a, &call("SendMessageToUser", vec![json!(1)])),
            Err(HubError::InvalidArguments { .. })
        ));
        assert_eq!(
            hub.invoke(&a, &call("Nope", vec![])),
            Err(HubError::UnknownMethod("Nope".into()))
        );

        assert_eq!(log.errors().len(), 3);
    }

    #[test]
    fn test_evict_all_clears_registry() {
        let (hub, _log) = hub();
        let (_a, mut rx_a) = hub.connect(None);
        let _b = hub.connect(None);

        assert_eq!(hub.evict_all("Host stopped"), 2);
        assert_eq!(hub.session_count(), 0);
        assert!(hub.registry().is_empty());
        // The queue closes once the session is gone.
        drain(&mut rx_a);
        assert!(rx_a.try_recv().is_err());
    }

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(HubError::ConnectionNotFound("x".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(HubError::invalid("m", "r").status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            HubError::SendFailed { attempted: 1, failed: 1 }.status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(HubError::Fault("f".into()).status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}

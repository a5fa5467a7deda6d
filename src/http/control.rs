//! Control endpoints under `/api/v1/serverHub/ServerController`.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::Local;
use serde_json::json;

use crate::domain::Notification;
use crate::http::request::RequestIdExt;
use crate::http::response::ControlError;
use crate::hub::{Hub, NOTIFY, RECEIVE};
use crate::persistence::UnitOfWork;

/// `GET .../ping`
pub async fn ping() -> Json<&'static str> {
    Json("Echo")
}

/// `POST .../send-message-to-all` with a JSON string body.
pub async fn send_message_to_all(
    State(hub): State<Arc<Hub>>,
    headers: HeaderMap,
    Json(message): Json<String>,
) -> Result<StatusCode, ControlError> {
    let text = format!("{} - {}", message, Local::now().format("%H:%M:%S"));
    let delivered = hub.broadcast(RECEIVE, vec![json!(text)])?;
    tracing::debug!(request_id = %headers.request_id(), delivered, "Broadcast sent");
    Ok(StatusCode::OK)
}

/// `POST .../send-notification-by/{connection_id}` with a notification body.
///
/// Delivered notifications are recorded through the unit of work.
pub async fn send_notification_by(
    State(hub): State<Arc<Hub>>,
    State(uow): State<Arc<dyn UnitOfWork>>,
    Path(connection_id): Path<String>,
    Json(notification): Json<Notification>,
) -> Result<Json<String>, ControlError> {
    let connection_id = connection_id.trim().to_string();
    if connection_id.is_empty() {
        return Err(ControlError::MissingConnectionId);
    }

    let payload = serde_json::to_value(&notification)?;
    hub.send_to_connection(&connection_id, NOTIFY, vec![payload])?;

    uow.notifications().insert(notification);
    uow.save_changes();
    Ok(Json(connection_id))
}

/// `POST .../send-notification-by` without a connection id.
pub async fn missing_connection_id() -> ControlError {
    ControlError::MissingConnectionId
}

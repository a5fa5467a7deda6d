//! Error to status mapping for the control API.
//!
//! `HubError` and `AuthError` implement `IntoResponse` next to their definitions;
//! this module covers what the control handlers add on top.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::hub::HubError;

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("Connection id is not specified.")]
    MissingConnectionId,

    #[error("failed to encode notification: {0}")]
    Encode(#[from] serde_json::Error),

    #[error(transparent)]
    Hub(#[from] HubError),
}

impl IntoResponse for ControlError {
    fn into_response(self) -> Response {
        match self {
            ControlError::MissingConnectionId => {
                (StatusCode::BAD_REQUEST, self.to_string()).into_response()
            }
            ControlError::Encode(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()).into_response()
            }
            ControlError::Hub(e) => e.into_response(),
        }
    }
}

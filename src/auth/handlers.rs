use std::sync::Arc;

use axum::{extract::State, Json};
use serde::Deserialize;

use crate::auth::{AuthError, JwtKeys};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

/// `POST /api/v1/Auth/login`
///
/// Any non-empty user name and password pair is accepted; credential storage is out of scope.
pub async fn login(
    State(keys): State<Arc<JwtKeys>>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<String>, AuthError> {
    let user = match (request.user_name.as_deref(), request.password.as_deref()) {
        (Some(user), Some(password)) if !user.is_empty() && !password.is_empty() => user,
        _ => return Err(AuthError::MissingCredentials),
    };

    let token = keys.issue(user)?;
    tracing::info!(user = %user, "Issued access token");
    Ok(Json(token))
}

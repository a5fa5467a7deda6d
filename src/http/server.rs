//! HTTP router construction.
//!
//! # Responsibilities
//! - Create the Axum router: login, control endpoints and the hub route
//! - Protect control endpoints with a bearer token and the hub with a handshake token
//! - Wire up middleware (tracing, CORS, request ID, timeouts)
//!
//! # Design Decisions
//! - The router is rebuilt on every host start because the hub route is configurable
//! - The control timeout does not apply to the hub route; sessions are long-lived

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::FromRef,
    middleware,
    routing::{get, post},
    Router,
};
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::auth::{handlers::login, require_bearer, require_hub_token, JwtKeys};
use crate::config::AppSetting;
use crate::http::control;
use crate::http::request::{propagate_request_id, set_request_id};
use crate::hub::{session::hub_endpoint, Hub};
use crate::persistence::UnitOfWork;

pub const LOGIN_PATH: &str = "/api/v1/Auth/login";
pub const CONTROL_PREFIX: &str = "/api/v1/serverHub/ServerController";

/// Upper bound for a control request.
pub const CONTROL_TIMEOUT: Duration = Duration::from_secs(30);

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<Hub>,
    pub keys: Arc<JwtKeys>,
    pub uow: Arc<dyn UnitOfWork>,
    /// Cancelled when the host stops; every session watches it.
    pub sessions: CancellationToken,
}

impl FromRef<AppState> for Arc<Hub> {
    fn from_ref(state: &AppState) -> Self {
        state.hub.clone()
    }
}

impl FromRef<AppState> for Arc<JwtKeys> {
    fn from_ref(state: &AppState) -> Self {
        state.keys.clone()
    }
}

impl FromRef<AppState> for Arc<dyn UnitOfWork> {
    fn from_ref(state: &AppState) -> Self {
        state.uow.clone()
    }
}

impl FromRef<AppState> for CancellationToken {
    fn from_ref(state: &AppState) -> Self {
        state.sessions.clone()
    }
}

/// Build the router with all middleware layers.
#[allow(deprecated)]
pub fn build_router(state: AppState, setting: &AppSetting) -> Router {
    let keys = state.keys.clone();

    let control = Router::new()
        .route("/ping", get(control::ping))
        .route("/send-message-to-all", post(control::send_message_to_all))
        .route(
            "/send-notification-by/{connection_id}",
            post(control::send_notification_by),
        )
        .route("/send-notification-by", post(control::missing_connection_id))
        .route("/send-notification-by/", post(control::missing_connection_id))
        .route_layer(middleware::from_fn_with_state(keys.clone(), require_bearer))
        .layer(TimeoutLayer::new(CONTROL_TIMEOUT));

    let hub = Router::new()
        .route(&setting.route_hub, get(hub_endpoint))
        .route_layer(middleware::from_fn_with_state(keys, require_hub_token));

    Router::new()
        .route(LOGIN_PATH, post(login))
        .nest(CONTROL_PREFIX, control)
        .merge(hub)
        .with_state(state)
        .layer(propagate_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(set_request_id())
        .layer(CorsLayer::permissive())
}

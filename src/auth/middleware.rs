//! Token checks for protected routes.

use std::sync::Arc;

use axum::{
    extract::{Query, Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::Response,
};
use serde::Deserialize;

use crate::auth::{AuthError, JwtKeys};

#[derive(Debug, Deserialize)]
struct TokenQuery {
    access_token: Option<String>,
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Require `Authorization: Bearer <token>`. Verified claims are inserted into request extensions.
pub async fn require_bearer(
    State(keys): State<Arc<JwtKeys>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let token = bearer_token(request.headers()).ok_or(AuthError::MissingToken)?;
    let claims = keys.verify(token)?;
    request.extensions_mut().insert(claims);
    Ok(next.run(request).await)
}

/// Like `require_bearer`, but browsers cannot set headers on a WebSocket handshake,
/// so the `access_token` query parameter is checked first.
pub async fn require_hub_token(
    State(keys): State<Arc<JwtKeys>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let from_query = Query::<TokenQuery>::try_from_uri(request.uri())
        .ok()
        .and_then(|Query(q)| q.access_token)
        .filter(|t| !t.is_empty());

    let claims = match from_query {
        Some(token) => keys.verify(&token)?,
        None => {
            let token = bearer_token(request.headers()).ok_or(AuthError::MissingToken)?;
            keys.verify(token)?
        }
    };
    request.extensions_mut().insert(claims);
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(bearer_token(&headers), Some("abc.def"));
    }
}

//! Bearer-token authentication.
//!
//! # Responsibilities
//! - Issue short-lived HS256 tokens for a user name (`handlers.rs`)
//! - Verify tokens on control endpoints and on the hub handshake (`middleware.rs`)
//!
//! # Design Decisions
//! - The signing secret comes from `RELAY_JWT_SECRET`; without it a fixed development
//!   key is used and a warning is logged at startup
//! - Issuer and audience are fixed and always validated

pub mod handlers;
pub mod middleware;

use std::fmt;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use middleware::{require_bearer, require_hub_token};

pub const ISSUER: &str = "AuthServer";
pub const AUDIENCE: &str = "AuthClient";

/// Token lifetime in seconds.
pub const TOKEN_TTL_SECS: i64 = 120;

/// Environment variable holding the signing secret.
pub const JWT_SECRET_ENV: &str = "RELAY_JWT_SECRET";

const DEV_SECRET: &str = "relay-hub-development-signing-key-not-for-production";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("user name and password are required")]
    MissingCredentials,

    #[error("missing bearer token")]
    MissingToken,

    #[error("invalid token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = match self {
            AuthError::MissingCredentials => StatusCode::BAD_REQUEST,
            AuthError::MissingToken | AuthError::InvalidToken(_) => StatusCode::UNAUTHORIZED,
        };
        tracing::debug!(status = %status, error = %self, "Authentication rejected");
        (status, self.to_string()).into_response()
    }
}

/// Claims carried by every token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    /// User label the hub registers the session under.
    pub name: String,
    pub iss: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    fn new(user: &str, ttl_secs: i64) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            sub: user.to_string(),
            name: user.to_string(),
            iss: ISSUER.to_string(),
            aud: AUDIENCE.to_string(),
            iat: now,
            exp: now + ttl_secs,
        }
    }
}

/// Signing and verification keys.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl_secs: i64,
    development: bool,
}

impl JwtKeys {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[ISSUER]);
        validation.set_audience(&[AUDIENCE]);
        validation.set_required_spec_claims(&["exp", "iss", "aud"]);

        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            ttl_secs: TOKEN_TTL_SECS,
            development: false,
        }
    }

    /// Keys signed with the built-in development secret.
    pub fn development() -> Self {
        Self {
            development: true,
            ..Self::new(DEV_SECRET)
        }
    }

    /// Secret from `RELAY_JWT_SECRET`, falling back to the development key.
    pub fn from_env() -> Self {
        match std::env::var(JWT_SECRET_ENV) {
            Ok(secret) if !secret.is_empty() => Self::new(&secret),
            _ => Self::development(),
        }
    }

    pub fn with_ttl(mut self, ttl_secs: i64) -> Self {
        self.ttl_secs = ttl_secs;
        self
    }

    pub fn is_development(&self) -> bool {
        self.development
    }

    /// Sign a token for `user`.
    pub fn issue(&self, user: &str) -> Result<String, AuthError> {
        let claims = Claims::new(user, self.ttl_secs);
        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?)
    }

    /// Verify signature, expiry, issuer and audience.
    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        Ok(decode::<Claims>(token, &self.decoding, &self.validation)?.claims)
    }
}

impl fmt::Debug for JwtKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtKeys")
            .field("ttl_secs", &self.ttl_secs)
            .field("development", &self.development)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_and_verify() {
        let keys = JwtKeys::new("test-secret");
        let token = keys.issue("alice").unwrap();
        let claims = keys.verify(&token).unwrap();

        assert_eq!(claims.name, "alice");
        assert_eq!(claims.iss, ISSUER);
        assert_eq!(claims.aud, AUDIENCE);
        assert_eq!(claims.exp - claims.iat, TOKEN_TTL_SECS);
    }

    #[test]
    fn test_rejects_foreign_signature() {
        let token = JwtKeys::new("one").issue("alice").unwrap();
        assert!(matches!(
            JwtKeys::new("two").verify(&token),
            Err(AuthError::InvalidToken(_))
        ));
    }

    #[test]
    fn test_rejects_expired_token() {
        let keys = JwtKeys::new("test-secret").with_ttl(-600);
        let token = keys.issue("alice").unwrap();
        assert!(keys.verify(&token).is_err());
    }

    #[test]
    fn test_development_keys_are_flagged() {
        assert!(JwtKeys::development().is_development());
        assert!(!JwtKeys::new("x").is_development());
    }
}

//! Bearer token authentication middleware.
//!
//! Every batch route runs behind [`require_user_auth`]. The numeric `sub`
//! claim of a valid HS256 token becomes the owner ID for all job reads and
//! writes.

use axum::{
    body::Body,
    extract::State,
    http::{header::AUTHORIZATION, HeaderMap, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use shared::jwt::{extract_user_id, JwtConfig, JwtError};

use crate::app::AppState;
use crate::config::JwtAuthConfig;

/// Authenticated user information extracted from the bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserAuth {
    /// Owner ID from the JWT subject claim.
    pub user_id: i64,
    /// JWT ID (jti), logged for correlation.
    pub jti: String,
}

impl UserAuth {
    /// Validates an access token and returns the caller's identity.
    pub fn validate(jwt_config: &JwtConfig, token: &str) -> Result<Self, JwtError> {
        let claims = jwt_config.validate_access_token(token)?;
        let user_id = extract_user_id(&claims)?;

        Ok(UserAuth {
            user_id,
            jti: claims.jti,
        })
    }

    /// Builds the verifier from configuration.
    pub fn create_jwt_config(config: &JwtAuthConfig) -> Result<JwtConfig, JwtError> {
        JwtConfig::with_leeway(
            &config.secret,
            config.access_token_expiry_secs,
            config.leeway_secs,
        )
    }
}

/// Returns the token of an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|header| header.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Rejects requests without a valid bearer token and stores the caller's
/// [`UserAuth`] in request extensions.
pub async fn require_user_auth(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let Some(token) = bearer_token(req.headers()) else {
        return unauthorized_response("Missing or invalid Authorization header");
    };

    match UserAuth::validate(&state.jwt, token) {
        Ok(auth) => {
            tracing::Span::current().record("user_id", auth.user_id);
            tracing::debug!(jti = %auth.jti, "Request authenticated");
            req.extensions_mut().insert(auth);
            next.run(req).await
        }
        Err(e) => {
            tracing::debug!(error = %e, "JWT validation failed");
            unauthorized_response("Invalid or expired token")
        }
    }
}

fn unauthorized_response(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({
            "error": "unauthorized",
            "message": message
        })),
    )
        .into_response()
}

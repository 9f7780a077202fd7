//! HTTP Basic authentication for the admin surface.
//!
//! Authentication engages only when both a user and a password are
//! configured; otherwise every request passes. Presented credentials are
//! compared as SHA-256 digests rather than raw strings.

use axum::{
    extract::{Request, State},
    http::{StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::Engine as _;
use sha2::{Digest, Sha256};

use crate::AdminState;

fn digest(value: &str) -> String {
    hex::encode(Sha256::digest(value.as_bytes()))
}

/// Validate an `Authorization: Basic` header value against the configured
/// credentials.
#[must_use]
pub fn credentials_match(header_value: &str, user: &str, pass: &str) -> bool {
    let Some(encoded) = header_value.strip_prefix("Basic ") else {
        return false;
    };
    let Ok(decoded) = base64::engine::general_purpose::STANDARD.decode(encoded.trim()) else {
        return false;
    };
    let Ok(decoded) = String::from_utf8(decoded) else {
        return false;
    };
    let Some((presented_user, presented_pass)) = decoded.split_once(':') else {
        return false;
    };

    digest(presented_user) == digest(user) && digest(presented_pass) == digest(pass)
}

/// Router middleware gating every admin route.
pub async fn require(State(state): State<AdminState>, request: Request, next: Next) -> Response {
    if state.auth_user.is_empty() || state.auth_pass.is_empty() {
        return next.run(request).await;
    }

    let authorized = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| credentials_match(value, &state.auth_user, &state.auth_pass));

    if authorized {
        next.run(request).await
    } else {
        (
            StatusCode::UNAUTHORIZED,
            [(header::WWW_AUTHENTICATE, "Basic realm=\"postrider\"")],
            "unauthorized",
        )
            .into_response()
    }
}

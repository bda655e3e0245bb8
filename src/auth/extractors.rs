use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
};
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::state::AppState;

pub const SECRET_HEADER: &str = "x-auth-secret";

/// Guard for deployments that set `AUTH_SECRET`: the caller must echo it in
/// the `x-auth-secret` header. A no-op when no secret is configured.
pub struct SharedSecret;

#[async_trait]
impl FromRequestParts<AppState> for SharedSecret {
    type Rejection = (StatusCode, String);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(expected) = state.config.auth_secret.as_deref() else {
            return Ok(SharedSecret);
        };

        let provided = parts
            .headers
            .get(SECRET_HEADER)
            .and_then(|h| h.to_str().ok())
            .ok_or((StatusCode::UNAUTHORIZED, "missing x-auth-secret header".into()))?;

        let provided = Sha256::digest(provided.as_bytes());
        let expected = Sha256::digest(expected.as_bytes());
        if !constant_time_eq(&provided, &expected) {
            warn!("rejected request with wrong auth secret");
            return Err((StatusCode::UNAUTHORIZED, "invalid auth secret".into()));
        }
        Ok(SharedSecret)
    }
}

/// Byte comparison whose running time does not depend on where the inputs
/// first differ.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

//! Sweep trigger authentication.
//!
//! The scheduler calling `POST /api/maintenance/sweep` presents the configured
//! shared secret as a Bearer token.

use std::sync::Arc;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    Json,
};
use serde_json::{json, Value};
use tracing::warn;

use shopguard_logging::redact_sensitive_data;

use crate::api::AppState;

/// Proof that the request carried the sweep trigger secret.
pub struct SweepTrigger;

#[async_trait]
impl FromRequestParts<Arc<AppState>> for SweepTrigger {
    type Rejection = (StatusCode, Json<Value>);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let Some(secret) = state.config.sweep.trigger_secret.as_deref() else {
            warn!("Sweep trigger called but no trigger secret is configured");
            return Err((
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "error": "sweep trigger disabled" })),
            ));
        };

        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|val| val.to_str().ok());

        match check_bearer(header, secret) {
            Ok(()) => Ok(SweepTrigger),
            Err(reason) => {
                warn!(
                    header = %redact_sensitive_data(header.unwrap_or("")),
                    reason,
                    "Rejected sweep trigger"
                );
                Err((StatusCode::UNAUTHORIZED, Json(json!({ "error": reason }))))
            }
        }
    }
}

/// Validate an `Authorization` header against the shared secret.
pub fn check_bearer(header: Option<&str>, secret: &str) -> Result<(), &'static str> {
    let Some(token) = header.and_then(|h| h.strip_prefix("Bearer ")) else {
        return Err("missing credentials");
    };
    if constant_time_eq(token.trim().as_bytes(), secret.as_bytes()) {
        Ok(())
    } else {
        Err("invalid token")
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "nightly-sweep-secret-0123";

    #[test]
    fn accepts_matching_bearer() {
        assert!(check_bearer(Some("Bearer nightly-sweep-secret-0123"), SECRET).is_ok());
    }

    #[test]
    fn rejects_missing_or_malformed_header() {
        assert_eq!(check_bearer(None, SECRET), Err("missing credentials"));
        assert_eq!(check_bearer(Some("Basic abc"), SECRET), Err("missing credentials"));
    }

    #[test]
    fn rejects_wrong_or_truncated_token() {
        assert_eq!(check_bearer(Some("Bearer nightly-sweep-secret-0124"), SECRET), Err("invalid token"));
        assert_eq!(check_bearer(Some("Bearer nightly"), SECRET), Err("invalid token"));
    }
}

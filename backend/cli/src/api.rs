use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::error;

use shopguard_config::ShopGuardConfig;
use shopguard_core::{resolve_outcome, CounterStore, Decision, FailureMode, ThrottleError};
use shopguard_ratelimit::{RateLimiter, RetentionSweeper};

use crate::auth::SweepTrigger;

/// Shared application state for API handlers.
pub struct AppState {
    pub limiter: RateLimiter,
    pub sweeper: RetentionSweeper,
    pub store: Arc<dyn CounterStore>,
    pub config: Arc<ShopGuardConfig>,
}

impl AppState {
    pub fn new(store: Arc<dyn CounterStore>, config: Arc<ShopGuardConfig>) -> Self {
        Self {
            limiter: RateLimiter::new(Arc::clone(&store)),
            sweeper: RetentionSweeper::new(Arc::clone(&store)),
            store,
            config,
        }
    }
}

/// Build the Axum router with all API routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/policies", get(list_policies))
        .route("/api/rate-limit/check", post(check))
        .route("/api/maintenance/sweep", post(trigger_sweep))
        .with_state(state)
}

/// Health check endpoint; fails when the store cannot be read.
async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<Value>) {
    let store = Arc::clone(&state.store);
    let counters = tokio::task::spawn_blocking(move || store.count()).await;
    match counters {
        Ok(Ok(n)) => (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "service": "shopguard",
                "version": env!("CARGO_PKG_VERSION"),
                "counters": n,
            })),
        ),
        Ok(Err(e)) => {
            error!(error = %e, "Health check could not read the counter store");
            (StatusCode::SERVICE_UNAVAILABLE, Json(json!({ "status": "degraded", "error": e.to_string() })))
        }
        Err(e) => {
            error!(error = %e, "Health check worker failed");
            (StatusCode::SERVICE_UNAVAILABLE, Json(json!({ "status": "degraded" })))
        }
    }
}

/// List the effective policy table.
async fn list_policies(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({ "policies": state.config.policies }))
}

#[derive(Debug, Deserialize)]
pub struct CheckRequest {
    pub identity: String,
    pub action: String,
}

/// Check and record one attempt for a storefront handler.
async fn check(State(state): State<Arc<AppState>>, Json(req): Json<CheckRequest>) -> Response {
    let Some((policy, mode)) = state.config.policy(&req.action) else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("no policy for action '{}'", req.action) })),
        )
            .into_response();
    };

    match state.limiter.check_and_record(&req.identity, &policy).await {
        Ok(decision) => decision_response(StatusCode::OK, decision),
        Err(ThrottleError::InvalidPolicy(msg)) => {
            (StatusCode::BAD_REQUEST, Json(json!({ "error": msg }))).into_response()
        }
        Err(err) => {
            error!(action = %req.action, failure_mode = ?mode, error = %err, "Unresolved rate limit check");
            let status = match mode {
                FailureMode::Closed => StatusCode::SERVICE_UNAVAILABLE,
                FailureMode::Open => StatusCode::OK,
            };
            match resolve_outcome(Err(err), mode) {
                Ok(decision) => decision_response(status, decision),
                Err(e) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": e.to_string() }))).into_response()
                }
            }
        }
    }
}

/// Admissions answer `ok_status`; denials answer 429 (or `ok_status` when
/// that is already an error status) with a `Retry-After` header.
fn decision_response(ok_status: StatusCode, decision: Decision) -> Response {
    let body = Json(decision.body());
    match decision {
        Decision::Allowed { .. } => (ok_status, body).into_response(),
        Decision::Denied { retry_after_secs } => {
            let status = if ok_status.is_success() {
                StatusCode::TOO_MANY_REQUESTS
            } else {
                ok_status
            };
            (status, [(header::RETRY_AFTER, retry_after_secs.to_string())], body).into_response()
        }
    }
}

/// Run one retention sweep pass for an external scheduler.
async fn trigger_sweep(
    _trigger: SweepTrigger,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let retention = state.config.retention();
    match state.sweeper.sweep(retention).await {
        Ok(deleted) => Ok(Json(json!({
            "deleted": deleted,
            "retentionMs": u64::try_from(retention.as_millis()).unwrap_or(u64::MAX),
        }))),
        Err(e) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        )),
    }
}

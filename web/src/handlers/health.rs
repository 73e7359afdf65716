//! Liveness and readiness probes.

use axum::{Json, extract::State, http::StatusCode};
use serde_json::{Value, json};
use std::sync::Arc;
use turnstile_core::store::RegistrationStore;

/// Liveness: the process is up. Checks nothing else.
///
/// ```text
/// GET /health  →  200 {"status": "ok"}
/// ```
#[allow(clippy::unused_async)]
pub async fn health_check() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "ok" })))
}

/// Readiness: the registration store answers a ping.
///
/// ```text
/// GET /ready  →  200 {"status": "ready"} | 503 {"status": "unavailable"}
/// ```
pub async fn readiness_check(
    State(store): State<Arc<dyn RegistrationStore>>,
) -> (StatusCode, Json<Value>) {
    match store.ping().await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "ready" }))),
        Err(err) => {
            tracing::warn!(error = %err, "Readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unavailable" })),
            )
        },
    }
}

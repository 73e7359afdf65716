//! Router configuration.

use crate::api::{registrations, tickets};
use crate::state::AppState;
use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use turnstile_runtime::metrics::MetricsServer;
use turnstile_web::correlation_id_layer;
use turnstile_web::handlers::{health_check, readiness_check};

/// Build the complete API router.
///
/// - `/health`, `/ready`: probes, no authentication
/// - `/api/events/...`, `/api/registrations/...`, `/api/tickets/...`
///
/// Every request is traced and tagged with a correlation ID.
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        // Registration
        .route("/events/:event_id/register", post(registrations::register))
        .route("/events/:event_id/waitlist", get(registrations::waitlist))
        .route(
            "/events/:event_id/waitlist/promote",
            post(registrations::promote_waitlist),
        )
        .route("/registrations", get(registrations::my_registrations))
        .route(
            "/registrations/:id",
            get(registrations::get_registration).delete(registrations::delete_registration),
        )
        .route(
            "/registrations/:id/cancel",
            post(registrations::cancel_registration),
        )
        // Tickets
        .route("/tickets/scan", post(tickets::scan))
        .route("/tickets/:id", get(tickets::get_ticket))
        .route("/tickets/:id/cancel", post(tickets::cancel_ticket))
        .route("/tickets/:id/qr", post(tickets::refresh_qr));

    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(correlation_id_layer())
        .with_state(state)
}

/// Prometheus scrape endpoint, served on the metrics port.
pub fn metrics_router(metrics: Arc<MetricsServer>) -> Router {
    Router::new()
        .route("/metrics", get(render_metrics))
        .with_state(metrics)
}

async fn render_metrics(State(metrics): State<Arc<MetricsServer>>) -> impl IntoResponse {
    match metrics.render() {
        Some(body) => (StatusCode::OK, body),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            "metrics recorder not installed".to_string(),
        ),
    }
}

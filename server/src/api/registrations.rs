//! Registration endpoints.
//!
//! - `POST /api/events/:event_id/register`: register (any caller)
//! - `GET /api/events/:event_id/waitlist`: waitlist in promotion order (staff)
//! - `POST /api/events/:event_id/waitlist/promote`: promote after a capacity change (admin)
//! - `GET /api/registrations`: the caller's registrations
//! - `GET /api/registrations/:id`: one registration (owner or admin)
//! - `POST /api/registrations/:id/cancel`: cancel (owner or admin)
//! - `DELETE /api/registrations/:id`: delete (admin)

use crate::auth::{Authenticated, RequireAdmin, RequireStaff};
use crate::state::AppState;
use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
};
use serde_json::Value;
use turnstile_core::error::RegistrationError;
use turnstile_core::store::{CancellationReport, DeletionReport, Promotion};
use turnstile_core::types::{EventId, Registration, RegistrationId};
use turnstile_runtime::{Registered, RegistrationView};
use turnstile_web::{AppError, WebResult};

fn event_id(raw: &str) -> WebResult<EventId> {
    EventId::parse(raw.trim())
        .map_err(|_| RegistrationError::InvalidEventId(raw.to_string()).into())
}

fn registration_id(raw: &str) -> WebResult<RegistrationId> {
    RegistrationId::parse(raw.trim())
        .map_err(|_| RegistrationError::InvalidRegistrationId(raw.to_string()).into())
}

/// Raw `quantity` from an optional JSON body. An empty body means one seat.
fn requested_quantity(body: &Bytes) -> WebResult<Option<Value>> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    let body: Value = serde_json::from_slice(body)
        .map_err(|e| AppError::bad_request(format!("Invalid JSON body: {e}")))?;
    Ok(body.get("quantity").cloned())
}

/// Register for an event.
///
/// Responds 201 with the tickets when seats were reserved, 202 when the
/// caller joined the waitlist, and 409 with the existing registration when
/// the caller already holds one.
///
/// # Example
///
/// ```bash
/// curl -X POST http://localhost:8080/api/events/<event_id>/register \
///   -H "Authorization: Bearer <session_token>" \
///   -H "Content-Type: application/json" \
///   -d '{"quantity": 2}'
/// ```
///
/// # Errors
///
/// - 400: malformed event id, body or quantity
/// - 404: unknown event
/// - 409: already registered
pub async fn register(
    Authenticated(caller): Authenticated,
    State(state): State<AppState>,
    Path(raw_event_id): Path<String>,
    body: Bytes,
) -> WebResult<(StatusCode, Json<Registered>)> {
    let quantity = requested_quantity(&body)?;
    let request = state
        .engine
        .validate(Some(caller.user_id), &raw_event_id, quantity.as_ref())?;

    let registered = state.engine.register(request).await?;
    let status = match registered {
        Registered::Confirmed { .. } => StatusCode::CREATED,
        Registered::Waitlisted { .. } => StatusCode::ACCEPTED,
    };
    Ok((status, Json(registered)))
}

/// Waitlisted registrations in the order they will be promoted.
///
/// # Errors
///
/// - 400: malformed event id
/// - 404: unknown event
pub async fn waitlist(
    RequireStaff(_staff): RequireStaff,
    State(state): State<AppState>,
    Path(raw_event_id): Path<String>,
) -> WebResult<Json<Vec<Registration>>> {
    let event_id = event_id(&raw_event_id)?;
    Ok(Json(state.engine.waitlist(event_id).await?))
}

/// Fill released or added seats from the waitlist.
///
/// # Errors
///
/// - 400: malformed event id
/// - 404: unknown event
pub async fn promote_waitlist(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Path(raw_event_id): Path<String>,
) -> WebResult<Json<Vec<Promotion>>> {
    let event_id = event_id(&raw_event_id)?;
    let promotions = state.engine.promote_waitlist(event_id).await?;
    tracing::info!(
        event_id = %event_id,
        admin_id = %admin.user_id,
        promoted = promotions.len(),
        "Waitlist promotion requested"
    );
    Ok(Json(promotions))
}

/// The caller's registrations with their tickets, newest first.
///
/// # Errors
///
/// - 500: store failure
pub async fn my_registrations(
    Authenticated(caller): Authenticated,
    State(state): State<AppState>,
) -> WebResult<Json<Vec<RegistrationView>>> {
    Ok(Json(state.engine.registrations_for(caller.user_id).await?))
}

/// One registration with its tickets.
///
/// # Errors
///
/// - 400: malformed id
/// - 403: caller is neither the owner nor an admin
/// - 404: unknown registration
pub async fn get_registration(
    Authenticated(caller): Authenticated,
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> WebResult<Json<RegistrationView>> {
    let id = registration_id(&raw_id)?;
    Ok(Json(state.engine.registration(&caller, id).await?))
}

/// Cancel a registration, releasing its seats to the waitlist.
///
/// # Errors
///
/// - 400: malformed id
/// - 403: caller is neither the owner nor an admin
/// - 404: unknown registration
/// - 409: already cancelled, or a ticket was already used
pub async fn cancel_registration(
    Authenticated(caller): Authenticated,
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> WebResult<Json<CancellationReport>> {
    let id = registration_id(&raw_id)?;
    Ok(Json(state.engine.cancel(&caller, id).await?))
}

/// Remove a registration and its tickets.
///
/// # Errors
///
/// - 400: malformed id
/// - 404: unknown registration
pub async fn delete_registration(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> WebResult<Json<DeletionReport>> {
    let id = registration_id(&raw_id)?;
    let report = state.engine.delete(id).await?;
    tracing::info!(registration_id = %id, admin_id = %admin.user_id, "Registration deleted by admin");
    Ok(Json(report))
}

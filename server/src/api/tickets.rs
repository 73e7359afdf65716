//! Ticket endpoints.
//!
//! - `POST /api/tickets/scan`: admit a ticket holder at the gate (staff)
//! - `GET /api/tickets/:id`: one ticket (holder or staff)
//! - `POST /api/tickets/:id/cancel`: withdraw a ticket (admin)
//! - `POST /api/tickets/:id/qr`: fresh QR image and validity window (holder or admin)

use crate::auth::{Authenticated, RequireAdmin, RequireStaff};
use crate::state::AppState;
use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
};
use serde_json::Value;
use turnstile_core::error::TicketError;
use turnstile_core::scan::AdmittedTicket;
use turnstile_core::types::{Ticket, TicketId};
use turnstile_web::WebResult;

fn ticket_id(raw: &str) -> WebResult<TicketId> {
    TicketId::parse(raw.trim()).map_err(|_| TicketError::InvalidTicketId(raw.to_string()).into())
}

/// The `code` field of a scan request. Absent, non-string and unparsable
/// bodies all yield an empty code, which the validator rejects as missing.
fn scanned_code(body: &Bytes) -> String {
    serde_json::from_slice::<Value>(body)
        .ok()
        .and_then(|body| body.get("code").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_default()
}

/// Scan a ticket code at the gate.
///
/// Responds 200 with the attendee and event details when admitted.
///
/// # Example
///
/// ```bash
/// curl -X POST http://localhost:8080/api/tickets/scan \
///   -H "Authorization: Bearer <staff_token>" \
///   -H "Content-Type: application/json" \
///   -d '{"code": "K7Q2M9XA"}'
/// ```
///
/// # Errors
///
/// - 400: no code
/// - 403: ticket cancelled or QR expired
/// - 404: unknown code
/// - 409: ticket already used (possible re-use)
pub async fn scan(
    RequireStaff(staff): RequireStaff,
    State(state): State<AppState>,
    body: Bytes,
) -> WebResult<Json<AdmittedTicket>> {
    let code = scanned_code(&body);
    Ok(Json(state.validator.scan(&code, &staff).await?))
}

/// One ticket.
///
/// # Errors
///
/// - 400: malformed id
/// - 403: caller neither holds the ticket nor is staff
/// - 404: unknown ticket
pub async fn get_ticket(
    Authenticated(caller): Authenticated,
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> WebResult<Json<Ticket>> {
    let id = ticket_id(&raw_id)?;
    Ok(Json(state.engine.ticket(&caller, id).await?))
}

/// Withdraw a single valid ticket. Seats are not returned.
///
/// # Errors
///
/// - 400: malformed id
/// - 404: unknown ticket
/// - 409: ticket is used or already cancelled
pub async fn cancel_ticket(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> WebResult<Json<Ticket>> {
    let id = ticket_id(&raw_id)?;
    let ticket = state.engine.cancel_ticket(id).await?;
    tracing::info!(ticket_id = %id, admin_id = %admin.user_id, "Ticket cancelled by admin");
    Ok(Json(ticket))
}

/// Render a fresh QR image and restart the ticket's validity window.
///
/// # Errors
///
/// - 400: malformed id
/// - 403: caller neither holds the ticket nor is an admin
/// - 404: unknown ticket
/// - 409: ticket is used or cancelled
pub async fn refresh_qr(
    Authenticated(caller): Authenticated,
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> WebResult<Json<Ticket>> {
    let id = ticket_id(&raw_id)?;
    Ok(Json(state.engine.refresh_qr(&caller, id).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_is_read_from_the_body() {
        assert_eq!(scanned_code(&Bytes::from_static(br#"{"code": "ABC123"}"#)), "ABC123");
    }

    #[test]
    fn anything_else_is_an_empty_code() {
        for body in [&b""[..], b"{}", br#"{"code": 7}"#, b"not json"] {
            assert_eq!(scanned_code(&Bytes::copy_from_slice(body)), "");
        }
    }
}

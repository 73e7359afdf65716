//! HTTP error mapping.
//!
//! [`AppError`] is the single error type handlers return. Domain errors
//! convert into it with the status codes the API documents, and it renders
//! as `{"code", "message", "details"?}` JSON.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::{Value, json};
use std::fmt;
use turnstile_core::error::{RegistrationError, StoreError, TicketError};
use turnstile_core::scan::ScanError;

/// Application error type for web handlers.
///
/// # Examples
///
/// ```
/// use turnstile_web::AppError;
/// use axum::http::StatusCode;
///
/// let err = AppError::bad_request("Invalid event id");
/// assert_eq!(err.status(), StatusCode::BAD_REQUEST);
/// assert_eq!(err.code(), "BAD_REQUEST");
/// ```
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
    code: String,
    /// Structured context for the client, rendered as `details`.
    details: Option<Value>,
    /// Internal error, logged for 5xx and never sent to the client.
    source: Option<anyhow::Error>,
}

impl AppError {
    /// Create a new application error.
    #[must_use]
    pub fn new(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            code: code.into(),
            details: None,
            source: None,
        }
    }

    /// Attach client-visible context.
    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Attach an internal cause for logging.
    #[must_use]
    pub fn with_source(mut self, source: anyhow::Error) -> Self {
        self.source = Some(source);
        self
    }

    /// HTTP status.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Machine-readable code.
    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Client-visible context, if any.
    #[must_use]
    pub const fn details(&self) -> Option<&Value> {
        self.details.as_ref()
    }

    /// 400 Bad Request.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    /// 401 Unauthorized.
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHENTICATED", message)
    }

    /// 403 Forbidden.
    #[must_use]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, "FORBIDDEN", message)
    }

    /// 404 Not Found.
    #[must_use]
    pub fn not_found(resource: impl fmt::Display, id: impl fmt::Display) -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("{resource} with id {id} not found"),
        )
    }

    /// 409 Conflict.
    #[must_use]
    pub fn conflict(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, code, message)
    }

    /// 500 Internal Server Error. `message` is logged, not returned.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            "An internal error occurred",
        )
        .with_source(anyhow::anyhow!(message))
    }

    /// 503 Service Unavailable.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", message)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Error response body (JSON).
#[derive(Debug, Serialize)]
struct ErrorResponse {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            match &self.source {
                Some(source) => tracing::error!(
                    status = %self.status,
                    code = %self.code,
                    error = %source,
                    "Internal server error"
                ),
                None => tracing::error!(
                    status = %self.status,
                    code = %self.code,
                    message = %self.message,
                    "Internal server error"
                ),
            }
        }

        let body = ErrorResponse {
            code: self.code,
            message: self.message,
            details: self.details,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            "An internal error occurred",
        )
        .with_source(err)
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        Self::internal(err.to_string())
    }
}

impl From<RegistrationError> for AppError {
    fn from(err: RegistrationError) -> Self {
        let message = err.to_string();
        match err {
            RegistrationError::InvalidEventId(_) | RegistrationError::InvalidRegistrationId(_) => {
                Self::new(StatusCode::BAD_REQUEST, "INVALID_ID", message)
            },
            RegistrationError::InvalidQuantity(_) => {
                Self::new(StatusCode::BAD_REQUEST, "INVALID_QUANTITY", message)
            },
            RegistrationError::EventNotFound(_) => {
                Self::new(StatusCode::NOT_FOUND, "EVENT_NOT_FOUND", message)
            },
            RegistrationError::RegistrationNotFound(_) => {
                Self::new(StatusCode::NOT_FOUND, "REGISTRATION_NOT_FOUND", message)
            },
            RegistrationError::AlreadyRegistered(registration) => {
                Self::conflict("ALREADY_REGISTERED", message)
                    .with_details(json!({ "registration": registration }))
            },
            RegistrationError::AlreadyCancelled(_) => Self::conflict("ALREADY_CANCELLED", message),
            RegistrationError::TicketsAlreadyUsed(_) => {
                Self::conflict("TICKETS_ALREADY_USED", message)
            },
            RegistrationError::Unauthenticated => Self::unauthorized(message),
            RegistrationError::NotOwner => Self::new(StatusCode::FORBIDDEN, "NOT_OWNER", message),
            RegistrationError::Internal(cause) => Self::internal(cause),
        }
    }
}

impl From<ScanError> for AppError {
    fn from(err: ScanError) -> Self {
        let message = err.to_string();
        match err {
            ScanError::MissingCode => Self::new(StatusCode::BAD_REQUEST, "MISSING_CODE", message),
            ScanError::TicketNotFound => {
                Self::new(StatusCode::NOT_FOUND, "TICKET_NOT_FOUND", message)
            },
            ScanError::TicketCancelled { ticket_id } => {
                Self::new(StatusCode::FORBIDDEN, "TICKET_CANCELLED", message)
                    .with_details(json!({ "ticket_id": ticket_id }))
            },
            ScanError::QrExpired {
                ticket_id,
                expired_at,
            } => Self::new(StatusCode::FORBIDDEN, "QR_EXPIRED", message)
                .with_details(json!({ "ticket_id": ticket_id, "expired_at": expired_at })),
            ScanError::AlreadyUsed(attempt) => Self::conflict("TICKET_ALREADY_USED", message)
                .with_details(json!({
                    "ticket_id": attempt.ticket_id,
                    "event_id": attempt.event_id,
                    "attendee_name": attempt.attendee_name,
                    "scanned_at": attempt.scanned_at,
                    "scanned_by": attempt.scanned_by,
                    "current_attempt_by": attempt.current_attempt_by,
                    "attempted_at": attempt.attempted_at,
                    "reuse_alert": true,
                })),
            ScanError::Internal(cause) => Self::internal(cause),
        }
    }
}

impl From<TicketError> for AppError {
    fn from(err: TicketError) -> Self {
        let message = err.to_string();
        match err {
            TicketError::InvalidTicketId(_) => Self::new(StatusCode::BAD_REQUEST, "INVALID_ID", message),
            TicketError::TicketNotFound(_) => {
                Self::new(StatusCode::NOT_FOUND, "TICKET_NOT_FOUND", message)
            },
            TicketError::NotCancellable { id, status } => {
                Self::conflict("TICKET_NOT_CANCELLABLE", message)
                    .with_details(json!({ "ticket_id": id, "status": status }))
            },
            TicketError::NotRefreshable { id, status } => {
                Self::conflict("TICKET_NOT_REFRESHABLE", message)
                    .with_details(json!({ "ticket_id": id, "status": status }))
            },
            TicketError::NotOwner => Self::new(StatusCode::FORBIDDEN, "NOT_OWNER", message),
            TicketError::Render(cause) | TicketError::Internal(cause) => Self::internal(cause),
        }
    }
}

//! Outbound notifications (confirmation, waitlist, promotion, cancellation,
//! re-use alerts).
//!
//! Delivery is best-effort: the runtime retries failed deliveries with
//! backoff and then drops them with a log line and a counter. A notifier
//! error never reaches the caller of a registration or scan.

use crate::types::{EventId, RegistrationId, TicketId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;
use uuid::Uuid;

/// What happened.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// Seats reserved at registration time
    RegistrationConfirmed,
    /// Queued for seats
    RegistrationWaitlisted,
    /// Seats reserved through waitlist promotion
    PromotedFromWaitlist,
    /// Registration cancelled
    RegistrationCancelled,
    /// A used ticket was presented again
    TicketReuseAlert,
}

impl NotificationKind {
    /// Storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RegistrationConfirmed => "registration_confirmed",
            Self::RegistrationWaitlisted => "registration_waitlisted",
            Self::PromotedFromWaitlist => "promoted_from_waitlist",
            Self::RegistrationCancelled => "registration_cancelled",
            Self::TicketReuseAlert => "ticket_reuse_alert",
        }
    }
}

/// Who should receive a notification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "user_id", rename_all = "snake_case")]
pub enum Audience {
    /// A single user
    User(UserId),
    /// Platform administrators
    Administrators,
}

/// A notification ready for delivery.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Unique ID, stable across delivery retries
    pub id: Uuid,
    /// Kind
    pub kind: NotificationKind,
    /// Recipient
    pub audience: Audience,
    /// Related event
    pub event_id: EventId,
    /// Related registration
    pub registration_id: Option<RegistrationId>,
    /// Related ticket
    pub ticket_id: Option<TicketId>,
    /// Human-readable text
    pub message: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl Notification {
    /// New notification about an event.
    #[must_use]
    pub fn new(
        kind: NotificationKind,
        audience: Audience,
        event_id: EventId,
        message: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            audience,
            event_id,
            registration_id: None,
            ticket_id: None,
            message: message.into(),
            created_at,
        }
    }

    /// Attach the related registration.
    #[must_use]
    pub const fn with_registration(mut self, id: RegistrationId) -> Self {
        self.registration_id = Some(id);
        self
    }

    /// Attach the related ticket.
    #[must_use]
    pub const fn with_ticket(mut self, id: TicketId) -> Self {
        self.ticket_id = Some(id);
        self
    }
}

/// Delivery failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotifyError {
    /// Transport unavailable; worth retrying.
    #[error("Notification transport unavailable: {0}")]
    Unavailable(String),

    /// Permanently rejected; retrying will not help.
    #[error("Notification rejected: {0}")]
    Rejected(String),
}

impl NotifyError {
    /// Whether another attempt may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Notification sink.
pub trait Notifier: Send + Sync {
    /// Deliver one notification.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError`] when delivery fails.
    fn deliver(
        &self,
        notification: Notification,
    ) -> Pin<Box<dyn Future<Output = Result<(), NotifyError>> + Send + '_>>;
}

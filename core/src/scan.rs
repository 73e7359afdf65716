//! Gate-side ticket state machine.
//!
//! ```text
//!            scan, now <= qr_expires_at
//!   Valid ──────────────────────────────▶ Used ──scan──▶ AlreadyUsed (409, re-use alert)
//!     │  scan, now > qr_expires_at
//!     ├───────────────────────────────▶ Expired (403, no side effect)
//!     │  admin / registration cancel
//!     └───────────────────────────────▶ Cancelled ──scan──▶ Cancelled (403)
//! ```
//!
//! [`evaluate`] only decides. The `Valid → Used` write is a compare-and-swap
//! performed by the store; a caller that loses the race re-reads the ticket
//! and evaluates again, which yields [`ScanVerdict::AlreadyUsed`].

use crate::types::{EventId, Ticket, TicketId, TicketStatus, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Decision for a scan attempt against a ticket snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScanVerdict {
    /// Admit and mark used.
    Admit,
    /// Ticket was withdrawn.
    Cancelled,
    /// QR window closed before this scan.
    Expired {
        /// When the window closed
        expired_at: DateTime<Utc>,
    },
    /// Ticket was already scanned.
    AlreadyUsed {
        /// Original scan time
        scanned_at: Option<DateTime<Utc>>,
        /// Original scanner
        scanned_by: Option<UserId>,
    },
}

/// Apply the transition table to `ticket` at `now`.
///
/// Expiry is checked only for valid tickets, so an expired ticket is never
/// admitted, even on its first scan, while a used ticket always reports the
/// original admission.
#[must_use]
pub fn evaluate(ticket: &Ticket, now: DateTime<Utc>) -> ScanVerdict {
    match ticket.status {
        TicketStatus::Cancelled => ScanVerdict::Cancelled,
        TicketStatus::Used => ScanVerdict::AlreadyUsed {
            scanned_at: ticket.scanned_at,
            scanned_by: ticket.scanned_by,
        },
        TicketStatus::Valid if ticket.is_expired_at(now) => ScanVerdict::Expired {
            expired_at: ticket.qr_expires_at,
        },
        TicketStatus::Valid => ScanVerdict::Admit,
    }
}

/// Identity of whoever is holding the scanner.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scanner {
    /// Staff user ID
    pub user_id: UserId,
    /// Display name
    pub name: String,
}

/// Everything a gate agent needs to admit someone without further lookups.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmittedTicket {
    /// Ticket ID
    pub ticket_id: TicketId,
    /// Attendee name
    pub attendee_name: String,
    /// Attendee email
    pub attendee_email: String,
    /// Event ID
    pub event_id: EventId,
    /// Event title
    pub event_title: String,
    /// Event start
    pub event_starts_at: DateTime<Utc>,
    /// Venue
    pub event_location: String,
    /// Admission time
    pub scanned_at: DateTime<Utc>,
    /// Admitting staff member
    pub scanned_by: Scanner,
}

/// Context returned when a used ticket is presented again.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReuseAttempt {
    /// Ticket ID
    pub ticket_id: TicketId,
    /// Event ID
    pub event_id: EventId,
    /// Ticket holder
    pub attendee_name: String,
    /// Original admission time
    pub scanned_at: Option<DateTime<Utc>>,
    /// Original scanner
    pub scanned_by: Option<UserId>,
    /// Staff member presenting the ticket now
    pub current_attempt_by: Scanner,
    /// Time of this attempt
    pub attempted_at: DateTime<Utc>,
}

/// Scan failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScanError {
    /// Empty or absent code in the request.
    #[error("Scan code is required")]
    MissingCode,

    /// No ticket carries this code.
    #[error("Ticket not found")]
    TicketNotFound,

    /// Ticket was cancelled.
    #[error("Ticket {ticket_id} has been cancelled")]
    TicketCancelled {
        /// Ticket ID
        ticket_id: TicketId,
    },

    /// QR window closed.
    #[error("QR code for ticket {ticket_id} expired at {expired_at}")]
    QrExpired {
        /// Ticket ID
        ticket_id: TicketId,
        /// When the window closed
        expired_at: DateTime<Utc>,
    },

    /// Ticket was already used; possible re-use.
    #[error("Ticket {} was already used", .0.ticket_id)]
    AlreadyUsed(Box<ReuseAttempt>),

    /// Persistence failure.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<crate::error::StoreError> for ScanError {
    fn from(err: crate::error::StoreError) -> Self {
        Self::Internal(err.to_string())
    }
}

//! Error taxonomy for the registration engine and scan validator.
//!
//! Three layers:
//!
//! - [`StoreError`]: persistence failures reported by a [`RegistrationStore`](crate::store::RegistrationStore)
//! - [`RegistrationError`] / [`TicketError`]: what registration and ticket
//!   administration callers see
//! - [`ScanError`](crate::scan::ScanError): gate-side scan failures (lives next to the
//!   scan state machine)

use crate::types::{
    EventId, InvalidTransition, QuantityError, Registration, RegistrationId, TicketId,
    TicketStatus,
};
use thiserror::Error;

/// Errors raised by store implementations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Connection, query or transaction failure. The outcome of the write is
    /// unknown.
    #[error("Database error: {0}")]
    Database(String),

    /// A freshly generated scan code already exists. The whole unit of work
    /// was rolled back and may be retried with new codes.
    #[error("Scan code collision")]
    CodeCollision,

    /// Event does not exist.
    #[error("Event not found: {0}")]
    EventNotFound(EventId),

    /// Registration does not exist.
    #[error("Registration not found: {0}")]
    RegistrationNotFound(RegistrationId),

    /// Ticket does not exist.
    #[error("Ticket not found: {0}")]
    TicketNotFound(TicketId),

    /// A stored row violates a lifecycle rule.
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),

    /// A stored row could not be decoded.
    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

/// Errors surfaced by registration operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    /// Malformed event identifier.
    #[error("Invalid event id: {0}")]
    InvalidEventId(String),

    /// Malformed registration identifier.
    #[error("Invalid registration id: {0}")]
    InvalidRegistrationId(String),

    /// Event does not exist.
    #[error("Event not found: {0}")]
    EventNotFound(EventId),

    /// Quantity is not a positive integer or exceeds the configured limit.
    #[error("Invalid quantity: {0}")]
    InvalidQuantity(#[from] QuantityError),

    /// The user already holds a non-cancelled registration for this event.
    #[error("Already registered for this event")]
    AlreadyRegistered(Box<Registration>),

    /// No authenticated caller.
    #[error("Authentication required")]
    Unauthenticated,

    /// Registration does not exist.
    #[error("Registration not found: {0}")]
    RegistrationNotFound(RegistrationId),

    /// Caller neither owns the registration nor is an administrator.
    #[error("Registration belongs to another user")]
    NotOwner,

    /// Registration was already cancelled.
    #[error("Registration {0} is already cancelled")]
    AlreadyCancelled(RegistrationId),

    /// At least one ticket was already scanned, so the seats are in use.
    #[error("Registration {0} has tickets that were already used")]
    TicketsAlreadyUsed(RegistrationId),

    /// Persistence failure; the outcome is unknown and the caller should
    /// retry through the duplicate-check path.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for RegistrationError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::EventNotFound(id) => Self::EventNotFound(id),
            StoreError::RegistrationNotFound(id) => Self::RegistrationNotFound(id),
            other => Self::Internal(other.to_string()),
        }
    }
}

/// Errors surfaced by ticket administration (cancel, QR refresh, lookup).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TicketError {
    /// Malformed ticket identifier.
    #[error("Invalid ticket id: {0}")]
    InvalidTicketId(String),

    /// Ticket does not exist.
    #[error("Ticket not found: {0}")]
    TicketNotFound(TicketId),

    /// Only valid tickets can be cancelled.
    #[error("Ticket {id} is {status} and cannot be cancelled")]
    NotCancellable {
        /// Ticket ID
        id: TicketId,
        /// Current status
        status: TicketStatus,
    },

    /// Only valid tickets get a fresh QR.
    #[error("Ticket {id} is {status} and cannot be refreshed")]
    NotRefreshable {
        /// Ticket ID
        id: TicketId,
        /// Current status
        status: TicketStatus,
    },

    /// Caller neither holds the ticket nor has a staff role.
    #[error("Ticket belongs to another user")]
    NotOwner,

    /// QR rendering failed.
    #[error("QR rendering failed: {0}")]
    Render(String),

    /// Persistence failure.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for TicketError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::TicketNotFound(id) => Self::TicketNotFound(id),
            other => Self::Internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_not_found_maps_to_domain_not_found() {
        let event_id = EventId::new();
        assert_eq!(
            RegistrationError::from(StoreError::EventNotFound(event_id)),
            RegistrationError::EventNotFound(event_id)
        );

        let ticket_id = TicketId::new();
        assert_eq!(
            TicketError::from(StoreError::TicketNotFound(ticket_id)),
            TicketError::TicketNotFound(ticket_id)
        );
    }

    #[test]
    fn persistence_failures_become_internal() {
        let err = RegistrationError::from(StoreError::Database("connection reset".into()));
        assert_eq!(
            err,
            RegistrationError::Internal("Database error: connection reset".into())
        );
        assert!(matches!(
            RegistrationError::from(StoreError::CodeCollision),
            RegistrationError::Internal(_)
        ));
    }
}

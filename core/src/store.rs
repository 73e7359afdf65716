//! Persistence boundary for registrations, tickets and event capacity.
//!
//! Every write on this trait is one atomic unit. The capacity decision, the
//! registration row, ticket issuance and any waitlist promotion it causes all
//! commit together or not at all, and they are serialized per event by the
//! store itself (row lock, conditional update or a single mutex in tests).
//! In-process locking in callers is never relied upon.
//!
//! # Implementations
//!
//! - `PostgresRegistrationStore` (in `turnstile-postgres`): production
//! - `InMemoryRegistrationStore` (in `turnstile-testing`): fast, deterministic tests
//!
//! # Dyn Compatibility
//!
//! Methods return [`StoreFuture`] rather than using `async fn` so that the
//! store can be shared as `Arc<dyn RegistrationStore>` by the engine, the scan
//! validator and the HTTP layer.

use crate::error::StoreError;
use crate::issuance::TicketIssuer;
use crate::types::{
    EventId, EventSummary, Quantity, Registration, RegistrationId, ScanCode, Ticket, TicketId,
    UserId, UserProfile,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;

/// Boxed future returned by store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// A validated registration request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NewRegistration {
    /// Registering user
    pub user_id: UserId,
    /// Target event
    pub event_id: EventId,
    /// Seats requested
    pub quantity: Quantity,
}

/// Committed result of [`RegistrationStore::register`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// Seats reserved and tickets issued.
    Confirmed {
        /// New registration
        registration: Registration,
        /// One ticket per seat, in seat order
        tickets: Vec<Ticket>,
    },
    /// Not enough capacity; queued without seats.
    Waitlisted {
        /// New registration
        registration: Registration,
    },
    /// An active registration already exists; nothing was written.
    AlreadyRegistered {
        /// Existing registration
        registration: Registration,
    },
}

/// A waitlisted registration that was confirmed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Promotion {
    /// Registration after promotion
    pub registration: Registration,
    /// Newly issued tickets
    pub tickets: Vec<Ticket>,
}

/// Everything that changed when a registration was cancelled.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancellationReport {
    /// Registration after cancellation
    pub registration: Registration,
    /// Tickets moved from valid to cancelled
    pub cancelled_tickets: Vec<TicketId>,
    /// Seats returned to the event
    pub released_seats: u32,
    /// Waitlisted registrations confirmed with the released seats
    pub promotions: Vec<Promotion>,
}

/// Result of [`RegistrationStore::cancel_registration`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CancelOutcome {
    /// Cancelled in this call.
    Cancelled(CancellationReport),
    /// Nothing to do; the registration was cancelled earlier.
    AlreadyCancelled(Registration),
    /// Refused; at least one ticket was scanned.
    TicketsInUse(Registration),
}

/// Everything that changed when a registration was deleted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionReport {
    /// Registration as it was before deletion
    pub registration: Registration,
    /// Tickets removed with it
    pub deleted_tickets: Vec<TicketId>,
    /// Seats returned to the event
    pub released_seats: u32,
    /// Waitlisted registrations confirmed with the released seats
    pub promotions: Vec<Promotion>,
}

/// Result of [`RegistrationStore::cancel_ticket`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TicketCancelOutcome {
    /// Ticket moved from valid to cancelled.
    Cancelled(Ticket),
    /// Ticket was not valid; left untouched.
    Refused(Ticket),
}

/// A ticket with the attendee and event data needed at the gate.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketDetails {
    /// Ticket
    pub ticket: Ticket,
    /// Ticket holder
    pub attendee: UserProfile,
    /// Event
    pub event: EventSummary,
}

/// Storage for the registration and ticket lifecycle.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; one instance is shared by every
/// request handler.
pub trait RegistrationStore: Send + Sync {
    /// Look up an event.
    fn find_event(&self, id: EventId) -> StoreFuture<'_, Option<EventSummary>>;

    /// Look up a user profile.
    fn find_user(&self, id: UserId) -> StoreFuture<'_, Option<UserProfile>>;

    /// Look up a registration with its ticket ids.
    fn find_registration(&self, id: RegistrationId) -> StoreFuture<'_, Option<Registration>>;

    /// All registrations of a user, newest first.
    fn registrations_for_user(&self, user_id: UserId) -> StoreFuture<'_, Vec<Registration>>;

    /// Waitlisted registrations of an event in promotion order (oldest first).
    fn waitlist(&self, event_id: EventId) -> StoreFuture<'_, Vec<Registration>>;

    /// Tickets of a registration in seat order.
    fn tickets_for_registration(&self, id: RegistrationId) -> StoreFuture<'_, Vec<Ticket>>;

    /// Look up a ticket.
    fn find_ticket(&self, id: TicketId) -> StoreFuture<'_, Option<Ticket>>;

    /// Look up a ticket by scan code, joined with attendee and event.
    fn ticket_details_by_code(&self, code: ScanCode) -> StoreFuture<'_, Option<TicketDetails>>;

    /// Reserve seats or waitlist, atomically.
    ///
    /// Within one atomic scope: check for an active registration of
    /// (user, event), re-read capacity, then either decrement it, record the
    /// user as registered, create a confirmed registration and let `issuer`
    /// create its tickets, or create a waitlisted registration.
    ///
    /// # Errors
    ///
    /// - `EventNotFound`: unknown event
    /// - `CodeCollision`: an issued code already exists; nothing was written
    /// - `Database`: outcome unknown
    fn register<'a>(
        &'a self,
        request: NewRegistration,
        issuer: &'a TicketIssuer,
    ) -> StoreFuture<'a, RegisterOutcome>;

    /// Cancel a registration, return its seats and promote the waitlist.
    ///
    /// For a confirmed registration every valid ticket is cancelled, the
    /// quantity goes back to capacity, the user leaves the event's
    /// registered set, and first-fit promotion runs on the new capacity, all
    /// in one atomic scope. Registrations with a used ticket are refused.
    ///
    /// # Errors
    ///
    /// - `RegistrationNotFound`: unknown registration
    /// - `CodeCollision`: a promotion's code collided; nothing was written
    /// - `Database`: outcome unknown
    fn cancel_registration<'a>(
        &'a self,
        id: RegistrationId,
        issuer: &'a TicketIssuer,
    ) -> StoreFuture<'a, CancelOutcome>;

    /// Delete a registration and its tickets, returning held seats and
    /// promoting the waitlist in the same atomic scope.
    ///
    /// # Errors
    ///
    /// - `RegistrationNotFound`: unknown registration
    /// - `CodeCollision`, `Database`: as for [`Self::register`]
    fn delete_registration<'a>(
        &'a self,
        id: RegistrationId,
        issuer: &'a TicketIssuer,
    ) -> StoreFuture<'a, DeletionReport>;

    /// Re-read capacity and promote first-fit FIFO.
    ///
    /// # Errors
    ///
    /// - `EventNotFound`: unknown event
    /// - `CodeCollision`, `Database`: as for [`Self::register`]
    fn promote_waitlist<'a>(
        &'a self,
        event_id: EventId,
        issuer: &'a TicketIssuer,
    ) -> StoreFuture<'a, Vec<Promotion>>;

    /// Compare-and-swap a ticket from valid to used.
    ///
    /// Succeeds only if the ticket is still valid and `at` is within its QR
    /// window. Returns the updated ticket, or `None` when the condition no
    /// longer holds (another scan won, or the ticket changed state); callers
    /// re-read and re-evaluate.
    ///
    /// # Errors
    ///
    /// - `Database`: outcome unknown
    fn mark_ticket_used(
        &self,
        id: TicketId,
        at: DateTime<Utc>,
        scanned_by: UserId,
    ) -> StoreFuture<'_, Option<Ticket>>;

    /// Compare-and-swap a ticket from valid to cancelled. Capacity is not
    /// touched.
    ///
    /// # Errors
    ///
    /// - `TicketNotFound`: unknown ticket
    /// - `Database`: outcome unknown
    fn cancel_ticket(&self, id: TicketId) -> StoreFuture<'_, TicketCancelOutcome>;

    /// Store a rendered QR on a valid ticket, optionally moving its expiry.
    ///
    /// Returns `false` when the ticket is missing or no longer valid.
    ///
    /// # Errors
    ///
    /// - `Database`: outcome unknown
    fn attach_qr(
        &self,
        id: TicketId,
        data_url: String,
        expires_at: Option<DateTime<Utc>>,
    ) -> StoreFuture<'_, bool>;

    /// Readiness probe.
    ///
    /// # Errors
    ///
    /// - `Database`: store unreachable
    fn ping(&self) -> StoreFuture<'_, ()>;
}

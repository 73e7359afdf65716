//! In-memory registration store.
//!
//! Every operation runs under one mutex and mutates a draft copy of the whole
//! state, which replaces the live state only when the operation succeeds. That
//! gives the same all-or-nothing and per-event serialization guarantees as the
//! `PostgreSQL` store, so engine tests exercise the real contract.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Panics only on mutex poisoning

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use turnstile_core::capacity::{Admission, admit, plan_promotions};
use turnstile_core::error::StoreError;
use turnstile_core::issuance::TicketIssuer;
use turnstile_core::store::{
    CancelOutcome, CancellationReport, DeletionReport, NewRegistration, Promotion,
    RegisterOutcome, RegistrationStore, StoreFuture, TicketCancelOutcome, TicketDetails,
};
use turnstile_core::types::{
    EventId, EventSummary, Registration, RegistrationId, RegistrationStatus, ScanCode, Ticket,
    TicketId, TicketStatus, UserId, UserProfile,
};
use turnstile_core::{DateTime, Utc};

#[derive(Clone, Debug, Default)]
struct State {
    events: HashMap<EventId, EventSummary>,
    attendees: HashMap<EventId, BTreeSet<UserId>>,
    users: HashMap<UserId, UserProfile>,
    registrations: HashMap<RegistrationId, Registration>,
    tickets: HashMap<TicketId, Ticket>,
    by_code: HashMap<String, TicketId>,
    // never shrinks: codes stay reserved after their ticket is deleted
    issued_codes: HashSet<String>,
}

impl State {
    fn event_mut(&mut self, id: EventId) -> Result<&mut EventSummary, StoreError> {
        self.events
            .get_mut(&id)
            .ok_or(StoreError::EventNotFound(id))
    }

    fn active_registration(&self, user_id: UserId, event_id: EventId) -> Option<&Registration> {
        self.registrations
            .values()
            .find(|r| r.user_id == user_id && r.event_id == event_id && r.is_active())
    }

    fn tickets_of(&self, id: RegistrationId) -> Vec<Ticket> {
        let mut tickets: Vec<Ticket> = self
            .tickets
            .values()
            .filter(|t| t.registration_id == id)
            .cloned()
            .collect();
        tickets.sort_by_key(|t| t.seat_index);
        tickets
    }

    fn insert_tickets(&mut self, tickets: &[Ticket]) -> Result<(), StoreError> {
        for ticket in tickets {
            if !self.issued_codes.insert(ticket.code.as_str().to_string()) {
                return Err(StoreError::CodeCollision);
            }
            self.by_code
                .insert(ticket.code.as_str().to_string(), ticket.id);
            self.tickets.insert(ticket.id, ticket.clone());
        }
        Ok(())
    }

    fn release_seats(&mut self, registration: &Registration) -> Result<u32, StoreError> {
        if registration.status != RegistrationStatus::Confirmed {
            return Ok(0);
        }
        let seats = registration.quantity.get();
        let event = self.event_mut(registration.event_id)?;
        event.capacity = event.capacity.saturating_add(seats);
        if let Some(set) = self.attendees.get_mut(&registration.event_id) {
            set.remove(&registration.user_id);
        }
        Ok(seats)
    }

    fn promote(
        &mut self,
        event_id: EventId,
        issuer: &TicketIssuer,
    ) -> Result<Vec<Promotion>, StoreError> {
        let capacity = self.event_mut(event_id)?.capacity;
        let plan = plan_promotions(
            capacity,
            self.registrations
                .values()
                .filter(|r| r.event_id == event_id),
        );

        let now = issuer.now();
        let mut promotions = Vec::with_capacity(plan.promoted.len());
        for id in plan.promoted {
            let mut registration = self
                .registrations
                .get(&id)
                .cloned()
                .ok_or(StoreError::RegistrationNotFound(id))?;
            registration.transition(RegistrationStatus::Confirmed, now)?;
            let tickets = issuer.issue(&mut registration);
            self.insert_tickets(&tickets)?;
            self.attendees
                .entry(event_id)
                .or_default()
                .insert(registration.user_id);
            self.registrations.insert(id, registration.clone());
            promotions.push(Promotion {
                registration,
                tickets,
            });
        }

        self.event_mut(event_id)?.capacity = plan.remaining;
        Ok(promotions)
    }
}

/// In-memory [`RegistrationStore`] for fast, deterministic testing.
///
/// # Example
///
/// ```
/// use turnstile_testing::{InMemoryRegistrationStore, fixtures};
///
/// let store = InMemoryRegistrationStore::new();
/// let event = fixtures::event("Hack Night", 1);
/// store.insert_event(event.clone());
/// assert!(store.registered_users(event.id).is_empty());
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryRegistrationStore {
    state: Arc<Mutex<State>>,
    failures: Arc<Mutex<VecDeque<StoreError>>>,
    offline: Arc<AtomicBool>,
}

impl InMemoryRegistrationStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an event.
    pub fn insert_event(&self, event: EventSummary) {
        let mut state = self.state.lock().unwrap();
        state.attendees.entry(event.id).or_default();
        state.events.insert(event.id, event);
    }

    /// Seed a user.
    pub fn insert_user(&self, user: UserProfile) {
        self.state.lock().unwrap().users.insert(user.id, user);
    }

    /// Overwrite an event's capacity, as the event-management collaborator would.
    pub fn set_capacity(&self, event_id: EventId, capacity: u32) {
        if let Some(event) = self.state.lock().unwrap().events.get_mut(&event_id) {
            event.capacity = capacity;
        }
    }

    /// Current capacity of an event.
    #[must_use]
    pub fn capacity(&self, event_id: EventId) -> Option<u32> {
        self.state
            .lock()
            .unwrap()
            .events
            .get(&event_id)
            .map(|e| e.capacity)
    }

    /// Users currently holding confirmed seats for an event.
    #[must_use]
    pub fn registered_users(&self, event_id: EventId) -> Vec<UserId> {
        self.state
            .lock()
            .unwrap()
            .attendees
            .get(&event_id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Every registration for an event, any status.
    #[must_use]
    pub fn registrations_for_event(&self, event_id: EventId) -> Vec<Registration> {
        let mut registrations: Vec<Registration> = self
            .state
            .lock()
            .unwrap()
            .registrations
            .values()
            .filter(|r| r.event_id == event_id)
            .cloned()
            .collect();
        registrations.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        registrations
    }

    /// Snapshot of one ticket.
    #[must_use]
    pub fn ticket(&self, id: TicketId) -> Option<Ticket> {
        self.state.lock().unwrap().tickets.get(&id).cloned()
    }

    /// Number of tickets currently stored.
    #[must_use]
    pub fn ticket_count(&self) -> usize {
        self.state.lock().unwrap().tickets.len()
    }

    /// Make the next write fail with `error` before touching any state.
    pub fn fail_next_write(&self, error: StoreError) {
        self.failures.lock().unwrap().push_back(error);
    }

    /// Make [`RegistrationStore::ping`] fail until switched back.
    pub fn set_unavailable(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Verify the cross-record invariants.
    ///
    /// # Errors
    ///
    /// Describes the first violated invariant.
    pub fn check_invariants(&self) -> Result<(), String> {
        let state = self.state.lock().unwrap();

        let mut active = HashSet::new();
        for registration in state.registrations.values() {
            if registration.is_active()
                && !active.insert((registration.user_id, registration.event_id))
            {
                return Err(format!(
                    "user {} holds two active registrations for event {}",
                    registration.user_id, registration.event_id
                ));
            }

            let expected = match registration.status {
                RegistrationStatus::Waitlisted => 0,
                _ => registration.quantity.get() as usize,
            };
            if registration.tickets_issued() != expected
                && registration.status != RegistrationStatus::Cancelled
            {
                return Err(format!(
                    "registration {} ({}) has {} tickets, expected {expected}",
                    registration.id,
                    registration.status,
                    registration.tickets_issued()
                ));
            }

            for ticket_id in &registration.ticket_ids {
                match state.tickets.get(ticket_id) {
                    Some(ticket) if ticket.registration_id == registration.id => {},
                    Some(_) => return Err(format!("ticket {ticket_id} points elsewhere")),
                    None => return Err(format!("ticket {ticket_id} is missing")),
                }
            }
        }

        for ticket in state.tickets.values() {
            let linked = state
                .registrations
                .get(&ticket.registration_id)
                .is_some_and(|r| r.ticket_ids.contains(&ticket.id));
            if !linked {
                return Err(format!("ticket {} is orphaned", ticket.id));
            }
        }

        Ok(())
    }

    fn read<T>(&self, f: impl FnOnce(&State) -> T) -> T {
        f(&self.state.lock().unwrap())
    }

    fn write<T>(
        &self,
        f: impl FnOnce(&mut State) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        if let Some(error) = self.failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        let mut live = self.state.lock().unwrap();
        let mut draft = live.clone();
        let out = f(&mut draft)?;
        *live = draft;
        Ok(out)
    }
}

impl RegistrationStore for InMemoryRegistrationStore {
    fn find_event(&self, id: EventId) -> StoreFuture<'_, Option<EventSummary>> {
        Box::pin(async move { Ok(self.read(|s| s.events.get(&id).cloned())) })
    }

    fn find_user(&self, id: UserId) -> StoreFuture<'_, Option<UserProfile>> {
        Box::pin(async move { Ok(self.read(|s| s.users.get(&id).cloned())) })
    }

    fn find_registration(&self, id: RegistrationId) -> StoreFuture<'_, Option<Registration>> {
        Box::pin(async move { Ok(self.read(|s| s.registrations.get(&id).cloned())) })
    }

    fn registrations_for_user(&self, user_id: UserId) -> StoreFuture<'_, Vec<Registration>> {
        Box::pin(async move {
            let mut registrations: Vec<Registration> = self.read(|s| {
                s.registrations
                    .values()
                    .filter(|r| r.user_id == user_id)
                    .cloned()
                    .collect()
            });
            registrations.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
            Ok(registrations)
        })
    }

    fn waitlist(&self, event_id: EventId) -> StoreFuture<'_, Vec<Registration>> {
        Box::pin(async move {
            Ok(self
                .registrations_for_event(event_id)
                .into_iter()
                .filter(|r| r.status == RegistrationStatus::Waitlisted)
                .collect())
        })
    }

    fn tickets_for_registration(&self, id: RegistrationId) -> StoreFuture<'_, Vec<Ticket>> {
        Box::pin(async move { Ok(self.read(|s| s.tickets_of(id))) })
    }

    fn find_ticket(&self, id: TicketId) -> StoreFuture<'_, Option<Ticket>> {
        Box::pin(async move { Ok(self.ticket(id)) })
    }

    fn ticket_details_by_code(&self, code: ScanCode) -> StoreFuture<'_, Option<TicketDetails>> {
        Box::pin(async move {
            self.read(|s| {
                let Some(ticket) = s
                    .by_code
                    .get(code.as_str())
                    .and_then(|id| s.tickets.get(id))
                else {
                    return Ok(None);
                };
                let attendee = s.users.get(&ticket.user_id).cloned().ok_or_else(|| {
                    StoreError::Corrupt(format!("ticket {} has no user", ticket.id))
                })?;
                let event = s
                    .events
                    .get(&ticket.event_id)
                    .cloned()
                    .ok_or(StoreError::EventNotFound(ticket.event_id))?;
                Ok(Some(TicketDetails {
                    ticket: ticket.clone(),
                    attendee,
                    event,
                }))
            })
        })
    }

    fn register<'a>(
        &'a self,
        request: NewRegistration,
        issuer: &'a TicketIssuer,
    ) -> StoreFuture<'a, RegisterOutcome> {
        Box::pin(async move {
            self.write(|s| {
                let capacity = s.event_mut(request.event_id)?.capacity;
                if let Some(existing) = s.active_registration(request.user_id, request.event_id) {
                    return Ok(RegisterOutcome::AlreadyRegistered {
                        registration: existing.clone(),
                    });
                }

                let now = issuer.now();
                match admit(capacity, request.quantity) {
                    Admission::Confirm { remaining } => {
                        let mut registration = Registration::new(
                            request.user_id,
                            request.event_id,
                            request.quantity,
                            RegistrationStatus::Confirmed,
                            now,
                        );
                        let tickets = issuer.issue(&mut registration);
                        s.insert_tickets(&tickets)?;
                        s.event_mut(request.event_id)?.capacity = remaining;
                        s.attendees
                            .entry(request.event_id)
                            .or_default()
                            .insert(request.user_id);
                        s.registrations
                            .insert(registration.id, registration.clone());
                        Ok(RegisterOutcome::Confirmed {
                            registration,
                            tickets,
                        })
                    },
                    Admission::Waitlist { .. } => {
                        let registration = Registration::new(
                            request.user_id,
                            request.event_id,
                            request.quantity,
                            RegistrationStatus::Waitlisted,
                            now,
                        );
                        s.registrations
                            .insert(registration.id, registration.clone());
                        Ok(RegisterOutcome::Waitlisted { registration })
                    },
                }
            })
        })
    }

    fn cancel_registration<'a>(
        &'a self,
        id: RegistrationId,
        issuer: &'a TicketIssuer,
    ) -> StoreFuture<'a, CancelOutcome> {
        Box::pin(async move {
            self.write(|s| {
                let mut registration = s
                    .registrations
                    .get(&id)
                    .cloned()
                    .ok_or(StoreError::RegistrationNotFound(id))?;

                if registration.status == RegistrationStatus::Cancelled {
                    return Ok(CancelOutcome::AlreadyCancelled(registration));
                }
                let tickets = s.tickets_of(id);
                if tickets.iter().any(|t| t.status == TicketStatus::Used) {
                    return Ok(CancelOutcome::TicketsInUse(registration));
                }

                let released_seats = s.release_seats(&registration)?;
                registration.transition(RegistrationStatus::Cancelled, issuer.now())?;
                s.registrations.insert(id, registration.clone());

                let mut cancelled_tickets = Vec::new();
                for mut ticket in tickets {
                    if ticket.status == TicketStatus::Valid {
                        ticket.transition(TicketStatus::Cancelled)?;
                        cancelled_tickets.push(ticket.id);
                        s.tickets.insert(ticket.id, ticket);
                    }
                }

                let promotions = if released_seats > 0 {
                    s.promote(registration.event_id, issuer)?
                } else {
                    Vec::new()
                };

                Ok(CancelOutcome::Cancelled(CancellationReport {
                    registration,
                    cancelled_tickets,
                    released_seats,
                    promotions,
                }))
            })
        })
    }

    fn delete_registration<'a>(
        &'a self,
        id: RegistrationId,
        issuer: &'a TicketIssuer,
    ) -> StoreFuture<'a, DeletionReport> {
        Box::pin(async move {
            self.write(|s| {
                let registration = s
                    .registrations
                    .remove(&id)
                    .ok_or(StoreError::RegistrationNotFound(id))?;

                let deleted_tickets: Vec<TicketId> =
                    s.tickets_of(id).into_iter().map(|t| t.id).collect();
                for ticket_id in &deleted_tickets {
                    if let Some(ticket) = s.tickets.remove(ticket_id) {
                        s.by_code.remove(ticket.code.as_str());
                    }
                }

                let released_seats = s.release_seats(&registration)?;
                let promotions = if released_seats > 0 {
                    s.promote(registration.event_id, issuer)?
                } else {
                    Vec::new()
                };

                Ok(DeletionReport {
                    registration,
                    deleted_tickets,
                    released_seats,
                    promotions,
                })
            })
        })
    }

    fn promote_waitlist<'a>(
        &'a self,
        event_id: EventId,
        issuer: &'a TicketIssuer,
    ) -> StoreFuture<'a, Vec<Promotion>> {
        Box::pin(async move { self.write(|s| s.promote(event_id, issuer)) })
    }

    fn mark_ticket_used(
        &self,
        id: TicketId,
        at: DateTime<Utc>,
        scanned_by: UserId,
    ) -> StoreFuture<'_, Option<Ticket>> {
        Box::pin(async move {
            self.write(|s| {
                let Some(ticket) = s.tickets.get_mut(&id) else {
                    return Ok(None);
                };
                if ticket.status != TicketStatus::Valid || ticket.is_expired_at(at) {
                    return Ok(None);
                }
                ticket.transition(TicketStatus::Used)?;
                ticket.scanned_at = Some(at);
                ticket.scanned_by = Some(scanned_by);
                Ok(Some(ticket.clone()))
            })
        })
    }

    fn cancel_ticket(&self, id: TicketId) -> StoreFuture<'_, TicketCancelOutcome> {
        Box::pin(async move {
            self.write(|s| {
                let ticket = s
                    .tickets
                    .get_mut(&id)
                    .ok_or(StoreError::TicketNotFound(id))?;
                if ticket.status != TicketStatus::Valid {
                    return Ok(TicketCancelOutcome::Refused(ticket.clone()));
                }
                ticket.transition(TicketStatus::Cancelled)?;
                Ok(TicketCancelOutcome::Cancelled(ticket.clone()))
            })
        })
    }

    fn attach_qr(
        &self,
        id: TicketId,
        data_url: String,
        expires_at: Option<DateTime<Utc>>,
    ) -> StoreFuture<'_, bool> {
        Box::pin(async move {
            self.write(|s| match s.tickets.get_mut(&id) {
                Some(ticket) if ticket.status == TicketStatus::Valid => {
                    ticket.qr_data_url = Some(data_url);
                    if let Some(expires_at) = expires_at {
                        ticket.qr_expires_at = expires_at;
                    }
                    Ok(true)
                },
                _ => Ok(false),
            })
        })
    }

    fn ping(&self) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            if self.offline.load(Ordering::SeqCst) {
                return Err(StoreError::Database("store offline".into()));
            }
            Ok(())
        })
    }
}

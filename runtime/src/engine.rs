//! Registration engine and waitlist promoter.
//!
//! The engine validates input, hands each unit of work to the
//! [`RegistrationStore`] as one atomic write, and schedules the post-commit
//! follow-ups (QR rendering, notifications). It holds no locks of its own:
//! capacity is re-read and changed inside the store's transaction, so any
//! number of engine instances can serve the same events.
//!
//! # Example
//!
//! ```ignore
//! let request = engine.validate(Some(principal.user_id), &event_id, body.quantity.as_ref())?;
//! match engine.register(request).await? {
//!     Registered::Confirmed { tickets, .. } => println!("{} tickets", tickets.len()),
//!     Registered::Waitlisted { .. } => println!("waitlisted"),
//! }
//! ```

use crate::followup::FollowUps;
use crate::metrics::RegistrationMetrics;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use turnstile_core::directory::Principal;
use turnstile_core::error::{RegistrationError, StoreError, TicketError};
use turnstile_core::issuance::TicketIssuer;
use turnstile_core::notification::{Audience, Notification, NotificationKind};
use turnstile_core::store::{
    CancelOutcome, CancellationReport, DeletionReport, NewRegistration, Promotion,
    RegisterOutcome, RegistrationStore, TicketCancelOutcome,
};
use turnstile_core::types::{
    EventId, Quantity, Registration, RegistrationId, RegistrationStatus, Ticket, TicketId,
    TicketStatus, UserId,
};

/// Default number of attempts when freshly generated codes collide.
pub const DEFAULT_CODE_ATTEMPTS: u32 = 5;

/// Engine tuning.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    /// Largest quantity a single registration may request (`None` = no limit)
    pub max_quantity: Option<u32>,
    /// Attempts per unit of work before a code collision is reported
    pub code_attempts: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_quantity: None,
            code_attempts: DEFAULT_CODE_ATTEMPTS,
        }
    }
}

/// Successful registration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Registered {
    /// Seats reserved and tickets issued.
    Confirmed {
        /// New registration
        registration: Registration,
        /// One ticket per seat
        tickets: Vec<Ticket>,
    },
    /// Queued without seats.
    Waitlisted {
        /// New registration
        registration: Registration,
    },
}

impl Registered {
    /// The new registration.
    #[must_use]
    pub const fn registration(&self) -> &Registration {
        match self {
            Self::Confirmed { registration, .. } | Self::Waitlisted { registration } => {
                registration
            },
        }
    }
}

/// A registration with its tickets.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RegistrationView {
    /// Registration
    pub registration: Registration,
    /// Tickets in seat order
    pub tickets: Vec<Ticket>,
}

/// Registration lifecycle operations.
pub struct RegistrationEngine {
    store: Arc<dyn RegistrationStore>,
    issuer: TicketIssuer,
    followups: FollowUps,
    config: EngineConfig,
}

impl RegistrationEngine {
    /// Create an engine with default configuration.
    #[must_use]
    pub fn new(store: Arc<dyn RegistrationStore>, issuer: TicketIssuer, followups: FollowUps) -> Self {
        Self {
            store,
            issuer,
            followups,
            config: EngineConfig::default(),
        }
    }

    /// Replace the configuration.
    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Ticket issuer (codes, clock, QR TTL).
    #[must_use]
    pub const fn issuer(&self) -> &TicketIssuer {
        &self.issuer
    }

    /// Background follow-up executor.
    #[must_use]
    pub const fn followups(&self) -> &FollowUps {
        &self.followups
    }

    /// Turn raw request input into a [`NewRegistration`].
    ///
    /// A missing quantity means one seat.
    ///
    /// # Errors
    ///
    /// - `Unauthenticated`: no caller
    /// - `InvalidEventId`: `event_id` is not a UUID
    /// - `InvalidQuantity`: not a positive integer, or above the configured limit
    pub fn validate(
        &self,
        caller: Option<UserId>,
        event_id: &str,
        quantity: Option<&serde_json::Value>,
    ) -> Result<NewRegistration, RegistrationError> {
        let user_id = caller.ok_or(RegistrationError::Unauthenticated)?;
        let event_id = EventId::parse(event_id.trim())
            .map_err(|_| RegistrationError::InvalidEventId(event_id.to_string()))?;
        let quantity = match quantity {
            None | Some(serde_json::Value::Null) => Quantity::ONE,
            Some(raw) => Quantity::from_json(raw)?,
        }
        .within(self.config.max_quantity)?;

        Ok(NewRegistration {
            user_id,
            event_id,
            quantity,
        })
    }

    /// Reserve seats or join the waitlist.
    ///
    /// # Errors
    ///
    /// - `EventNotFound`: unknown event
    /// - `AlreadyRegistered`: carries the existing registration; nothing changed
    /// - `Internal`: persistence failed and the outcome is unknown
    pub async fn register(&self, request: NewRegistration) -> Result<Registered, RegistrationError> {
        let started = Instant::now();
        let outcome = with_fresh_codes(self.config.code_attempts, "register", || {
            self.store.register(request, &self.issuer)
        })
        .await;

        match outcome {
            Ok(RegisterOutcome::Confirmed {
                registration,
                tickets,
            }) => {
                RegistrationMetrics::record("confirmed", started.elapsed());
                RegistrationMetrics::record_tickets(tickets.len());
                tracing::info!(
                    registration_id = %registration.id,
                    user_id = %registration.user_id,
                    event_id = %registration.event_id,
                    quantity = registration.quantity.get(),
                    "Registration confirmed"
                );
                self.followups.render_qr(tickets.clone());
                self.notify_user(
                    &registration,
                    NotificationKind::RegistrationConfirmed,
                    format!(
                        "Your registration is confirmed with {} ticket(s).",
                        tickets.len()
                    ),
                );
                Ok(Registered::Confirmed {
                    registration,
                    tickets,
                })
            },
            Ok(RegisterOutcome::Waitlisted { registration }) => {
                RegistrationMetrics::record("waitlisted", started.elapsed());
                tracing::info!(
                    registration_id = %registration.id,
                    user_id = %registration.user_id,
                    event_id = %registration.event_id,
                    quantity = registration.quantity.get(),
                    "Registration waitlisted"
                );
                self.notify_user(
                    &registration,
                    NotificationKind::RegistrationWaitlisted,
                    format!(
                        "The event is full. You are on the waitlist for {} seat(s).",
                        registration.quantity
                    ),
                );
                Ok(Registered::Waitlisted { registration })
            },
            Ok(RegisterOutcome::AlreadyRegistered { registration }) => {
                RegistrationMetrics::record("duplicate", started.elapsed());
                tracing::debug!(registration_id = %registration.id, "Duplicate registration");
                Err(RegistrationError::AlreadyRegistered(Box::new(registration)))
            },
            Err(e) => {
                RegistrationMetrics::record("failed", started.elapsed());
                tracing::error!(
                    user_id = %request.user_id,
                    event_id = %request.event_id,
                    error = %e,
                    "Registration failed"
                );
                Err(e.into())
            },
        }
    }

    /// Cancel a registration on behalf of its owner or an administrator.
    ///
    /// # Errors
    ///
    /// - `RegistrationNotFound`, `NotOwner`
    /// - `AlreadyCancelled`, `TicketsAlreadyUsed`
    /// - `Internal`: persistence failed
    pub async fn cancel(
        &self,
        caller: &Principal,
        id: RegistrationId,
    ) -> Result<CancellationReport, RegistrationError> {
        let registration = self.owned_registration(caller, id).await?;
        if registration.status == RegistrationStatus::Cancelled {
            return Err(RegistrationError::AlreadyCancelled(id));
        }

        let outcome = with_fresh_codes(self.config.code_attempts, "cancel_registration", || {
            self.store.cancel_registration(id, &self.issuer)
        })
        .await?;

        match outcome {
            CancelOutcome::Cancelled(report) => {
                tracing::info!(
                    registration_id = %id,
                    cancelled_by = %caller.user_id,
                    released_seats = report.released_seats,
                    tickets_cancelled = report.cancelled_tickets.len(),
                    promoted = report.promotions.len(),
                    "Registration cancelled"
                );
                self.notify_user(
                    &report.registration,
                    NotificationKind::RegistrationCancelled,
                    "Your registration has been cancelled.".to_string(),
                );
                self.after_promotion(&report.promotions);
                Ok(report)
            },
            CancelOutcome::AlreadyCancelled(_) => Err(RegistrationError::AlreadyCancelled(id)),
            CancelOutcome::TicketsInUse(_) => {
                tracing::info!(registration_id = %id, "Cancellation refused: tickets already used");
                Err(RegistrationError::TicketsAlreadyUsed(id))
            },
        }
    }

    /// Remove a registration and its tickets (administrative).
    ///
    /// # Errors
    ///
    /// - `RegistrationNotFound`
    /// - `Internal`: persistence failed
    pub async fn delete(&self, id: RegistrationId) -> Result<DeletionReport, RegistrationError> {
        let report = with_fresh_codes(self.config.code_attempts, "delete_registration", || {
            self.store.delete_registration(id, &self.issuer)
        })
        .await?;

        tracing::info!(
            registration_id = %id,
            tickets_deleted = report.deleted_tickets.len(),
            released_seats = report.released_seats,
            promoted = report.promotions.len(),
            "Registration deleted"
        );
        self.after_promotion(&report.promotions);
        Ok(report)
    }

    /// Promote waitlisted registrations into whatever capacity is free now.
    ///
    /// # Errors
    ///
    /// - `EventNotFound`
    /// - `Internal`: persistence failed
    pub async fn promote_waitlist(&self, event_id: EventId) -> Result<Vec<Promotion>, RegistrationError> {
        let promotions = with_fresh_codes(self.config.code_attempts, "promote_waitlist", || {
            self.store.promote_waitlist(event_id, &self.issuer)
        })
        .await?;

        tracing::info!(event_id = %event_id, promoted = promotions.len(), "Waitlist promotion ran");
        self.after_promotion(&promotions);
        Ok(promotions)
    }

    /// One registration with its tickets, for its owner or an administrator.
    ///
    /// # Errors
    ///
    /// - `RegistrationNotFound`, `NotOwner`
    /// - `Internal`: persistence failed
    pub async fn registration(
        &self,
        caller: &Principal,
        id: RegistrationId,
    ) -> Result<RegistrationView, RegistrationError> {
        let registration = self.owned_registration(caller, id).await?;
        let tickets = self.store.tickets_for_registration(id).await?;
        Ok(RegistrationView {
            registration,
            tickets,
        })
    }

    /// A user's registrations with tickets, newest first.
    ///
    /// # Errors
    ///
    /// - `Internal`: persistence failed
    pub async fn registrations_for(
        &self,
        user_id: UserId,
    ) -> Result<Vec<RegistrationView>, RegistrationError> {
        let registrations = self.store.registrations_for_user(user_id).await?;
        let mut views = Vec::with_capacity(registrations.len());
        for registration in registrations {
            let tickets = self.store.tickets_for_registration(registration.id).await?;
            views.push(RegistrationView {
                registration,
                tickets,
            });
        }
        Ok(views)
    }

    /// Waitlisted registrations of an event in promotion order.
    ///
    /// # Errors
    ///
    /// - `EventNotFound`
    /// - `Internal`: persistence failed
    pub async fn waitlist(&self, event_id: EventId) -> Result<Vec<Registration>, RegistrationError> {
        if self.store.find_event(event_id).await?.is_none() {
            return Err(RegistrationError::EventNotFound(event_id));
        }
        Ok(self.store.waitlist(event_id).await?)
    }

    /// A ticket, for its holder or any staff member.
    ///
    /// # Errors
    ///
    /// - `TicketNotFound`, `NotOwner`
    /// - `Internal`: persistence failed
    pub async fn ticket(&self, caller: &Principal, id: TicketId) -> Result<Ticket, TicketError> {
        let ticket = self.find_ticket(id).await?;
        if !(caller.role.is_staff() || caller.acts_for(ticket.user_id)) {
            return Err(TicketError::NotOwner);
        }
        Ok(ticket)
    }

    /// Withdraw a single valid ticket. Capacity is unchanged.
    ///
    /// # Errors
    ///
    /// - `TicketNotFound`
    /// - `NotCancellable`: the ticket is used or already cancelled
    /// - `Internal`: persistence failed
    pub async fn cancel_ticket(&self, id: TicketId) -> Result<Ticket, TicketError> {
        match self.store.cancel_ticket(id).await? {
            TicketCancelOutcome::Cancelled(ticket) => {
                tracing::info!(ticket_id = %id, registration_id = %ticket.registration_id, "Ticket cancelled");
                Ok(ticket)
            },
            TicketCancelOutcome::Refused(ticket) => Err(TicketError::NotCancellable {
                id,
                status: ticket.status,
            }),
        }
    }

    /// Render a fresh QR for a valid ticket and restart its validity window.
    ///
    /// # Errors
    ///
    /// - `TicketNotFound`, `NotOwner`
    /// - `NotRefreshable`: the ticket is used or cancelled
    /// - `Render`: QR rendering failed; nothing was changed
    /// - `Internal`: persistence failed
    pub async fn refresh_qr(&self, caller: &Principal, id: TicketId) -> Result<Ticket, TicketError> {
        let mut ticket = self.find_ticket(id).await?;
        if !caller.acts_for(ticket.user_id) {
            return Err(TicketError::NotOwner);
        }
        if ticket.status != TicketStatus::Valid {
            return Err(TicketError::NotRefreshable {
                id,
                status: ticket.status,
            });
        }

        let data_url = self
            .followups
            .renderer()
            .render(&ticket.code)
            .map_err(|e| TicketError::Render(e.to_string()))?;
        let expires_at = self.issuer.expiry_from(self.issuer.now());

        if !self
            .store
            .attach_qr(id, data_url.clone(), Some(expires_at))
            .await?
        {
            // Scanned or cancelled since the read above.
            let current = self.find_ticket(id).await?;
            return Err(TicketError::NotRefreshable {
                id,
                status: current.status,
            });
        }

        tracing::info!(ticket_id = %id, expires_at = %expires_at, "QR refreshed");
        ticket.qr_data_url = Some(data_url);
        ticket.qr_expires_at = expires_at;
        Ok(ticket)
    }

    async fn owned_registration(
        &self,
        caller: &Principal,
        id: RegistrationId,
    ) -> Result<Registration, RegistrationError> {
        let registration = self
            .store
            .find_registration(id)
            .await?
            .ok_or(RegistrationError::RegistrationNotFound(id))?;
        if !caller.acts_for(registration.user_id) {
            return Err(RegistrationError::NotOwner);
        }
        Ok(registration)
    }

    async fn find_ticket(&self, id: TicketId) -> Result<Ticket, TicketError> {
        self.store
            .find_ticket(id)
            .await?
            .ok_or(TicketError::TicketNotFound(id))
    }

    fn after_promotion(&self, promotions: &[Promotion]) {
        if promotions.is_empty() {
            return;
        }
        RegistrationMetrics::record_promotions(promotions.len());
        for promotion in promotions {
            let registration = &promotion.registration;
            RegistrationMetrics::record_tickets(promotion.tickets.len());
            tracing::info!(
                registration_id = %registration.id,
                user_id = %registration.user_id,
                event_id = %registration.event_id,
                quantity = registration.quantity.get(),
                "Promoted from waitlist"
            );
            self.followups.render_qr(promotion.tickets.clone());
            self.notify_user(
                registration,
                NotificationKind::PromotedFromWaitlist,
                format!(
                    "A seat opened up. Your registration is confirmed with {} ticket(s).",
                    promotion.tickets.len()
                ),
            );
        }
    }

    fn notify_user(&self, registration: &Registration, kind: NotificationKind, message: String) {
        let notification = Notification::new(
            kind,
            Audience::User(registration.user_id),
            registration.event_id,
            message,
            self.issuer.now(),
        )
        .with_registration(registration.id);
        self.followups.notify(notification);
    }
}

impl std::fmt::Debug for RegistrationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrationEngine")
            .field("issuer", &self.issuer)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Run a store write, retrying the whole unit when its codes collide.
///
/// The store rolls back a colliding unit completely, so each retry starts
/// from scratch with new codes and a fresh capacity read.
async fn with_fresh_codes<T, F, Fut>(
    attempts: u32,
    operation: &'static str,
    mut write: F,
) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let mut attempt = 1;
    loop {
        match write().await {
            Err(StoreError::CodeCollision) => {
                RegistrationMetrics::record_collision();
                if attempt >= attempts {
                    tracing::error!(operation, attempt, "Scan code collisions exhausted attempts");
                    return Err(StoreError::CodeCollision);
                }
                tracing::warn!(operation, attempt, "Scan code collision, retrying with fresh codes");
                attempt += 1;
            },
            other => return other,
        }
    }
}

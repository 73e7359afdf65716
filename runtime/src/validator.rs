//! Scan validator: the gate-side half of the ticket lifecycle.

use crate::followup::FollowUps;
use crate::metrics::ScanMetrics;
use std::sync::Arc;
use turnstile_core::directory::Principal;
use turnstile_core::environment::Clock;
use turnstile_core::notification::{Audience, Notification, NotificationKind};
use turnstile_core::scan::{AdmittedTicket, ReuseAttempt, ScanError, ScanVerdict, Scanner, evaluate};
use turnstile_core::store::{RegistrationStore, TicketDetails};
use turnstile_core::types::{ScanCode, Ticket};

/// Re-reads allowed when the used-marking write loses to a concurrent change.
const MAX_SCAN_ATTEMPTS: usize = 3;

/// Validates scan codes and admits ticket holders.
///
/// The `Valid → Used` write is a conditional update in the store, so two
/// gates scanning the same code at once admit exactly one person; the other
/// re-reads the ticket and reports it as already used.
pub struct ScanValidator {
    store: Arc<dyn RegistrationStore>,
    clock: Arc<dyn Clock>,
    followups: FollowUps,
    reuse_alerts: bool,
}

impl ScanValidator {
    /// Create a validator with re-use alerts enabled.
    #[must_use]
    pub fn new(store: Arc<dyn RegistrationStore>, clock: Arc<dyn Clock>, followups: FollowUps) -> Self {
        Self {
            store,
            clock,
            followups,
            reuse_alerts: true,
        }
    }

    /// Turn re-use alert notifications on or off. Re-use is always logged.
    #[must_use]
    pub fn with_reuse_alerts(mut self, enabled: bool) -> Self {
        self.reuse_alerts = enabled;
        self
    }

    /// Whether re-use alerts are raised.
    #[must_use]
    pub const fn reuse_alerts(&self) -> bool {
        self.reuse_alerts
    }

    /// Scan `code` on behalf of `scanner`.
    ///
    /// # Errors
    ///
    /// - `MissingCode`: blank code
    /// - `TicketNotFound`: no ticket carries the code
    /// - `TicketCancelled`, `QrExpired`: ticket not admissible; nothing changed
    /// - `AlreadyUsed`: carries the original admission and the current attempt
    /// - `Internal`: persistence failed
    pub async fn scan(&self, code: &str, scanner: &Principal) -> Result<AdmittedTicket, ScanError> {
        let code = ScanCode::new(code.trim());
        if code.is_blank() {
            return Err(ScanError::MissingCode);
        }
        let current = Scanner {
            user_id: scanner.user_id,
            name: scanner.name.clone(),
        };

        for _ in 0..MAX_SCAN_ATTEMPTS {
            let Some(details) = self.store.ticket_details_by_code(code.clone()).await? else {
                ScanMetrics::record("not_found");
                tracing::info!(scanned_by = %scanner.user_id, "Scan of unknown code");
                return Err(ScanError::TicketNotFound);
            };
            let now = self.clock.now();
            let ticket_id = details.ticket.id;

            match evaluate(&details.ticket, now) {
                ScanVerdict::Admit => {
                    match self
                        .store
                        .mark_ticket_used(ticket_id, now, scanner.user_id)
                        .await?
                    {
                        Some(ticket) => {
                            ScanMetrics::record("valid");
                            tracing::info!(
                                ticket_id = %ticket_id,
                                event_id = %ticket.event_id,
                                scanned_by = %scanner.user_id,
                                "Ticket admitted"
                            );
                            return Ok(admitted(details, &ticket, current, now));
                        },
                        None => {
                            tracing::debug!(ticket_id = %ticket_id, "Ticket changed during scan, re-reading");
                        },
                    }
                },
                ScanVerdict::Cancelled => {
                    ScanMetrics::record("cancelled");
                    tracing::info!(ticket_id = %ticket_id, "Scan of cancelled ticket");
                    return Err(ScanError::TicketCancelled { ticket_id });
                },
                ScanVerdict::Expired { expired_at } => {
                    ScanMetrics::record("expired");
                    tracing::info!(ticket_id = %ticket_id, expired_at = %expired_at, "Scan of expired QR");
                    return Err(ScanError::QrExpired {
                        ticket_id,
                        expired_at,
                    });
                },
                ScanVerdict::AlreadyUsed {
                    scanned_at,
                    scanned_by,
                } => {
                    ScanMetrics::record("already_used");
                    let attempt = ReuseAttempt {
                        ticket_id,
                        event_id: details.event.id,
                        attendee_name: details.attendee.name,
                        scanned_at,
                        scanned_by,
                        current_attempt_by: current,
                        attempted_at: now,
                    };
                    self.raise_reuse_alert(&details.ticket, &attempt);
                    return Err(ScanError::AlreadyUsed(Box::new(attempt)));
                },
            }
        }

        tracing::error!("Ticket kept changing while being scanned");
        Err(ScanError::Internal(
            "ticket state changed repeatedly during scan".to_string(),
        ))
    }

    fn raise_reuse_alert(&self, ticket: &Ticket, attempt: &ReuseAttempt) {
        tracing::warn!(
            ticket_id = %attempt.ticket_id,
            event_id = %attempt.event_id,
            original_scanned_by = ?attempt.scanned_by.map(|id| id.to_string()),
            current_attempt_by = %attempt.current_attempt_by.user_id,
            "Used ticket presented again"
        );
        if !self.reuse_alerts {
            return;
        }
        ScanMetrics::record_reuse_alert();
        let message = format!(
            "Ticket {} ({}) was presented again by {} after being used.",
            attempt.ticket_id, attempt.attendee_name, attempt.current_attempt_by.name
        );
        self.followups.notify(
            Notification::new(
                NotificationKind::TicketReuseAlert,
                Audience::Administrators,
                attempt.event_id,
                message,
                attempt.attempted_at,
            )
            .with_registration(ticket.registration_id)
            .with_ticket(ticket.id),
        );
    }
}

impl std::fmt::Debug for ScanValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanValidator")
            .field("reuse_alerts", &self.reuse_alerts)
            .finish_non_exhaustive()
    }
}

fn admitted(
    details: TicketDetails,
    ticket: &Ticket,
    scanner: Scanner,
    now: chrono::DateTime<chrono::Utc>,
) -> AdmittedTicket {
    AdmittedTicket {
        ticket_id: ticket.id,
        attendee_name: details.attendee.name,
        attendee_email: details.attendee.email,
        event_id: details.event.id,
        event_title: details.event.title,
        event_starts_at: details.event.starts_at,
        event_location: details.event.location,
        scanned_at: ticket.scanned_at.unwrap_or(now),
        scanned_by: scanner,
    }
}

//! Ticket issuance: one ticket per confirmed seat, each with a fresh scan code.
//!
//! [`TicketIssuer`] is handed to store implementations so that issuance runs
//! inside the same atomic scope as the capacity decrement, both for new
//! registrations and for waitlist promotions.

use crate::environment::Clock;
use crate::types::{Registration, RegistrationStatus, ScanCode, Ticket, TicketId, TicketStatus};
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use rand::rngs::OsRng;
use std::sync::Arc;

/// Default QR validity window after issuance.
pub const DEFAULT_QR_TTL_HOURS: i64 = 24;

/// Source of scan codes.
///
/// Codes must be unguessable. Uniqueness is enforced by the store; a
/// collision surfaces as [`StoreError::CodeCollision`](crate::error::StoreError::CodeCollision)
/// and the caller retries with new codes.
pub trait ScanCodeGenerator: Send + Sync {
    /// Produce a new code.
    fn generate(&self) -> ScanCode;
}

/// Scan codes from the operating system CSPRNG, base64url without padding.
#[derive(Debug, Clone, Copy)]
pub struct RandomCodeGenerator {
    bytes: usize,
}

impl RandomCodeGenerator {
    /// 192 bits of entropy, 32 characters.
    pub const DEFAULT_BYTES: usize = 24;

    /// Generator producing `bytes` random bytes per code (minimum 16).
    #[must_use]
    pub fn with_bytes(bytes: usize) -> Self {
        Self {
            bytes: bytes.max(16),
        }
    }
}

impl Default for RandomCodeGenerator {
    fn default() -> Self {
        Self {
            bytes: Self::DEFAULT_BYTES,
        }
    }
}

impl ScanCodeGenerator for RandomCodeGenerator {
    fn generate(&self) -> ScanCode {
        let mut buf = vec![0u8; self.bytes];
        OsRng.fill_bytes(&mut buf);
        ScanCode::new(URL_SAFE_NO_PAD.encode(buf))
    }
}

/// Creates tickets for confirmed registrations.
#[derive(Clone)]
pub struct TicketIssuer {
    codes: Arc<dyn ScanCodeGenerator>,
    clock: Arc<dyn Clock>,
    qr_ttl: Duration,
}

impl TicketIssuer {
    /// Issuer with the default 24 hour QR window.
    #[must_use]
    pub fn new(codes: Arc<dyn ScanCodeGenerator>, clock: Arc<dyn Clock>) -> Self {
        Self {
            codes,
            clock,
            qr_ttl: Duration::hours(DEFAULT_QR_TTL_HOURS),
        }
    }

    /// Override the QR validity window.
    #[must_use]
    pub fn with_qr_ttl(mut self, qr_ttl: Duration) -> Self {
        self.qr_ttl = qr_ttl;
        self
    }

    /// Current time according to the injected clock.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// QR validity window.
    #[must_use]
    pub const fn qr_ttl(&self) -> Duration {
        self.qr_ttl
    }

    /// Expiry for a QR rendered at `issued_at`, saturating at the latest
    /// representable instant.
    #[must_use]
    pub fn expiry_from(&self, issued_at: DateTime<Utc>) -> DateTime<Utc> {
        issued_at
            .checked_add_signed(self.qr_ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Issue `quantity` tickets for a confirmed registration and link them.
    ///
    /// Returns an empty list, leaving the registration untouched, unless it
    /// is confirmed with no tickets yet; issuing twice would break the
    /// one-ticket-per-seat invariant.
    #[must_use]
    pub fn issue(&self, registration: &mut Registration) -> Vec<Ticket> {
        if registration.status != RegistrationStatus::Confirmed
            || !registration.ticket_ids.is_empty()
        {
            return Vec::new();
        }

        let issued_at = self.clock.now();
        let expires_at = self.expiry_from(issued_at);
        let tickets: Vec<Ticket> = (0..registration.quantity.get())
            .map(|seat_index| Ticket {
                id: TicketId::new(),
                registration_id: registration.id,
                user_id: registration.user_id,
                event_id: registration.event_id,
                seat_index,
                code: self.codes.generate(),
                status: TicketStatus::Valid,
                qr_data_url: None,
                qr_expires_at: expires_at,
                scanned_at: None,
                scanned_by: None,
                created_at: issued_at,
            })
            .collect();

        registration.ticket_ids = tickets.iter().map(|t| t.id).collect();
        tickets
    }
}

impl std::fmt::Debug for TicketIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TicketIssuer")
            .field("qr_ttl", &self.qr_ttl)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use crate::environment::SystemClock;
    use crate::types::{EventId, Quantity, UserId};
    use std::collections::HashSet;

    fn issuer() -> TicketIssuer {
        TicketIssuer::new(Arc::new(RandomCodeGenerator::default()), Arc::new(SystemClock))
    }

    fn registration(quantity: u32, status: RegistrationStatus) -> Registration {
        Registration::new(
            UserId::new(),
            EventId::new(),
            Quantity::new(quantity).unwrap(),
            status,
            Utc::now(),
        )
    }

    #[test]
    fn random_codes_are_url_safe_and_distinct() {
        let generator = RandomCodeGenerator::default();
        let codes: HashSet<String> = (0..500)
            .map(|_| generator.generate().as_str().to_string())
            .collect();

        assert_eq!(codes.len(), 500);
        for code in &codes {
            assert_eq!(code.len(), 32);
            assert!(code
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        }
    }

    #[test]
    fn short_code_requests_are_clamped() {
        let code = RandomCodeGenerator::with_bytes(4).generate();
        assert!(code.as_str().len() >= 21);
    }

    #[test]
    fn issues_one_ticket_per_seat_and_links_them() {
        let mut reg = registration(3, RegistrationStatus::Confirmed);
        let tickets = issuer().issue(&mut reg);

        assert_eq!(tickets.len(), 3);
        assert_eq!(reg.tickets_issued(), 3);
        assert_eq!(
            reg.ticket_ids,
            tickets.iter().map(|t| t.id).collect::<Vec<_>>()
        );
        for (index, ticket) in tickets.iter().enumerate() {
            assert_eq!(ticket.registration_id, reg.id);
            assert_eq!(ticket.seat_index as usize, index);
            assert_eq!(ticket.status, TicketStatus::Valid);
            assert_eq!(ticket.qr_expires_at, ticket.created_at + Duration::hours(24));
        }
    }

    #[test]
    fn waitlisted_registrations_get_nothing() {
        let mut reg = registration(2, RegistrationStatus::Waitlisted);
        assert!(issuer().issue(&mut reg).is_empty());
        assert!(reg.ticket_ids.is_empty());
    }

    #[test]
    fn never_issues_twice() {
        let mut reg = registration(1, RegistrationStatus::Confirmed);
        let issuer = issuer();
        assert_eq!(issuer.issue(&mut reg).len(), 1);
        assert!(issuer.issue(&mut reg).is_empty());
        assert_eq!(reg.tickets_issued(), 1);
    }

    #[test]
    fn custom_ttl_applies() {
        let mut reg = registration(1, RegistrationStatus::Confirmed);
        let tickets = issuer()
            .with_qr_ttl(Duration::hours(2))
            .issue(&mut reg);
        assert_eq!(
            tickets[0].qr_expires_at - tickets[0].created_at,
            Duration::hours(2)
        );
    }

    #[test]
    fn oversized_ttl_saturates_instead_of_overflowing() {
        let issuer = issuer().with_qr_ttl(Duration::weeks(1_000_000_000));
        let mut reg = registration(1, RegistrationStatus::Confirmed);
        let tickets = issuer.issue(&mut reg);
        assert_eq!(tickets[0].qr_expires_at, DateTime::<Utc>::MAX_UTC);
        assert_eq!(issuer.expiry_from(Utc::now()), DateTime::<Utc>::MAX_UTC);
    }
}

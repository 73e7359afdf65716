//! # Turnstile Core
//!
//! Domain types and decision logic for event registration and ticket
//! admission.
//!
//! This crate has no I/O. It defines what the system stores, the rules for
//! changing it, and the traits that the runtime and storage crates implement.
//!
//! ## Core Concepts
//!
//! - **Capacity**: remaining unreserved seats of an event; the only contended value
//! - **Registration**: a user's claim on one or more seats, confirmed or waitlisted
//! - **Ticket**: one scannable proof of one confirmed seat
//! - **Scan code**: the opaque token in a ticket's QR image, used as the gate lookup key
//! - **Waitlist promotion**: confirming waitlisted registrations, first-fit FIFO,
//!   when seats come back
//!
//! ## Layout
//!
//! - [`types`]: identifiers, records and their status enums
//! - [`capacity`]: admission and promotion decisions over a capacity snapshot
//! - [`issuance`]: ticket creation and scan code generation
//! - [`scan`]: the gate-side ticket state machine
//! - [`store`]: the dyn-compatible persistence trait
//! - [`directory`], [`notification`], [`qr`]: external collaborators
//! - [`environment`]: injected clock

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};

pub mod capacity;
pub mod directory;
pub mod error;
pub mod issuance;
pub mod notification;
pub mod qr;
pub mod scan;
pub mod store;
pub mod types;

pub use error::{RegistrationError, StoreError, TicketError};
pub use scan::ScanError;
pub use types::{
    EventId, EventSummary, Quantity, Registration, RegistrationId, RegistrationStatus, ScanCode,
    Ticket, TicketId, TicketStatus, UserId, UserProfile,
};

/// Environment module - injected dependencies
///
/// All time reads go through [`Clock`](environment::Clock) so that expiry and
/// FIFO ordering can be tested deterministically.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```
    /// use turnstile_core::environment::{Clock, SystemClock};
    ///
    /// let clock = SystemClock;
    /// let _now = clock.now();
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall-clock time.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}

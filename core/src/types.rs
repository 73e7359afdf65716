//! Domain types for the registration and ticket lifecycle.
//!
//! Statuses are closed enums with explicit transition rules, so an illegal
//! transition (for example waitlisted → waitlisted, or used → valid) cannot be
//! expressed without going through [`RegistrationStatus::can_transition_to`] or
//! [`TicketStatus::can_transition_to`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            #[doc = concat!("Creates a new random `", stringify!($name), "`")]
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            #[doc = concat!("Create a `", stringify!($name), "` from a `Uuid`")]
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Get the inner UUID
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }

            /// Parse from the hyphenated string form used in URLs.
            ///
            /// # Errors
            ///
            /// Returns the underlying [`uuid::Error`] when `raw` is not a UUID.
            pub fn parse(raw: &str) -> Result<Self, uuid::Error> {
                Uuid::parse_str(raw.trim()).map(Self)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for an event
    EventId
);
uuid_id!(
    /// Unique identifier for a user (attendee, organizer or admin)
    UserId
);
uuid_id!(
    /// Unique identifier for a registration
    RegistrationId
);
uuid_id!(
    /// Unique identifier for a ticket
    TicketId
);

/// Opaque, unguessable token encoded in a ticket's QR image.
///
/// The code is the lookup key at the gate. It carries no structure; the only
/// guarantee is global uniqueness across every ticket ever issued.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScanCode(String);

impl ScanCode {
    /// Wrap a raw code string.
    #[must_use]
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// Borrow the raw code.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the code is empty after trimming whitespace.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

// Codes are bearer credentials; keep them out of debug logs.
impl fmt::Debug for ScanCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix: String = self.0.chars().take(4).collect();
        write!(f, "ScanCode({prefix}…)")
    }
}

impl fmt::Display for ScanCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Quantity
// ============================================================================

/// Number of seats requested by a registration. Always at least one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Quantity(u32);

/// Rejected seat quantity.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QuantityError {
    /// Zero or negative.
    #[error("quantity must be a positive integer, got {0}")]
    NotPositive(String),
    /// Fractional, non-numeric or out of range.
    #[error("quantity must be an integer, got {0}")]
    NotInteger(String),
    /// Beyond what a registration can record.
    #[error("quantity must be at most {max}, got {0}", max = Quantity::MAX)]
    TooLarge(String),
    /// Above the configured per-registration ceiling.
    #[error("quantity {requested} exceeds the limit of {limit} seats per registration")]
    AboveLimit {
        /// Requested seats
        requested: u32,
        /// Configured ceiling
        limit: u32,
    },
}

impl Quantity {
    /// A single seat.
    pub const ONE: Self = Self(1);

    /// Largest quantity a registration row can hold (signed 32-bit column).
    #[allow(clippy::cast_sign_loss)] // i32::MAX is positive
    pub const MAX: u32 = i32::MAX as u32;

    /// Create a quantity, rejecting zero and values above [`Quantity::MAX`].
    ///
    /// # Errors
    ///
    /// Returns [`QuantityError::NotPositive`] for zero and
    /// [`QuantityError::TooLarge`] above [`Quantity::MAX`].
    pub fn new(seats: u32) -> Result<Self, QuantityError> {
        if seats == 0 {
            return Err(QuantityError::NotPositive(seats.to_string()));
        }
        if seats > Self::MAX {
            return Err(QuantityError::TooLarge(seats.to_string()));
        }
        Ok(Self(seats))
    }

    /// Number of seats.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Parse a JSON request value.
    ///
    /// Accepts JSON integers and integral floats (`2.0`); everything else is
    /// rejected. Strings are not coerced.
    ///
    /// # Errors
    ///
    /// Returns [`QuantityError`] for non-integers, non-positive values and
    /// values beyond [`Quantity::MAX`].
    pub fn from_json(value: &serde_json::Value) -> Result<Self, QuantityError> {
        let serde_json::Value::Number(number) = value else {
            return Err(QuantityError::NotInteger(value.to_string()));
        };

        if let Some(unsigned) = number.as_u64() {
            let seats = u32::try_from(unsigned)
                .map_err(|_| QuantityError::TooLarge(number.to_string()))?;
            return Self::new(seats);
        }
        if let Some(signed) = number.as_i64() {
            // as_u64 failed, so this is negative
            return Err(QuantityError::NotPositive(signed.to_string()));
        }

        let float = number.as_f64().unwrap_or(f64::NAN);
        if !float.is_finite() || float.fract() != 0.0 {
            return Err(QuantityError::NotInteger(number.to_string()));
        }
        if float <= 0.0 {
            return Err(QuantityError::NotPositive(number.to_string()));
        }
        if float > f64::from(Self::MAX) {
            return Err(QuantityError::TooLarge(number.to_string()));
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)] // range checked above
        Self::new(float as u32)
    }

    /// Enforce an optional per-registration ceiling.
    ///
    /// # Errors
    ///
    /// Returns [`QuantityError::AboveLimit`] when `limit` is set and exceeded.
    pub const fn within(self, limit: Option<u32>) -> Result<Self, QuantityError> {
        match limit {
            Some(limit) if self.0 > limit => Err(QuantityError::AboveLimit {
                requested: self.0,
                limit,
            }),
            _ => Ok(self),
        }
    }
}

impl TryFrom<u32> for Quantity {
    type Error = QuantityError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Quantity> for u32 {
    fn from(value: Quantity) -> Self {
        value.0
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Reference data owned by external collaborators
// ============================================================================

/// The slice of an event that the registration engine needs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSummary {
    /// Event ID
    pub id: EventId,
    /// Display title
    pub title: String,
    /// Organizing body
    pub organization: String,
    /// Start time
    pub starts_at: DateTime<Utc>,
    /// Venue
    pub location: String,
    /// Remaining unreserved seats
    pub capacity: u32,
}

/// Attendee identity used for denormalized scan responses.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// User ID
    pub id: UserId,
    /// Display name
    pub name: String,
    /// Contact email
    pub email: String,
}

// ============================================================================
// Registration
// ============================================================================

/// Registration lifecycle status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationStatus {
    /// Seats are held and tickets issued
    Confirmed,
    /// Queued for seats; holds nothing
    Waitlisted,
    /// Terminal
    Cancelled,
}

impl RegistrationStatus {
    /// Whether `self → next` is a legal transition.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Confirmed | Self::Waitlisted, Self::Cancelled)
                | (Self::Waitlisted, Self::Confirmed)
        )
    }

    /// Storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Confirmed => "confirmed",
            Self::Waitlisted => "waitlisted",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parse the storage representation.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "confirmed" => Some(Self::Confirmed),
            "waitlisted" => Some(Self::Waitlisted),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

impl fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attempted status change that the lifecycle forbids.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("illegal {entity} transition {from} -> {to}")]
pub struct InvalidTransition {
    /// "registration" or "ticket"
    pub entity: &'static str,
    /// Current status
    pub from: &'static str,
    /// Requested status
    pub to: &'static str,
}

/// A user's claim on one or more seats of an event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    /// Registration ID
    pub id: RegistrationId,
    /// Registering user
    pub user_id: UserId,
    /// Target event
    pub event_id: EventId,
    /// Seats requested
    pub quantity: Quantity,
    /// Lifecycle status
    pub status: RegistrationStatus,
    /// Issued tickets in seat order; empty unless confirmed
    pub ticket_ids: Vec<TicketId>,
    /// Creation time, the waitlist FIFO key
    pub created_at: DateTime<Utc>,
    /// Last status change
    pub updated_at: DateTime<Utc>,
}

impl Registration {
    /// Create a registration in the given initial status.
    #[must_use]
    pub fn new(
        user_id: UserId,
        event_id: EventId,
        quantity: Quantity,
        status: RegistrationStatus,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: RegistrationId::new(),
            user_id,
            event_id,
            quantity,
            status,
            ticket_ids: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Number of tickets issued; always `ticket_ids.len()`.
    #[must_use]
    pub fn tickets_issued(&self) -> usize {
        self.ticket_ids.len()
    }

    /// Whether this registration blocks a new one for the same (user, event).
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status != RegistrationStatus::Cancelled
    }

    /// Apply a status transition.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidTransition`] when the lifecycle forbids the change.
    pub fn transition(
        &mut self,
        next: RegistrationStatus,
        at: DateTime<Utc>,
    ) -> Result<(), InvalidTransition> {
        if !self.status.can_transition_to(next) {
            return Err(InvalidTransition {
                entity: "registration",
                from: self.status.as_str(),
                to: next.as_str(),
            });
        }
        self.status = next;
        self.updated_at = at;
        Ok(())
    }
}

// ============================================================================
// Ticket
// ============================================================================

/// Ticket lifecycle status. Expiry is time-derived, not stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    /// Admits one entry
    Valid,
    /// Scanned at the gate
    Used,
    /// Withdrawn by cancellation
    Cancelled,
}

impl TicketStatus {
    /// Whether `self → next` is a legal transition.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!((self, next), (Self::Valid, Self::Used | Self::Cancelled))
    }

    /// Storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Valid => "valid",
            Self::Used => "used",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parse the storage representation.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "valid" => Some(Self::Valid),
            "used" => Some(Self::Used),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One issued, scannable proof of a single confirmed seat.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    /// Ticket ID
    pub id: TicketId,
    /// Parent registration
    pub registration_id: RegistrationId,
    /// Ticket holder
    pub user_id: UserId,
    /// Event admitted to
    pub event_id: EventId,
    /// Position within the parent's `ticket_ids`
    pub seat_index: u32,
    /// Scan payload
    pub code: ScanCode,
    /// Lifecycle status
    pub status: TicketStatus,
    /// Rendered QR image as a data URL, filled in after commit
    pub qr_data_url: Option<String>,
    /// Scans after this instant are rejected
    pub qr_expires_at: DateTime<Utc>,
    /// Set on the successful scan only
    pub scanned_at: Option<DateTime<Utc>>,
    /// Set on the successful scan only
    pub scanned_by: Option<UserId>,
    /// Issuance time
    pub created_at: DateTime<Utc>,
}

impl Ticket {
    /// Whether the QR window has closed at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.qr_expires_at
    }

    /// Apply a status transition.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidTransition`] unless the ticket is currently valid.
    pub fn transition(&mut self, next: TicketStatus) -> Result<(), InvalidTransition> {
        if !self.status.can_transition_to(next) {
            return Err(InvalidTransition {
                entity: "ticket",
                from: self.status.as_str(),
                to: next.as_str(),
            });
        }
        self.status = next;
        Ok(())
    }
}

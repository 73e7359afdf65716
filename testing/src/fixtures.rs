//! Fixture builders.

use chrono::{Duration, TimeZone, Utc};
use turnstile_core::directory::{Principal, Role};
use turnstile_core::types::{EventId, EventSummary, UserId, UserProfile};

/// An event with `capacity` seats, starting a week after the test clock epoch.
#[must_use]
pub fn event(title: &str, capacity: u32) -> EventSummary {
    let epoch = Utc
        .with_ymd_and_hms(2025, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or_default();
    EventSummary {
        id: EventId::new(),
        title: title.to_string(),
        organization: "Campus Events Board".to_string(),
        starts_at: epoch + Duration::days(7),
        location: "Main Hall".to_string(),
        capacity,
    }
}

/// A user profile with an address derived from `name`.
#[must_use]
pub fn user(name: &str) -> UserProfile {
    UserProfile {
        id: UserId::new(),
        name: name.to_string(),
        email: format!("{}@example.edu", name.to_lowercase().replace(' ', ".")),
    }
}

/// A principal for `profile` with `role`.
#[must_use]
pub fn principal(profile: &UserProfile, role: Role) -> Principal {
    Principal {
        user_id: profile.id,
        role,
        name: profile.name.clone(),
        email: profile.email.clone(),
    }
}

//! Capacity ledger decisions.
//!
//! Pure functions over a capacity snapshot. Store implementations call them
//! *inside* their atomic scope, after re-reading capacity under lock, so the
//! decision and the write it drives are never separated by another writer.

use crate::types::{Quantity, Registration, RegistrationId, RegistrationStatus};

/// Outcome of comparing a request against remaining capacity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    /// Enough seats: decrement and issue tickets.
    Confirm {
        /// Capacity after the decrement
        remaining: u32,
    },
    /// Not enough seats: queue without holding any.
    Waitlist {
        /// Seats missing for this request
        shortfall: u32,
    },
}

/// Decide whether `quantity` seats fit into `capacity`.
#[must_use]
pub const fn admit(capacity: u32, quantity: Quantity) -> Admission {
    let wanted = quantity.get();
    if capacity >= wanted {
        Admission::Confirm {
            remaining: capacity - wanted,
        }
    } else {
        Admission::Waitlist {
            shortfall: wanted - capacity,
        }
    }
}

/// Registrations chosen for promotion and the capacity left afterwards.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PromotionPlan {
    /// Promoted registrations, oldest first
    pub promoted: Vec<RegistrationId>,
    /// Capacity after all promotions
    pub remaining: u32,
}

impl PromotionPlan {
    /// Whether nothing fits.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.promoted.is_empty()
    }
}

/// First-fit FIFO promotion over the waitlist.
///
/// Walks waitlisted registrations oldest first (ties broken by id so the
/// order is total) and promotes each one whose whole quantity fits in what is
/// left. A large head-of-line request does not block smaller ones behind it,
/// and no registration is ever partially promoted. Non-waitlisted entries are
/// ignored.
#[must_use]
pub fn plan_promotions<'a, I>(capacity: u32, waitlist: I) -> PromotionPlan
where
    I: IntoIterator<Item = &'a Registration>,
{
    let mut queue: Vec<&Registration> = waitlist
        .into_iter()
        .filter(|r| r.status == RegistrationStatus::Waitlisted)
        .collect();
    queue.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

    let mut remaining = capacity;
    let mut promoted = Vec::new();
    for registration in queue {
        if remaining == 0 {
            break;
        }
        if let Admission::Confirm { remaining: left } = admit(remaining, registration.quantity) {
            promoted.push(registration.id);
            remaining = left;
        }
    }

    PromotionPlan {
        promoted,
        remaining,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use crate::types::{EventId, UserId};
    use chrono::{Duration, TimeZone, Utc};
    use proptest::prelude::*;

    fn waitlisted(quantity: u32, minutes: i64) -> Registration {
        let base = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        Registration::new(
            UserId::new(),
            EventId::new(),
            Quantity::new(quantity).unwrap(),
            RegistrationStatus::Waitlisted,
            base + Duration::minutes(minutes),
        )
    }

    #[test]
    fn admit_exact_fit_confirms() {
        assert_eq!(
            admit(2, Quantity::new(2).unwrap()),
            Admission::Confirm { remaining: 0 }
        );
    }

    #[test]
    fn admit_short_waitlists() {
        assert_eq!(
            admit(1, Quantity::new(3).unwrap()),
            Admission::Waitlist { shortfall: 2 }
        );
        assert_eq!(admit(0, Quantity::ONE), Admission::Waitlist { shortfall: 1 });
    }

    #[test]
    fn smaller_later_request_is_promoted_past_larger_head() {
        let w1 = waitlisted(2, 0);
        let w2 = waitlisted(1, 1);

        let plan = plan_promotions(1, [&w1, &w2]);

        assert_eq!(plan.promoted, vec![w2.id]);
        assert_eq!(plan.remaining, 0);
    }

    #[test]
    fn fifo_order_wins_when_both_fit() {
        let late = waitlisted(1, 10);
        let early = waitlisted(1, 0);

        // input order deliberately reversed
        let plan = plan_promotions(1, [&late, &early]);

        assert_eq!(plan.promoted, vec![early.id]);
    }

    #[test]
    fn promotes_several_until_exhausted() {
        let a = waitlisted(2, 0);
        let b = waitlisted(3, 1);
        let c = waitlisted(1, 2);
        let d = waitlisted(1, 3);

        let plan = plan_promotions(4, [&a, &b, &c, &d]);

        assert_eq!(plan.promoted, vec![a.id, c.id, d.id]);
        assert_eq!(plan.remaining, 0);
    }

    #[test]
    fn ignores_non_waitlisted_entries() {
        let mut confirmed = waitlisted(1, 0);
        confirmed.status = RegistrationStatus::Confirmed;
        let queued = waitlisted(1, 1);

        let plan = plan_promotions(5, [&confirmed, &queued]);

        assert_eq!(plan.promoted, vec![queued.id]);
        assert_eq!(plan.remaining, 4);
    }

    #[test]
    fn empty_capacity_promotes_nothing() {
        let w = waitlisted(1, 0);
        let plan = plan_promotions(0, [&w]);
        assert!(plan.is_empty());
    }

    proptest! {
        #[test]
        fn promotions_never_exceed_capacity(
            capacity in 0u32..50,
            quantities in prop::collection::vec(1u32..8, 0..20),
        ) {
            let queue: Vec<Registration> = quantities
                .iter()
                .enumerate()
                .map(|(i, q)| waitlisted(*q, i64::try_from(i).unwrap()))
                .collect();

            let plan = plan_promotions(capacity, &queue);

            let used: u32 = queue
                .iter()
                .filter(|r| plan.promoted.contains(&r.id))
                .map(|r| r.quantity.get())
                .sum();
            prop_assert_eq!(used + plan.remaining, capacity);

            // first-fit: anything left behind must not fit what remains
            for skipped in queue.iter().filter(|r| !plan.promoted.contains(&r.id)) {
                prop_assert!(skipped.quantity.get() > plan.remaining);
            }
        }
    }
}

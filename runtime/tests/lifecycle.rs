//! Registration and scan scenarios against the in-memory store.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use chrono::Duration;
use std::sync::Arc;
use turnstile_core::directory::{Principal, Role};
use turnstile_core::environment::Clock;
use turnstile_core::error::{RegistrationError, StoreError, TicketError};
use turnstile_core::issuance::{ScanCodeGenerator, TicketIssuer};
use turnstile_core::notification::{Audience, NotificationKind};
use turnstile_core::qr::QrRenderer;
use turnstile_core::scan::ScanError;
use turnstile_core::store::{NewRegistration, RegistrationStore};
use turnstile_core::types::{
    EventSummary, Quantity, Registration, RegistrationStatus, Ticket, TicketStatus,
};
use turnstile_runtime::{
    EngineConfig, FollowUps, Registered, RegistrationEngine, RetryPolicy, ScanValidator,
};
use turnstile_testing::{
    FailingQrRenderer, FixedClock, InMemoryRegistrationStore, RecordingNotifier,
    ScriptedCodeGenerator, SequentialCodeGenerator, StubQrRenderer, fixtures, test_clock,
};

// ============================================================================
// Harness
// ============================================================================

struct Harness {
    store: InMemoryRegistrationStore,
    clock: FixedClock,
    notifier: RecordingNotifier,
    engine: RegistrationEngine,
    validator: ScanValidator,
}

impl Harness {
    fn new() -> Self {
        Self::build(
            Arc::new(SequentialCodeGenerator::new()),
            Arc::new(StubQrRenderer),
            EngineConfig::default(),
        )
    }

    fn with_codes(codes: &[&str]) -> Self {
        Self::build(
            Arc::new(ScriptedCodeGenerator::new(codes.iter().copied())),
            Arc::new(StubQrRenderer),
            EngineConfig::default(),
        )
    }

    fn build(
        codes: Arc<dyn ScanCodeGenerator>,
        renderer: Arc<dyn QrRenderer>,
        config: EngineConfig,
    ) -> Self {
        turnstile_testing::init_test_tracing();
        let store = InMemoryRegistrationStore::new();
        let clock = test_clock();
        let notifier = RecordingNotifier::new();
        let shared: Arc<dyn RegistrationStore> = Arc::new(store.clone());

        let followups = FollowUps::new(Arc::clone(&shared), renderer, Arc::new(notifier.clone()))
            .with_retry(
                RetryPolicy::builder()
                    .initial_delay(std::time::Duration::from_millis(1))
                    .build(),
            );
        let issuer = TicketIssuer::new(codes, Arc::new(clock.clone()));
        let engine = RegistrationEngine::new(Arc::clone(&shared), issuer, followups.clone())
            .with_config(config);
        let validator = ScanValidator::new(shared, Arc::new(clock.clone()), followups);

        Self {
            store,
            clock,
            notifier,
            engine,
            validator,
        }
    }

    fn event(&self, title: &str, capacity: u32) -> EventSummary {
        let event = fixtures::event(title, capacity);
        self.store.insert_event(event.clone());
        event
    }

    fn person(&self, name: &str, role: Role) -> Principal {
        let profile = fixtures::user(name);
        self.store.insert_user(profile.clone());
        fixtures::principal(&profile, role)
    }

    fn student(&self, name: &str) -> Principal {
        self.person(name, Role::Student)
    }

    async fn register(
        &self,
        who: &Principal,
        event: &EventSummary,
        seats: u32,
    ) -> Result<Registered, RegistrationError> {
        // Distinct created_at values keep FIFO order unambiguous.
        self.clock.advance(Duration::seconds(1));
        self.engine
            .register(NewRegistration {
                user_id: who.user_id,
                event_id: event.id,
                quantity: Quantity::new(seats).unwrap(),
            })
            .await
    }

    async fn confirmed(&self, who: &Principal, event: &EventSummary, seats: u32) -> (Registration, Vec<Ticket>) {
        match self.register(who, event, seats).await.unwrap() {
            Registered::Confirmed {
                registration,
                tickets,
            } => (registration, tickets),
            other => panic!("expected confirmation, got {other:?}"),
        }
    }

    async fn waitlisted(&self, who: &Principal, event: &EventSummary, seats: u32) -> Registration {
        match self.register(who, event, seats).await.unwrap() {
            Registered::Waitlisted { registration } => registration,
            other => panic!("expected waitlist, got {other:?}"),
        }
    }

    fn registration(&self, event: &EventSummary, id: turnstile_core::RegistrationId) -> Registration {
        self.store
            .registrations_for_event(event.id)
            .into_iter()
            .find(|r| r.id == id)
            .unwrap()
    }
}

// ============================================================================
// Registration
// ============================================================================

#[tokio::test]
async fn confirmed_registration_reserves_seats_and_issues_tickets() {
    let h = Harness::new();
    let event = h.event("Robotics Night", 5);
    let alice = h.student("Alice");

    let (registration, tickets) = h.confirmed(&alice, &event, 3).await;

    assert_eq!(registration.status, RegistrationStatus::Confirmed);
    assert_eq!(registration.tickets_issued(), 3);
    assert_eq!(
        tickets.iter().map(|t| t.seat_index).collect::<Vec<_>>(),
        vec![0, 1, 2]
    );
    assert_eq!(
        registration.ticket_ids,
        tickets.iter().map(|t| t.id).collect::<Vec<_>>()
    );
    assert!(tickets.iter().all(|t| t.qr_expires_at == t.created_at + Duration::hours(24)));
    assert_eq!(h.store.capacity(event.id), Some(2));
    assert_eq!(h.store.registered_users(event.id), vec![alice.user_id]);
    h.store.check_invariants().unwrap();
}

#[tokio::test]
async fn insufficient_capacity_waitlists_without_touching_it() {
    let h = Harness::new();
    let event = h.event("Small Seminar", 2);
    let alice = h.student("Alice");

    let registration = h.waitlisted(&alice, &event, 3).await;

    assert!(registration.ticket_ids.is_empty());
    assert_eq!(h.store.capacity(event.id), Some(2));
    assert!(h.store.registered_users(event.id).is_empty());
    assert_eq!(h.store.ticket_count(), 0);
}

#[tokio::test]
async fn duplicate_registration_returns_existing_record_once() {
    let h = Harness::new();
    let event = h.event("Career Fair", 4);
    let alice = h.student("Alice");

    let (first, _) = h.confirmed(&alice, &event, 2).await;
    let second = h.register(&alice, &event, 1).await;

    assert_eq!(
        second,
        Err(RegistrationError::AlreadyRegistered(Box::new(first)))
    );
    assert_eq!(h.store.capacity(event.id), Some(2));
    assert_eq!(h.store.ticket_count(), 2);
}

#[tokio::test]
async fn waitlisted_user_cannot_register_twice_either() {
    let h = Harness::new();
    let event = h.event("Full House", 0);
    let alice = h.student("Alice");

    let waiting = h.waitlisted(&alice, &event, 1).await;
    let again = h.register(&alice, &event, 1).await;

    assert_eq!(again, Err(RegistrationError::AlreadyRegistered(Box::new(waiting))));
}

#[tokio::test]
async fn user_may_register_again_after_cancelling() {
    let h = Harness::new();
    let event = h.event("Open Lab", 3);
    let alice = h.student("Alice");

    let (first, _) = h.confirmed(&alice, &event, 1).await;
    h.engine.cancel(&alice, first.id).await.unwrap();
    let (second, _) = h.confirmed(&alice, &event, 2).await;

    assert_ne!(first.id, second.id);
    assert_eq!(h.store.capacity(event.id), Some(1));
    h.store.check_invariants().unwrap();
}

#[tokio::test]
async fn unknown_event_is_reported() {
    let h = Harness::new();
    let ghost = fixtures::event("Not Seeded", 10);
    let alice = h.student("Alice");

    assert_eq!(
        h.register(&alice, &ghost, 1).await,
        Err(RegistrationError::EventNotFound(ghost.id))
    );
}

#[tokio::test]
async fn quantity_beyond_a_signed_column_is_rejected_before_the_store() {
    let h = Harness::new();
    let event = h.event("Huge Hall", 10);
    let alice = h.student("Alice");
    let event_id = event.id.to_string();

    let err = h
        .engine
        .validate(
            Some(alice.user_id),
            &event_id,
            Some(&serde_json::json!(3_000_000_000u64)),
        )
        .unwrap_err();
    assert!(matches!(err, RegistrationError::InvalidQuantity(_)));

    let largest = h
        .engine
        .validate(
            Some(alice.user_id),
            &event_id,
            Some(&serde_json::json!(2_147_483_647)),
        )
        .unwrap();
    assert_eq!(largest.quantity, Quantity::new(Quantity::MAX).unwrap());
    assert!(h.store.registrations_for_event(event.id).is_empty());
}

#[tokio::test]
async fn persistence_failure_is_internal_and_changes_nothing() {
    let h = Harness::new();
    let event = h.event("Flaky Night", 2);
    let alice = h.student("Alice");

    h.store
        .fail_next_write(StoreError::Database("connection reset".into()));
    let failed = h.register(&alice, &event, 1).await;

    assert!(matches!(failed, Err(RegistrationError::Internal(_))));
    assert_eq!(h.store.capacity(event.id), Some(2));
    assert!(h.store.registrations_for_event(event.id).is_empty());

    // Client retry goes through the duplicate check and succeeds.
    h.confirmed(&alice, &event, 1).await;
    assert_eq!(h.store.capacity(event.id), Some(1));
}

#[tokio::test]
async fn code_collision_retries_whole_unit_with_fresh_codes() {
    let h = Harness::with_codes(&["DUP", "DUP"]);
    let event = h.event("Collision Course", 4);
    let alice = h.student("Alice");

    let (registration, tickets) = h.confirmed(&alice, &event, 2).await;

    assert_eq!(registration.tickets_issued(), 2);
    assert!(tickets.iter().all(|t| t.code.as_str() != "DUP"));
    assert_ne!(tickets[0].code, tickets[1].code);
    assert_eq!(h.store.capacity(event.id), Some(2));
    assert_eq!(h.store.registrations_for_event(event.id).len(), 1);
    h.store.check_invariants().unwrap();
}

#[tokio::test]
async fn exhausted_collisions_fail_without_side_effects() {
    let h = Harness::build(
        Arc::new(ScriptedCodeGenerator::new(["DUP", "DUP", "DUP", "DUP"])),
        Arc::new(StubQrRenderer),
        EngineConfig {
            code_attempts: 2,
            ..EngineConfig::default()
        },
    );
    let event = h.event("Unlucky", 4);
    let alice = h.student("Alice");

    let result = h.register(&alice, &event, 2).await;

    assert!(matches!(result, Err(RegistrationError::Internal(_))));
    assert_eq!(h.store.capacity(event.id), Some(4));
    assert_eq!(h.store.ticket_count(), 0);
}

#[tokio::test]
async fn qr_failure_never_reverses_a_registration() {
    let h = Harness::build(
        Arc::new(SequentialCodeGenerator::new()),
        Arc::new(FailingQrRenderer),
        EngineConfig::default(),
    );
    let event = h.event("No Printer", 1);
    let alice = h.student("Alice");
    let gate = h.person("Gate", Role::Organizer);

    let (registration, tickets) = h.confirmed(&alice, &event, 1).await;
    h.engine.followups().settle().await;

    let stored = h.store.ticket(tickets[0].id).unwrap();
    assert!(stored.qr_data_url.is_none());
    assert_eq!(h.registration(&event, registration.id).status, RegistrationStatus::Confirmed);
    assert!(h.validator.scan(tickets[0].code.as_str(), &gate).await.is_ok());
}

#[tokio::test]
async fn qr_images_are_attached_after_commit() {
    let h = Harness::new();
    let event = h.event("Gallery Opening", 2);
    let alice = h.student("Alice");

    let (_, tickets) = h.confirmed(&alice, &event, 2).await;
    assert!(tickets.iter().all(|t| t.qr_data_url.is_none()));
    h.engine.followups().settle().await;

    for ticket in &tickets {
        let stored = h.store.ticket(ticket.id).unwrap();
        assert_eq!(
            stored.qr_data_url,
            Some(format!("data:text/plain,{}", ticket.code))
        );
        assert_eq!(stored.qr_expires_at, ticket.qr_expires_at);
    }
}

#[tokio::test]
async fn notifications_follow_each_outcome() {
    let h = Harness::new();
    let event = h.event("Poetry Slam", 1);
    let alice = h.student("Alice");
    let bob = h.student("Bob");

    let (a, _) = h.confirmed(&alice, &event, 1).await;
    let b = h.waitlisted(&bob, &event, 1).await;
    h.engine.cancel(&alice, a.id).await.unwrap();
    h.engine.followups().settle().await;

    let confirmed = h.notifier.of_kind(NotificationKind::RegistrationConfirmed);
    assert_eq!(confirmed.len(), 1);
    assert_eq!(confirmed[0].audience, Audience::User(alice.user_id));
    assert_eq!(confirmed[0].registration_id, Some(a.id));

    let waitlisted = h.notifier.of_kind(NotificationKind::RegistrationWaitlisted);
    assert_eq!(waitlisted[0].registration_id, Some(b.id));
    assert_eq!(h.notifier.of_kind(NotificationKind::RegistrationCancelled).len(), 1);

    let promoted = h.notifier.of_kind(NotificationKind::PromotedFromWaitlist);
    assert_eq!(promoted.len(), 1);
    assert_eq!(promoted[0].audience, Audience::User(bob.user_id));
}

#[tokio::test]
async fn notifier_outage_is_invisible_to_the_caller() {
    let h = Harness::new();
    h.notifier.fail_times(
        10,
        turnstile_core::notification::NotifyError::Unavailable("smtp down".into()),
    );
    let event = h.event("Quiet Launch", 1);
    let alice = h.student("Alice");

    h.confirmed(&alice, &event, 1).await;
    h.engine.followups().settle().await;

    assert!(h.notifier.delivered().is_empty());
    assert_eq!(h.notifier.attempts(), 4);
    assert_eq!(h.engine.followups().pending(), 0);
}

// ============================================================================
// Cancellation and promotion
// ============================================================================

#[tokio::test]
async fn cancelling_the_only_seat_promotes_the_waitlisted_user() {
    let h = Harness::new();
    let event = h.event("Capacity One", 1);
    let alice = h.student("Alice");
    let bob = h.student("Bob");

    let (a, a_tickets) = h.confirmed(&alice, &event, 1).await;
    let b = h.waitlisted(&bob, &event, 1).await;

    let report = h.engine.cancel(&alice, a.id).await.unwrap();

    assert_eq!(report.registration.status, RegistrationStatus::Cancelled);
    assert_eq!(report.released_seats, 1);
    assert_eq!(report.cancelled_tickets, vec![a_tickets[0].id]);
    assert_eq!(report.promotions.len(), 1);
    let promotion = &report.promotions[0];
    assert_eq!(promotion.registration.id, b.id);
    assert_eq!(promotion.registration.status, RegistrationStatus::Confirmed);
    assert_eq!(promotion.tickets.len(), 1);

    assert_eq!(h.store.capacity(event.id), Some(0));
    assert_eq!(h.store.registered_users(event.id), vec![bob.user_id]);
    assert_eq!(
        h.store.ticket(a_tickets[0].id).unwrap().status,
        TicketStatus::Cancelled
    );

    h.engine.followups().settle().await;
    assert!(
        h.store
            .ticket(promotion.tickets[0].id)
            .unwrap()
            .qr_data_url
            .is_some()
    );
    h.store.check_invariants().unwrap();
}

#[tokio::test]
async fn promotion_is_first_fit_in_fifo_order() {
    let h = Harness::new();
    let event = h.event("Two Seats", 2);
    let alice = h.student("Alice");
    let carol = h.student("Carol");
    let w1 = h.student("Wanda");
    let w2 = h.student("Walt");

    let (a, _) = h.confirmed(&alice, &event, 1).await;
    h.confirmed(&carol, &event, 1).await;
    let first = h.waitlisted(&w1, &event, 2).await;
    let second = h.waitlisted(&w2, &event, 1).await;

    let report = h.engine.cancel(&alice, a.id).await.unwrap();

    let promoted: Vec<_> = report.promotions.iter().map(|p| p.registration.id).collect();
    assert_eq!(promoted, vec![second.id]);
    assert_eq!(h.store.capacity(event.id), Some(0));
    assert_eq!(
        h.engine.waitlist(event.id).await.unwrap(),
        vec![h.registration(&event, first.id)]
    );
}

#[tokio::test]
async fn cancelling_a_waitlisted_registration_keeps_capacity() {
    let h = Harness::new();
    let event = h.event("Sold Out", 0);
    let alice = h.student("Alice");

    let waiting = h.waitlisted(&alice, &event, 1).await;
    let report = h.engine.cancel(&alice, waiting.id).await.unwrap();

    assert_eq!(report.released_seats, 0);
    assert!(report.promotions.is_empty());
    assert_eq!(h.store.capacity(event.id), Some(0));
    assert!(h.engine.waitlist(event.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn cancellation_rules() {
    let h = Harness::new();
    let event = h.event("Rules Night", 3);
    let alice = h.student("Alice");
    let mallory = h.student("Mallory");
    let admin = h.person("Ada", Role::Admin);
    let gate = h.person("Gate", Role::Organizer);

    let (a, tickets) = h.confirmed(&alice, &event, 1).await;
    assert_eq!(
        h.engine.cancel(&mallory, a.id).await,
        Err(RegistrationError::NotOwner)
    );

    h.validator
        .scan(tickets[0].code.as_str(), &gate)
        .await
        .unwrap();
    assert_eq!(
        h.engine.cancel(&alice, a.id).await,
        Err(RegistrationError::TicketsAlreadyUsed(a.id))
    );
    assert_eq!(h.store.capacity(event.id), Some(2));

    let (m, _) = h.confirmed(&mallory, &event, 1).await;
    assert!(h.engine.cancel(&admin, m.id).await.is_ok());
    assert_eq!(
        h.engine.cancel(&admin, m.id).await,
        Err(RegistrationError::AlreadyCancelled(m.id))
    );

    let unknown = turnstile_core::RegistrationId::new();
    assert_eq!(
        h.engine.cancel(&admin, unknown).await,
        Err(RegistrationError::RegistrationNotFound(unknown))
    );
}

#[tokio::test]
async fn deleting_a_confirmed_registration_frees_seats_and_promotes() {
    let h = Harness::new();
    let event = h.event("Delete Me", 2);
    let alice = h.student("Alice");
    let bob = h.student("Bob");

    let (a, a_tickets) = h.confirmed(&alice, &event, 2).await;
    let b = h.waitlisted(&bob, &event, 2).await;

    let report = h.engine.delete(a.id).await.unwrap();

    assert_eq!(report.released_seats, 2);
    assert_eq!(report.deleted_tickets.len(), 2);
    assert_eq!(report.promotions[0].registration.id, b.id);
    assert!(h.store.ticket(a_tickets[0].id).is_none());
    assert_eq!(h.store.capacity(event.id), Some(0));
    assert_eq!(
        h.engine.delete(a.id).await.unwrap_err(),
        RegistrationError::RegistrationNotFound(a.id)
    );

    // Deleted codes stay reserved; the old code no longer scans.
    let gate = h.person("Gate", Role::Organizer);
    assert_eq!(
        h.validator.scan(a_tickets[0].code.as_str(), &gate).await,
        Err(ScanError::TicketNotFound)
    );
    h.store.check_invariants().unwrap();
}

#[tokio::test]
async fn explicit_promotion_uses_raised_capacity() {
    let h = Harness::new();
    let event = h.event("Growing Venue", 0);
    let w1 = h.student("Wanda");
    let w2 = h.student("Walt");
    let w3 = h.student("Wes");

    let first = h.waitlisted(&w1, &event, 2).await;
    let second = h.waitlisted(&w2, &event, 2).await;
    let third = h.waitlisted(&w3, &event, 1).await;

    h.store.set_capacity(event.id, 3);
    let promotions = h.engine.promote_waitlist(event.id).await.unwrap();

    let promoted: Vec<_> = promotions.iter().map(|p| p.registration.id).collect();
    assert_eq!(promoted, vec![first.id, third.id]);
    assert_eq!(h.store.capacity(event.id), Some(0));
    assert_eq!(
        h.engine.waitlist(event.id).await.unwrap(),
        vec![h.registration(&event, second.id)]
    );

    let ghost = fixtures::event("Ghost", 1);
    assert_eq!(
        h.engine.promote_waitlist(ghost.id).await,
        Err(RegistrationError::EventNotFound(ghost.id))
    );
}

// ============================================================================
// Read models
// ============================================================================

#[tokio::test]
async fn registration_views_respect_ownership() {
    let h = Harness::new();
    let event = h.event("Open Day", 5);
    let other_event = h.event("Closing Day", 5);
    let alice = h.student("Alice");
    let bob = h.student("Bob");
    let admin = h.person("Ada", Role::Admin);

    let (first, _) = h.confirmed(&alice, &event, 2).await;
    let (second, _) = h.confirmed(&alice, &other_event, 1).await;

    let mine = h.engine.registrations_for(alice.user_id).await.unwrap();
    assert_eq!(
        mine.iter().map(|v| v.registration.id).collect::<Vec<_>>(),
        vec![second.id, first.id]
    );
    assert_eq!(mine[1].tickets.len(), 2);

    assert_eq!(
        h.engine.registration(&bob, first.id).await,
        Err(RegistrationError::NotOwner)
    );
    let view = h.engine.registration(&admin, first.id).await.unwrap();
    assert_eq!(view.registration.id, first.id);
    assert_eq!(view.tickets.len(), 2);

    let ghost = fixtures::event("Ghost", 1);
    assert_eq!(
        h.engine.waitlist(ghost.id).await,
        Err(RegistrationError::EventNotFound(ghost.id))
    );
}

#[tokio::test]
async fn ticket_view_is_for_holder_and_staff() {
    let h = Harness::new();
    let event = h.event("Jazz Night", 2);
    let alice = h.student("Alice");
    let bob = h.student("Bob");
    let organizer = h.person("Olga", Role::Organizer);

    let (_, tickets) = h.confirmed(&alice, &event, 1).await;
    let id = tickets[0].id;

    assert!(h.engine.ticket(&alice, id).await.is_ok());
    assert!(h.engine.ticket(&organizer, id).await.is_ok());
    assert_eq!(h.engine.ticket(&bob, id).await, Err(TicketError::NotOwner));

    let unknown = turnstile_core::TicketId::new();
    assert_eq!(
        h.engine.ticket(&alice, unknown).await,
        Err(TicketError::TicketNotFound(unknown))
    );
}

// ============================================================================
// Scanning
// ============================================================================

#[tokio::test]
async fn second_scan_reports_original_admission_and_current_scanner() {
    let h = Harness::with_codes(&["ABC123"]);
    let event = h.event("Concert", 10);
    let alice = h.student("Alice");
    let first_gate = h.person("Gina", Role::Organizer);
    let second_gate = h.person("Greg", Role::Admin);

    let (_, tickets) = h.confirmed(&alice, &event, 1).await;
    assert_eq!(tickets[0].code.as_str(), "ABC123");

    let t0 = h.clock.now();
    let admitted = h.validator.scan("ABC123", &first_gate).await.unwrap();
    assert_eq!(admitted.ticket_id, tickets[0].id);
    assert_eq!(admitted.attendee_name, "Alice");
    assert_eq!(admitted.attendee_email, "alice@example.edu");
    assert_eq!(admitted.event_title, "Concert");
    assert_eq!(admitted.event_location, "Main Hall");
    assert_eq!(admitted.event_starts_at, event.starts_at);
    assert_eq!(admitted.scanned_at, t0);
    assert_eq!(admitted.scanned_by.user_id, first_gate.user_id);

    h.clock.advance(Duration::minutes(5));
    let Err(ScanError::AlreadyUsed(attempt)) = h.validator.scan("ABC123", &second_gate).await
    else {
        panic!("second scan must be rejected as already used");
    };
    assert_eq!(attempt.ticket_id, tickets[0].id);
    assert_eq!(attempt.scanned_at, Some(t0));
    assert_eq!(attempt.scanned_by, Some(first_gate.user_id));
    assert_eq!(attempt.current_attempt_by.user_id, second_gate.user_id);
    assert_eq!(attempt.current_attempt_by.name, "Greg");
    assert_eq!(attempt.attempted_at, t0 + Duration::minutes(5));

    let stored = h.store.ticket(tickets[0].id).unwrap();
    assert_eq!(stored.status, TicketStatus::Used);
    assert_eq!(stored.scanned_by, Some(first_gate.user_id));

    h.engine.followups().settle().await;
    let alerts = h.notifier.of_kind(NotificationKind::TicketReuseAlert);
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].audience, Audience::Administrators);
    assert_eq!(alerts[0].ticket_id, Some(tickets[0].id));
}

#[tokio::test]
async fn reuse_alerts_can_be_disabled() {
    let h = Harness::with_codes(&["QUIET1"]);
    let store: Arc<dyn RegistrationStore> = Arc::new(h.store.clone());
    let validator = ScanValidator::new(store, Arc::new(h.clock.clone()), h.engine.followups().clone())
        .with_reuse_alerts(false);
    let event = h.event("Library Talk", 1);
    let alice = h.student("Alice");
    let gate = h.person("Gate", Role::Organizer);

    h.confirmed(&alice, &event, 1).await;
    validator.scan("QUIET1", &gate).await.unwrap();
    assert!(matches!(
        validator.scan("QUIET1", &gate).await,
        Err(ScanError::AlreadyUsed(_))
    ));

    h.engine.followups().settle().await;
    assert!(h.notifier.of_kind(NotificationKind::TicketReuseAlert).is_empty());
}

#[tokio::test]
async fn expired_ticket_is_never_admitted_until_refreshed() {
    let h = Harness::new();
    let event = h.event("Late Show", 1);
    let alice = h.student("Alice");
    let gate = h.person("Gate", Role::Organizer);

    let (_, tickets) = h.confirmed(&alice, &event, 1).await;
    let ticket = &tickets[0];

    // Exactly at the boundary the ticket is still admissible; one second past it is not.
    h.clock.set(ticket.qr_expires_at + Duration::seconds(1));
    let Err(ScanError::QrExpired {
        ticket_id,
        expired_at,
    }) = h.validator.scan(ticket.code.as_str(), &gate).await
    else {
        panic!("expired QR must be rejected");
    };
    assert_eq!(ticket_id, ticket.id);
    assert_eq!(expired_at, ticket.qr_expires_at);
    assert_eq!(h.store.ticket(ticket.id).unwrap().status, TicketStatus::Valid);

    let refreshed = h.engine.refresh_qr(&alice, ticket.id).await.unwrap();
    assert_eq!(refreshed.qr_expires_at, h.clock.now() + Duration::hours(24));
    assert!(refreshed.qr_data_url.is_some());

    assert!(h.validator.scan(ticket.code.as_str(), &gate).await.is_ok());
}

#[tokio::test]
async fn boundary_instant_is_admitted() {
    let h = Harness::new();
    let event = h.event("Midnight", 1);
    let alice = h.student("Alice");
    let gate = h.person("Gate", Role::Organizer);

    let (_, tickets) = h.confirmed(&alice, &event, 1).await;
    h.clock.set(tickets[0].qr_expires_at);

    assert!(h.validator.scan(tickets[0].code.as_str(), &gate).await.is_ok());
}

#[tokio::test]
async fn used_ticket_reports_reuse_even_after_expiry() {
    let h = Harness::new();
    let event = h.event("Festival", 1);
    let alice = h.student("Alice");
    let gate = h.person("Gate", Role::Organizer);

    let (_, tickets) = h.confirmed(&alice, &event, 1).await;
    h.validator
        .scan(tickets[0].code.as_str(), &gate)
        .await
        .unwrap();
    h.clock.advance(Duration::days(3));

    assert!(matches!(
        h.validator.scan(tickets[0].code.as_str(), &gate).await,
        Err(ScanError::AlreadyUsed(_))
    ));
}

#[tokio::test]
async fn cancelled_tickets_are_refused_at_the_gate() {
    let h = Harness::new();
    let event = h.event("Workshop", 2);
    let alice = h.student("Alice");
    let gate = h.person("Gate", Role::Organizer);

    let (_, tickets) = h.confirmed(&alice, &event, 2).await;
    let cancelled = h.engine.cancel_ticket(tickets[0].id).await.unwrap();
    assert_eq!(cancelled.status, TicketStatus::Cancelled);
    // Single-ticket cancellation does not return the seat.
    assert_eq!(h.store.capacity(event.id), Some(0));

    assert_eq!(
        h.validator.scan(tickets[0].code.as_str(), &gate).await,
        Err(ScanError::TicketCancelled {
            ticket_id: tickets[0].id
        })
    );
    assert_eq!(
        h.engine.cancel_ticket(tickets[0].id).await,
        Err(TicketError::NotCancellable {
            id: tickets[0].id,
            status: TicketStatus::Cancelled
        })
    );
    assert!(matches!(
        h.engine.refresh_qr(&alice, tickets[0].id).await,
        Err(TicketError::NotRefreshable { .. })
    ));

    assert!(h.validator.scan(tickets[1].code.as_str(), &gate).await.is_ok());
    assert_eq!(
        h.engine.cancel_ticket(tickets[1].id).await,
        Err(TicketError::NotCancellable {
            id: tickets[1].id,
            status: TicketStatus::Used
        })
    );
}

#[tokio::test]
async fn refresh_is_for_holder_or_admin() {
    let h = Harness::new();
    let event = h.event("Refresh", 1);
    let alice = h.student("Alice");
    let organizer = h.person("Olga", Role::Organizer);
    let admin = h.person("Ada", Role::Admin);

    let (_, tickets) = h.confirmed(&alice, &event, 1).await;

    assert_eq!(
        h.engine.refresh_qr(&organizer, tickets[0].id).await,
        Err(TicketError::NotOwner)
    );
    assert!(h.engine.refresh_qr(&admin, tickets[0].id).await.is_ok());
}

#[tokio::test]
async fn blank_and_unknown_codes() {
    let h = Harness::new();
    let gate = h.person("Gate", Role::Organizer);

    assert_eq!(h.validator.scan("   ", &gate).await, Err(ScanError::MissingCode));
    assert_eq!(
        h.validator.scan("NOPE", &gate).await,
        Err(ScanError::TicketNotFound)
    );
}

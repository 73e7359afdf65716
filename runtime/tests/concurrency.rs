//! Contention tests: capacity conservation and exclusive admission.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use proptest::prelude::*;
use std::sync::Arc;
use turnstile_core::directory::Role;
use turnstile_core::error::RegistrationError;
use turnstile_core::issuance::TicketIssuer;
use turnstile_core::scan::ScanError;
use turnstile_core::store::{NewRegistration, RegistrationStore};
use turnstile_core::types::{EventSummary, Quantity, RegistrationStatus};
use turnstile_runtime::{FollowUps, Registered, RegistrationEngine, ScanValidator};
use turnstile_testing::{
    InMemoryRegistrationStore, RecordingNotifier, SequentialCodeGenerator, StubQrRenderer,
    fixtures, properties, test_clock,
};

fn services(store: &InMemoryRegistrationStore) -> (Arc<RegistrationEngine>, Arc<ScanValidator>) {
    let shared: Arc<dyn RegistrationStore> = Arc::new(store.clone());
    let clock = Arc::new(test_clock());
    let followups = FollowUps::new(
        Arc::clone(&shared),
        Arc::new(StubQrRenderer),
        Arc::new(RecordingNotifier::new()),
    );
    let issuer = TicketIssuer::new(Arc::new(SequentialCodeGenerator::new()), clock.clone());
    let engine = RegistrationEngine::new(Arc::clone(&shared), issuer, followups.clone());
    let validator = ScanValidator::new(shared, clock, followups);
    (Arc::new(engine), Arc::new(validator))
}

/// Seats held by confirmed registrations plus remaining capacity.
fn accounted_seats(store: &InMemoryRegistrationStore, event: &EventSummary) -> u32 {
    let held: u32 = store
        .registrations_for_event(event.id)
        .iter()
        .filter(|r| r.status == RegistrationStatus::Confirmed)
        .map(|r| r.quantity.get())
        .sum();
    held + store.capacity(event.id).unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_registrations_never_oversell() {
    let store = InMemoryRegistrationStore::new();
    let event = fixtures::event("Launch Party", 10);
    store.insert_event(event.clone());
    let (engine, _) = services(&store);

    let mut handles = Vec::new();
    for i in 0..40u32 {
        let user = fixtures::user(&format!("Student {i}"));
        store.insert_user(user.clone());
        let engine = Arc::clone(&engine);
        let event_id = event.id;
        handles.push(tokio::spawn(async move {
            engine
                .register(NewRegistration {
                    user_id: user.id,
                    event_id,
                    quantity: Quantity::new(i % 3 + 1).unwrap(),
                })
                .await
        }));
    }

    let mut confirmed_seats = 0;
    for handle in handles {
        match handle.await.unwrap().unwrap() {
            Registered::Confirmed {
                registration,
                tickets,
            } => {
                assert_eq!(tickets.len() as u32, registration.quantity.get());
                confirmed_seats += registration.quantity.get();
            },
            Registered::Waitlisted { .. } => {},
        }
    }

    assert!(confirmed_seats <= 10);
    assert_eq!(accounted_seats(&store, &event), 10);
    assert_eq!(store.ticket_count() as u32, confirmed_seats);
    store.check_invariants().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_duplicates_create_one_registration() {
    let store = InMemoryRegistrationStore::new();
    let event = fixtures::event("Hot Ticket", 5);
    store.insert_event(event.clone());
    let user = fixtures::user("Eager");
    store.insert_user(user.clone());
    let (engine, _) = services(&store);

    let mut handles = Vec::new();
    for _ in 0..16 {
        let engine = Arc::clone(&engine);
        let request = NewRegistration {
            user_id: user.id,
            event_id: event.id,
            quantity: Quantity::new(2).unwrap(),
        };
        handles.push(tokio::spawn(async move { engine.register(request).await }));
    }

    let mut created = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => created += 1,
            Err(RegistrationError::AlreadyRegistered(_)) => {},
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(created, 1);
    assert_eq!(store.capacity(event.id), Some(3));
    assert_eq!(store.registrations_for_event(event.id).len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_scans_admit_exactly_once() {
    let store = InMemoryRegistrationStore::new();
    let event = fixtures::event("Gate Rush", 1);
    store.insert_event(event.clone());
    let holder = fixtures::user("Holder");
    store.insert_user(holder.clone());
    let (engine, validator) = services(&store);

    let Registered::Confirmed { tickets, .. } = engine
        .register(NewRegistration {
            user_id: holder.id,
            event_id: event.id,
            quantity: Quantity::ONE,
        })
        .await
        .unwrap()
    else {
        panic!("capacity was available");
    };
    let code = tickets[0].code.as_str().to_string();

    let mut handles = Vec::new();
    for i in 0..16 {
        let gate = fixtures::principal(&fixtures::user(&format!("Gate {i}")), Role::Organizer);
        let validator = Arc::clone(&validator);
        let code = code.clone();
        handles.push(tokio::spawn(async move { validator.scan(&code, &gate).await }));
    }

    let mut admitted = 0;
    let mut rejected = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => admitted += 1,
            Err(ScanError::AlreadyUsed(_)) => rejected += 1,
            Err(other) => panic!("unexpected scan error: {other}"),
        }
    }

    assert_eq!(admitted, 1);
    assert_eq!(rejected, 15);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn capacity_is_conserved_across_register_and_cancel(
        capacity in 0u32..8,
        batch in properties::request_batch(6, 3, 20),
        cancel_mask in prop::collection::vec(any::<bool>(), 20),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        runtime.block_on(async {
            let store = InMemoryRegistrationStore::new();
            let event = fixtures::event("Property Night", capacity);
            store.insert_event(event.clone());
            let users: Vec<_> = (0..6).map(|i| {
                let profile = fixtures::user(&format!("User {i}"));
                store.insert_user(profile.clone());
                fixtures::principal(&profile, Role::Student)
            }).collect();
            let (engine, _) = services(&store);

            for (step, (user, quantity)) in batch.into_iter().enumerate() {
                let principal = &users[user];
                let result = engine.register(NewRegistration {
                    user_id: principal.user_id,
                    event_id: event.id,
                    quantity,
                }).await;

                if let Ok(registered) = result {
                    if cancel_mask[step] {
                        engine.cancel(principal, registered.registration().id).await.unwrap();
                    }
                }

                prop_assert_eq!(accounted_seats(&store, &event), capacity);
                prop_assert!(store.check_invariants().is_ok());
            }

            // Nothing left on the waitlist could fit into the remaining seats.
            let remaining = store.capacity(event.id).unwrap();
            let waitlist = engine.waitlist(event.id).await.unwrap();
            prop_assert!(waitlist.iter().all(|r| r.quantity.get() > remaining));
            Ok(())
        })?;
    }
}

//! # Turnstile Testing
//!
//! Testing utilities for the registration engine.
//!
//! This crate provides:
//! - [`InMemoryRegistrationStore`]: a serializable, rollback-capable store
//! - Mock collaborators: clock, code generators, QR renderers, notifier,
//!   session directory
//! - Fixture builders and proptest strategies
//!
//! ## Example
//!
//! ```
//! use turnstile_testing::{InMemoryRegistrationStore, fixtures};
//!
//! let store = InMemoryRegistrationStore::new();
//! let event = fixtures::event("Robotics Night", 2);
//! store.insert_event(event.clone());
//! assert_eq!(store.capacity(event.id), Some(2));
//! ```

use chrono::{DateTime, Duration, Utc};
use turnstile_core::environment::Clock;

pub mod directory;
pub mod fixtures;
pub mod notifier;
pub mod store;

pub use directory::InMemorySessionDirectory;
pub use notifier::RecordingNotifier;
pub use store::InMemoryRegistrationStore;

/// Mock implementations of environment traits and collaborators
pub mod mocks {
    #![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity

    use super::{Clock, DateTime, Duration, Utc};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::{Arc, Mutex, RwLock};
    use turnstile_core::issuance::ScanCodeGenerator;
    use turnstile_core::qr::{QrError, QrRenderer};
    use turnstile_core::types::ScanCode;

    /// Fixed clock for deterministic tests
    ///
    /// Returns the same time until moved with [`FixedClock::advance`] or
    /// [`FixedClock::set`]. Clones share the same time.
    ///
    /// # Example
    ///
    /// ```
    /// use turnstile_testing::mocks::FixedClock;
    /// use turnstile_core::environment::Clock;
    /// use chrono::{Duration, Utc};
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let before = clock.now();
    /// assert_eq!(before, clock.now());
    ///
    /// clock.advance(Duration::hours(25));
    /// assert_eq!(clock.now() - before, Duration::hours(25));
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: Arc<RwLock<DateTime<Utc>>>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Arc::new(RwLock::new(time)),
            }
        }

        /// Move the clock forward.
        pub fn advance(&self, by: Duration) {
            let mut time = self.time.write().unwrap();
            *time += by;
        }

        /// Jump to an absolute time.
        pub fn set(&self, to: DateTime<Utc>) {
            *self.time.write().unwrap() = to;
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            *self.time.read().unwrap()
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }

    /// Predictable codes: `CODE-000001`, `CODE-000002`, ...
    #[derive(Debug, Default)]
    pub struct SequentialCodeGenerator {
        next: AtomicU64,
    }

    impl SequentialCodeGenerator {
        /// Start at `CODE-000001`.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl ScanCodeGenerator for SequentialCodeGenerator {
        fn generate(&self) -> ScanCode {
            let n = self.next.fetch_add(1, Ordering::SeqCst) + 1;
            ScanCode::new(format!("CODE-{n:06}"))
        }
    }

    /// Hands out a fixed script of codes first, then falls back to
    /// [`SequentialCodeGenerator`]. Used to force collisions.
    #[derive(Debug, Default)]
    pub struct ScriptedCodeGenerator {
        script: Mutex<VecDeque<String>>,
        fallback: SequentialCodeGenerator,
    }

    impl ScriptedCodeGenerator {
        /// Generator that emits `codes` in order before falling back.
        #[must_use]
        pub fn new<I, S>(codes: I) -> Self
        where
            I: IntoIterator<Item = S>,
            S: Into<String>,
        {
            Self {
                script: Mutex::new(codes.into_iter().map(Into::into).collect()),
                fallback: SequentialCodeGenerator::new(),
            }
        }

        /// Codes still waiting in the script.
        #[must_use]
        pub fn remaining(&self) -> usize {
            self.script.lock().unwrap().len()
        }
    }

    impl ScanCodeGenerator for ScriptedCodeGenerator {
        fn generate(&self) -> ScanCode {
            let scripted = self.script.lock().unwrap().pop_front();
            scripted.map_or_else(|| self.fallback.generate(), ScanCode::new)
        }
    }

    /// Renders `data:text/plain,<code>`; enough to assert which code went in.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct StubQrRenderer;

    impl QrRenderer for StubQrRenderer {
        fn render(&self, code: &ScanCode) -> Result<String, QrError> {
            Ok(format!("data:text/plain,{code}"))
        }
    }

    /// Always fails.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct FailingQrRenderer;

    impl QrRenderer for FailingQrRenderer {
        fn render(&self, _code: &ScanCode) -> Result<String, QrError> {
            Err(QrError::Encoding("renderer offline".to_string()))
        }
    }
}

/// Property-based testing strategies
pub mod properties {
    use proptest::prelude::*;
    use turnstile_core::types::Quantity;

    /// Seat quantities between 1 and `max` inclusive.
    ///
    /// # Panics
    ///
    /// Never; the strategy only yields positive values.
    #[allow(clippy::expect_used)]
    pub fn quantity(max: u32) -> impl Strategy<Value = Quantity> {
        (1..=max.max(1)).prop_map(|n| Quantity::new(n).expect("strategy yields positive values"))
    }

    /// A batch of registration requests as `(user index, quantity)` pairs
    /// against one event with the given number of distinct users.
    pub fn request_batch(
        users: usize,
        max_quantity: u32,
        len: usize,
    ) -> impl Strategy<Value = Vec<(usize, Quantity)>> {
        prop::collection::vec((0..users.max(1), quantity(max_quantity)), 0..=len)
    }
}

/// Install a `tracing` subscriber that writes through the test harness.
///
/// Safe to call from every test; only the first call installs anything.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

// Re-export commonly used items
pub use mocks::{
    FailingQrRenderer, FixedClock, ScriptedCodeGenerator, SequentialCodeGenerator,
    StubQrRenderer, test_clock,
};

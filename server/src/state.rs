//! Application state for the HTTP server.
//!
//! Handlers get the registration engine and the scan validator; the auth
//! extractors get the session directory; the readiness probe gets the store.

use crate::config::Config;
use axum::extract::FromRef;
use std::sync::Arc;
use std::time::Duration;
use turnstile_core::directory::SessionDirectory;
use turnstile_core::environment::{Clock, SystemClock};
use turnstile_core::issuance::{RandomCodeGenerator, ScanCodeGenerator, TicketIssuer};
use turnstile_core::notification::Notifier;
use turnstile_core::qr::QrRenderer;
use turnstile_core::store::RegistrationStore;
use turnstile_runtime::{
    EngineConfig, FollowUps, RegistrationEngine, RetryPolicy, ScanValidator, SvgQrRenderer,
};

/// External collaborators the services are built from.
#[derive(Clone)]
pub struct Collaborators {
    /// Registration and ticket persistence
    pub store: Arc<dyn RegistrationStore>,
    /// Bearer token resolution
    pub sessions: Arc<dyn SessionDirectory>,
    /// Notification sink
    pub notifier: Arc<dyn Notifier>,
    /// QR image renderer
    pub renderer: Arc<dyn QrRenderer>,
    /// Time source for issuance and scans
    pub clock: Arc<dyn Clock>,
    /// Scan code source
    pub codes: Arc<dyn ScanCodeGenerator>,
}

impl Collaborators {
    /// Production collaborators: system clock, random codes, SVG QR images.
    #[must_use]
    pub fn new(
        store: Arc<dyn RegistrationStore>,
        sessions: Arc<dyn SessionDirectory>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            sessions,
            notifier,
            renderer: Arc::new(SvgQrRenderer::default()),
            clock: Arc::new(SystemClock),
            codes: Arc::new(RandomCodeGenerator::default()),
        }
    }
}

/// Application state shared across all HTTP handlers.
///
/// Cloned per request; every field is an `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Registration, cancellation, promotion and ticket administration
    pub engine: Arc<RegistrationEngine>,
    /// Gate-side scan validation
    pub validator: Arc<ScanValidator>,
    /// Bearer token resolution for the auth extractors
    pub sessions: Arc<dyn SessionDirectory>,
    /// Store handle for the readiness probe
    pub store: Arc<dyn RegistrationStore>,
}

impl AppState {
    /// Wire the services from `collaborators` using the ticket and
    /// notification settings in `config`.
    #[must_use]
    pub fn new(collaborators: Collaborators, config: &Config) -> Self {
        let Collaborators {
            store,
            sessions,
            notifier,
            renderer,
            clock,
            codes,
        } = collaborators;

        let retry = RetryPolicy::builder()
            .max_retries(config.notifications.max_retries)
            .initial_delay(Duration::from_millis(config.notifications.initial_delay_ms))
            .build();
        let followups = FollowUps::new(Arc::clone(&store), renderer, notifier).with_retry(retry);

        let issuer = TicketIssuer::new(codes, Arc::clone(&clock))
            .with_qr_ttl(config.tickets.qr_ttl());
        let engine = RegistrationEngine::new(Arc::clone(&store), issuer, followups.clone())
            .with_config(EngineConfig {
                max_quantity: config.tickets.max_quantity,
                code_attempts: config.tickets.code_attempts,
            });
        let validator = ScanValidator::new(Arc::clone(&store), clock, followups)
            .with_reuse_alerts(config.notifications.scan_reuse_alerts);

        Self {
            engine: Arc::new(engine),
            validator: Arc::new(validator),
            sessions,
            store,
        }
    }

    /// Background QR rendering and notification delivery.
    #[must_use]
    pub fn followups(&self) -> &FollowUps {
        self.engine.followups()
    }
}

impl FromRef<AppState> for Arc<dyn SessionDirectory> {
    fn from_ref(state: &AppState) -> Self {
        Arc::clone(&state.sessions)
    }
}

impl FromRef<AppState> for Arc<dyn RegistrationStore> {
    fn from_ref(state: &AppState) -> Self {
        Arc::clone(&state.store)
    }
}

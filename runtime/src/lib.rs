//! # Turnstile Runtime
//!
//! Services that drive the registration and ticket lifecycle on top of a
//! [`RegistrationStore`](turnstile_core::store::RegistrationStore).
//!
//! ## Core Components
//!
//! - **[`RegistrationEngine`]**: register, cancel, delete, promote the waitlist,
//!   ticket administration and read models
//! - **[`ScanValidator`]**: scan codes at the gate, admit exactly once, raise
//!   re-use alerts
//! - **[`FollowUps`]**: post-commit QR rendering and notification delivery,
//!   isolated from the request that triggered them
//!
//! ## Example
//!
//! ```ignore
//! use turnstile_runtime::{FollowUps, RegistrationEngine, ScanValidator, SvgQrRenderer, TracingNotifier};
//!
//! let followups = FollowUps::new(store.clone(), Arc::new(SvgQrRenderer::default()), Arc::new(TracingNotifier));
//! let engine = RegistrationEngine::new(store.clone(), issuer, followups.clone());
//! let validator = ScanValidator::new(store, clock, followups);
//!
//! let registered = engine.register(request).await?;
//! let admitted = validator.scan("ABC123", &staff).await?;
//! ```

/// Registration engine and waitlist promoter
pub mod engine;

/// Background QR rendering and notification delivery
pub mod followup;

/// Prometheus metrics for observability
pub mod metrics;

/// Log-only notification sink
pub mod notify;

/// SVG QR rendering
pub mod qr;

/// Retry logic with exponential backoff
pub mod retry;

/// Scan validation
pub mod validator;

pub use engine::{EngineConfig, Registered, RegistrationEngine, RegistrationView};
pub use followup::FollowUps;
pub use notify::TracingNotifier;
pub use qr::SvgQrRenderer;
pub use retry::RetryPolicy;
pub use validator::ScanValidator;

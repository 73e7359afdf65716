//! Prometheus metrics for registrations, tickets and scans.
//!
//! # Exported Metrics
//!
//! ## Counters
//! - `turnstile_registrations_total{status}`: confirmed, waitlisted, duplicate, failed
//! - `turnstile_tickets_issued_total`
//! - `turnstile_waitlist_promotions_total`
//! - `turnstile_scans_total{result}`: valid, already_used, expired, cancelled, not_found
//! - `turnstile_ticket_reuse_alerts_total`
//! - `turnstile_qr_render_failures_total`
//! - `turnstile_notification_failures_total`
//! - `turnstile_code_collisions_total`
//!
//! ## Histograms
//! - `turnstile_registration_duration_seconds`
//!
//! # Example
//!
//! ```rust,no_run
//! use turnstile_runtime::metrics::MetricsServer;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//! let _text = server.render();
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

pub use metrics::{counter, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus recorder plus the address its scrape endpoint is served on.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server for `addr`.
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Scrape address.
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Describe all metrics and install the Prometheus recorder.
    ///
    /// A recorder that is already installed (tests) is tolerated with a
    /// warning; [`Self::render`] then returns `None`.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError`] if the exporter cannot be built or installed.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!(addr = %self.addr, "Metrics recorder installed");
                Ok(())
            },
            Err(e) => {
                let message = e.to_string();
                if message.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(message))
                }
            },
        }
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus text format.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
pub fn register_metrics() {
    describe_counter!(
        "turnstile_registrations_total",
        "Registration attempts by outcome (confirmed, waitlisted, duplicate, failed)"
    );
    describe_counter!(
        "turnstile_tickets_issued_total",
        "Tickets issued at registration or promotion"
    );
    describe_counter!(
        "turnstile_waitlist_promotions_total",
        "Waitlisted registrations confirmed"
    );
    describe_counter!(
        "turnstile_scans_total",
        "Scan attempts by result (valid, already_used, expired, cancelled, not_found)"
    );
    describe_counter!(
        "turnstile_ticket_reuse_alerts_total",
        "Used tickets presented again"
    );
    describe_counter!(
        "turnstile_qr_render_failures_total",
        "QR renderings that failed after commit"
    );
    describe_counter!(
        "turnstile_notification_failures_total",
        "Notifications dropped after retries"
    );
    describe_counter!(
        "turnstile_code_collisions_total",
        "Scan code collisions that forced a retry"
    );
    describe_histogram!(
        "turnstile_registration_duration_seconds",
        "Time to commit a registration"
    );
}

/// Registration outcome recorder.
pub struct RegistrationMetrics;

impl RegistrationMetrics {
    /// Record a committed or rejected registration.
    pub fn record(status: &'static str, duration: Duration) {
        counter!("turnstile_registrations_total", "status" => status).increment(1);
        histogram!("turnstile_registration_duration_seconds").record(duration.as_secs_f64());
    }

    /// Record issued tickets.
    pub fn record_tickets(count: usize) {
        counter!("turnstile_tickets_issued_total").increment(count as u64);
    }

    /// Record waitlist promotions.
    pub fn record_promotions(count: usize) {
        counter!("turnstile_waitlist_promotions_total").increment(count as u64);
    }

    /// Record a scan code collision.
    pub fn record_collision() {
        counter!("turnstile_code_collisions_total").increment(1);
    }
}

/// Scan outcome recorder.
pub struct ScanMetrics;

impl ScanMetrics {
    /// Record a scan by result label.
    pub fn record(result: &'static str) {
        counter!("turnstile_scans_total", "result" => result).increment(1);
    }

    /// Record a re-use alert.
    pub fn record_reuse_alert() {
        counter!("turnstile_ticket_reuse_alerts_total").increment(1);
    }
}

/// Background follow-up failure recorder.
pub struct FollowUpMetrics;

impl FollowUpMetrics {
    /// Record a failed QR rendering.
    pub fn record_qr_failure() {
        counter!("turnstile_qr_render_failures_total").increment(1);
    }

    /// Record a dropped notification.
    pub fn record_notification_failure() {
        counter!("turnstile_notification_failures_total").increment(1);
    }
}

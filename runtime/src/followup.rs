//! Post-commit background work: QR rendering and notifications.
//!
//! Both run after the transaction that created the tickets has committed.
//! They never hold the request open and never roll anything back; failures
//! end in a log line and a counter. Tasks are tracked so that tests and
//! graceful shutdown can wait for them to finish.

use crate::metrics::FollowUpMetrics;
use crate::retry::{RetryPolicy, retry_transient};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tracing::Instrument;
use turnstile_core::notification::{Notification, Notifier, NotifyError};
use turnstile_core::qr::QrRenderer;
use turnstile_core::store::RegistrationStore;
use turnstile_core::types::Ticket;

/// Spawns and tracks post-commit tasks.
#[derive(Clone)]
pub struct FollowUps {
    store: Arc<dyn RegistrationStore>,
    renderer: Arc<dyn QrRenderer>,
    notifier: Arc<dyn Notifier>,
    retry: RetryPolicy,
    pending: Arc<AtomicUsize>,
    completion: Arc<watch::Sender<()>>,
}

impl FollowUps {
    /// Create an executor writing QR images back into `store`.
    #[must_use]
    pub fn new(
        store: Arc<dyn RegistrationStore>,
        renderer: Arc<dyn QrRenderer>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let (completion, _) = watch::channel(());
        Self {
            store,
            renderer,
            notifier,
            retry: RetryPolicy::default(),
            pending: Arc::new(AtomicUsize::new(0)),
            completion: Arc::new(completion),
        }
    }

    /// Override the notification retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Renderer used for QR images.
    #[must_use]
    pub fn renderer(&self) -> &dyn QrRenderer {
        self.renderer.as_ref()
    }

    /// Tasks still running.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Render and attach a QR image for each ticket.
    pub fn render_qr(&self, tickets: Vec<Ticket>) {
        if tickets.is_empty() {
            return;
        }
        let store = Arc::clone(&self.store);
        let renderer = Arc::clone(&self.renderer);
        let span = tracing::info_span!("render_qr", tickets = tickets.len());

        self.spawn(
            async move {
                for ticket in tickets {
                    let data_url = match renderer.render(&ticket.code) {
                        Ok(url) => url,
                        Err(e) => {
                            FollowUpMetrics::record_qr_failure();
                            tracing::warn!(ticket_id = %ticket.id, error = %e, "QR rendering failed; ticket still scannable");
                            continue;
                        },
                    };
                    match store.attach_qr(ticket.id, data_url, None).await {
                        Ok(true) => tracing::debug!(ticket_id = %ticket.id, "QR attached"),
                        Ok(false) => {
                            tracing::debug!(ticket_id = %ticket.id, "Ticket no longer valid, QR discarded");
                        },
                        Err(e) => {
                            FollowUpMetrics::record_qr_failure();
                            tracing::warn!(ticket_id = %ticket.id, error = %e, "Failed to store QR");
                        },
                    }
                }
            }
            .instrument(span),
        );
    }

    /// Deliver a notification with retries.
    pub fn notify(&self, notification: Notification) {
        let notifier = Arc::clone(&self.notifier);
        let retry = self.retry.clone();
        let span = tracing::info_span!(
            "notify",
            kind = notification.kind.as_str(),
            notification_id = %notification.id
        );

        self.spawn(
            async move {
                let result = retry_transient(
                    &retry,
                    "notify",
                    || notifier.deliver(notification.clone()),
                    NotifyError::is_transient,
                )
                .await;
                if let Err(e) = result {
                    FollowUpMetrics::record_notification_failure();
                    tracing::warn!(error = %e, "Notification dropped");
                }
            }
            .instrument(span),
        );
    }

    /// Wait until every spawned task has finished.
    pub async fn settle(&self) {
        let mut rx = self.completion.subscribe();
        while self.pending.load(Ordering::SeqCst) > 0 {
            if rx.changed().await.is_err() {
                break;
            }
        }
    }

    /// Wait for pending tasks, giving up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns the number of tasks still running when the timeout expires.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), usize> {
        tracing::info!(pending = self.pending(), "Waiting for background follow-ups");
        if tokio::time::timeout(timeout, self.settle()).await.is_ok() {
            Ok(())
        } else {
            let pending = self.pending();
            tracing::error!(pending, "Shutdown timeout: follow-ups still running");
            Err(pending)
        }
    }

    fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.pending.fetch_add(1, Ordering::SeqCst);
        let guard = PendingGuard {
            pending: Arc::clone(&self.pending),
            completion: Arc::clone(&self.completion),
        };
        tokio::spawn(async move {
            let _guard = guard;
            task.await;
        });
    }
}

impl std::fmt::Debug for FollowUps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FollowUps")
            .field("pending", &self.pending())
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

/// Decrements the pending count on drop, even if the task panicked.
struct PendingGuard {
    pending: Arc<AtomicUsize>,
    completion: Arc<watch::Sender<()>>,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        if self.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.completion.send_replace(());
        }
    }
}

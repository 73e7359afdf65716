//! Notifier that records deliveries and can be told to fail.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use turnstile_core::notification::{Notification, NotificationKind, Notifier, NotifyError};

#[derive(Debug, Default)]
struct Inner {
    delivered: Vec<Notification>,
    attempts: usize,
    failures_left: usize,
    failure: Option<NotifyError>,
}

/// Records every delivered notification.
///
/// # Example
///
/// ```
/// use turnstile_testing::RecordingNotifier;
/// use turnstile_core::notification::NotifyError;
///
/// let notifier = RecordingNotifier::new();
/// notifier.fail_times(2, NotifyError::Unavailable("smtp down".into()));
/// assert!(notifier.delivered().is_empty());
/// ```
#[derive(Clone, Debug, Default)]
pub struct RecordingNotifier {
    inner: Arc<Mutex<Inner>>,
}

impl RecordingNotifier {
    /// Create a notifier that accepts everything
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `times` deliveries with `error`.
    pub fn fail_times(&self, times: usize, error: NotifyError) {
        let mut inner = self.inner.lock().unwrap();
        inner.failures_left = times;
        inner.failure = Some(error);
    }

    /// Successfully delivered notifications, in order.
    #[must_use]
    pub fn delivered(&self) -> Vec<Notification> {
        self.inner.lock().unwrap().delivered.clone()
    }

    /// Delivered notifications of one kind.
    #[must_use]
    pub fn of_kind(&self, kind: NotificationKind) -> Vec<Notification> {
        self.delivered()
            .into_iter()
            .filter(|n| n.kind == kind)
            .collect()
    }

    /// Delivery attempts, successful or not.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.inner.lock().unwrap().attempts
    }
}

impl Notifier for RecordingNotifier {
    fn deliver(
        &self,
        notification: Notification,
    ) -> Pin<Box<dyn Future<Output = Result<(), NotifyError>> + Send + '_>> {
        Box::pin(async move {
            let mut inner = self.inner.lock().unwrap();
            inner.attempts += 1;
            if inner.failures_left > 0 {
                inner.failures_left -= 1;
                if let Some(error) = inner.failure.clone() {
                    return Err(error);
                }
            }
            inner.delivered.push(notification);
            Ok(())
        })
    }
}

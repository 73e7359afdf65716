//! Log-only notification sink.

use std::future::Future;
use std::pin::Pin;
use turnstile_core::notification::{Audience, Notification, Notifier, NotifyError};

/// Writes each notification as a structured `info` line. Never fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn deliver(
        &self,
        notification: Notification,
    ) -> Pin<Box<dyn Future<Output = Result<(), NotifyError>> + Send + '_>> {
        Box::pin(async move {
            let recipient = match notification.audience {
                Audience::User(user_id) => user_id.to_string(),
                Audience::Administrators => "administrators".to_string(),
            };
            tracing::info!(
                notification_id = %notification.id,
                kind = notification.kind.as_str(),
                recipient,
                event_id = %notification.event_id,
                message = %notification.message,
                "Notification"
            );
            Ok(())
        })
    }
}

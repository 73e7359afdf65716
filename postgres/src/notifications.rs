//! Append-only notification log.
//!
//! Stands in for an email or push transport: every delivery becomes a row
//! that a mailer or the user's inbox view can read later.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use std::future::Future;
use std::pin::Pin;
use turnstile_core::error::StoreError;
use turnstile_core::notification::{Audience, Notification, NotificationKind, Notifier, NotifyError};
use turnstile_core::types::{EventId, UserId};
use uuid::Uuid;

/// A delivered notification as read back from the log.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoggedNotification {
    /// Notification ID
    pub id: Uuid,
    /// Kind, in storage form (e.g. `registration_confirmed`)
    pub kind: String,
    /// Related event
    pub event_id: EventId,
    /// Message text
    pub message: String,
    /// When the notification was raised
    pub created_at: DateTime<Utc>,
}

/// [`Notifier`] that appends to the `notifications` table.
#[derive(Clone, Debug)]
pub struct PostgresNotificationLog {
    pool: PgPool,
}

impl PostgresNotificationLog {
    /// Share an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Notifications addressed to one user, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on failure.
    pub async fn for_recipient(&self, user_id: UserId) -> Result<Vec<LoggedNotification>, StoreError> {
        let rows = sqlx::query(
            r"
            SELECT id, kind, event_id, message, created_at
            FROM notifications
            WHERE recipient_id = $1
            ORDER BY created_at DESC, recorded_at DESC
            ",
        )
        .bind(user_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(crate::rows::db)?;

        rows.iter()
            .map(|row| {
                Ok(LoggedNotification {
                    id: row.try_get("id")?,
                    kind: row.try_get("kind")?,
                    event_id: EventId::from_uuid(row.try_get("event_id")?),
                    message: row.try_get("message")?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(|e| StoreError::Corrupt(e.to_string()))
    }

    /// Number of logged notifications of one kind.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on failure.
    pub async fn count(&self, kind: NotificationKind) -> Result<i64, StoreError> {
        sqlx::query("SELECT COUNT(*) AS n FROM notifications WHERE kind = $1")
            .bind(kind.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(crate::rows::db)?
            .try_get("n")
            .map_err(|e| StoreError::Corrupt(e.to_string()))
    }
}

impl Notifier for PostgresNotificationLog {
    fn deliver(
        &self,
        notification: Notification,
    ) -> Pin<Box<dyn Future<Output = Result<(), NotifyError>> + Send + '_>> {
        Box::pin(async move {
            let (audience, recipient) = match notification.audience {
                Audience::User(user_id) => ("user", Some(*user_id.as_uuid())),
                Audience::Administrators => ("administrators", None),
            };

            // Retried deliveries reuse the notification ID.
            sqlx::query(
                r"
                INSERT INTO notifications (
                    id, kind, audience, recipient_id, event_id, registration_id, ticket_id,
                    message, created_at
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                ON CONFLICT (id) DO NOTHING
                ",
            )
            .bind(notification.id)
            .bind(notification.kind.as_str())
            .bind(audience)
            .bind(recipient)
            .bind(notification.event_id.as_uuid())
            .bind(notification.registration_id.map(|id| *id.as_uuid()))
            .bind(notification.ticket_id.map(|id| *id.as_uuid()))
            .bind(&notification.message)
            .bind(notification.created_at)
            .execute(&self.pool)
            .await
            .map_err(|e| NotifyError::Unavailable(e.to_string()))?;

            tracing::debug!(
                notification_id = %notification.id,
                kind = notification.kind.as_str(),
                "Notification logged"
            );
            Ok(())
        })
    }
}

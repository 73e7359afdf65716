//! Bearer-token sessions resolved against the `sessions` and `users` tables.

use crate::rows::db;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use turnstile_core::directory::{Principal, Role, SessionDirectory};
use turnstile_core::error::StoreError;
use turnstile_core::store::StoreFuture;
use turnstile_core::types::UserId;

/// [`SessionDirectory`] backed by `PostgreSQL`.
#[derive(Clone, Debug)]
pub struct PostgresSessionDirectory {
    pool: PgPool,
}

impl PostgresSessionDirectory {
    /// Share an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Store a session token for `user_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on failure, including an unknown user.
    pub async fn create_session(
        &self,
        token: &str,
        user_id: UserId,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO sessions (token, user_id, expires_at) VALUES ($1, $2, $3)")
            .bind(token)
            .bind(user_id.as_uuid())
            .bind(expires_at)
            .execute(&self.pool)
            .await
            .map_err(db)?;
        Ok(())
    }

    /// Remove a session token. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on failure.
    pub async fn revoke(&self, token: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM sessions WHERE token = $1")
            .bind(token)
            .execute(&self.pool)
            .await
            .map_err(db)?;
        Ok(result.rows_affected() > 0)
    }
}

impl SessionDirectory for PostgresSessionDirectory {
    fn resolve<'a>(&'a self, token: &'a str) -> StoreFuture<'a, Option<Principal>> {
        Box::pin(async move {
            let row = sqlx::query(
                r"
                SELECT u.id, u.role, u.name, u.email
                FROM sessions s
                JOIN users u ON u.id = s.user_id
                WHERE s.token = $1 AND s.expires_at > now()
                ",
            )
            .bind(token)
            .fetch_optional(&self.pool)
            .await
            .map_err(db)?;

            let Some(row) = row else {
                return Ok(None);
            };
            let corrupt = |e: sqlx::Error| StoreError::Corrupt(e.to_string());
            let role: String = row.try_get("role").map_err(corrupt)?;
            let role = Role::parse(&role)
                .ok_or_else(|| StoreError::Corrupt(format!("unknown role {role}")))?;

            Ok(Some(Principal {
                user_id: UserId::from_uuid(row.try_get("id").map_err(corrupt)?),
                role,
                name: row.try_get("name").map_err(corrupt)?,
                email: row.try_get("email").map_err(corrupt)?,
            }))
        })
    }
}

//! `PostgreSQL` implementation of [`RegistrationStore`].
//!
//! # Concurrency
//!
//! Every write that touches capacity or registration status first locks the
//! event row with `SELECT … FOR UPDATE`. Registrations, cancellations,
//! deletions and promotions for one event therefore run one at a time, and
//! each re-reads capacity under the lock. Writes for different events never
//! contend. Locks are always taken event first, registration second.
//!
//! Scans do not take the event lock. `valid → used` is a single conditional
//! `UPDATE … WHERE status = 'valid' AND qr_expires_at >= $now`, so among
//! concurrent scans of one ticket exactly one matches a row.
//!
//! # Code uniqueness
//!
//! Codes are inserted into `ticket_codes` before the ticket itself. Rows in
//! that table are never deleted, so a code stays reserved after its ticket
//! is removed. A unique violation there rolls back the whole transaction and
//! surfaces as [`StoreError::CodeCollision`].

use crate::rows::{self, EVENT_COLUMNS, REGISTRATION_COLUMNS, TICKET_COLUMNS, db, to_i32, to_u32};
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{PgConnection, Row};
use std::time::Duration;
use turnstile_core::capacity::{Admission, admit, plan_promotions};
use turnstile_core::directory::Role;
use turnstile_core::error::StoreError;
use turnstile_core::issuance::TicketIssuer;
use turnstile_core::store::{
    CancelOutcome, CancellationReport, DeletionReport, NewRegistration, Promotion,
    RegisterOutcome, RegistrationStore, StoreFuture, TicketCancelOutcome, TicketDetails,
};
use turnstile_core::types::{
    EventId, EventSummary, Registration, RegistrationId, RegistrationStatus, ScanCode, Ticket,
    TicketId, UserId, UserProfile,
};

/// Connection pool settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PoolConfig {
    /// Maximum pool size
    pub max_connections: u32,
    /// Connections kept open when idle
    pub min_connections: u32,
    /// Timeout for acquiring a connection
    pub connect_timeout: Duration,
    /// Idle connections are closed after this long
    pub idle_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 2,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
        }
    }
}

/// `PostgreSQL`-backed registration store.
///
/// # Example
///
/// ```no_run
/// use turnstile_postgres::{PoolConfig, PostgresRegistrationStore};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = PostgresRegistrationStore::connect("postgres://localhost/turnstile", &PoolConfig::default()).await?;
/// store.migrate().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct PostgresRegistrationStore {
    pool: PgPool,
}

impl PostgresRegistrationStore {
    /// Wrap an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool for `database_url`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the connection fails.
    pub async fn connect(database_url: &str, config: &PoolConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout)
            .idle_timeout(config.idle_timeout)
            .connect(database_url)
            .await
            .map_err(|e| StoreError::Database(format!("Failed to connect: {e}")))?;
        Ok(Self::new(pool))
    }

    /// Run database migrations.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(format!("Migration failed: {e}")))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Insert or update an event, as the event-management collaborator does.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on failure.
    pub async fn upsert_event(&self, event: &EventSummary) -> Result<(), StoreError> {
        sqlx::query(
            r"
            INSERT INTO events (id, title, organization, starts_at, location, capacity)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE SET
                title = EXCLUDED.title,
                organization = EXCLUDED.organization,
                starts_at = EXCLUDED.starts_at,
                location = EXCLUDED.location,
                capacity = EXCLUDED.capacity
            ",
        )
        .bind(event.id.as_uuid())
        .bind(&event.title)
        .bind(&event.organization)
        .bind(event.starts_at)
        .bind(&event.location)
        .bind(to_i32(event.capacity)?)
        .execute(&self.pool)
        .await
        .map_err(db)?;
        Ok(())
    }

    /// Insert or update a user with a role.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on failure.
    pub async fn upsert_user(&self, user: &UserProfile, role: Role) -> Result<(), StoreError> {
        sqlx::query(
            r"
            INSERT INTO users (id, name, email, role)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                email = EXCLUDED.email,
                role = EXCLUDED.role
            ",
        )
        .bind(user.id.as_uuid())
        .bind(&user.name)
        .bind(&user.email)
        .bind(role.as_str())
        .execute(&self.pool)
        .await
        .map_err(db)?;
        Ok(())
    }

    /// Set an event's remaining capacity.
    ///
    /// Raising capacity does not promote anyone by itself; follow it with
    /// [`RegistrationStore::promote_waitlist`].
    ///
    /// # Errors
    ///
    /// - `EventNotFound`: unknown event
    /// - `Database`: query failure
    pub async fn set_capacity(&self, event_id: EventId, capacity: u32) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE events SET capacity = $2 WHERE id = $1")
            .bind(event_id.as_uuid())
            .bind(to_i32(capacity)?)
            .execute(&self.pool)
            .await
            .map_err(db)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::EventNotFound(event_id));
        }
        Ok(())
    }

    /// Users currently holding confirmed seats for an event.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on failure.
    pub async fn registered_users(&self, event_id: EventId) -> Result<Vec<UserId>, StoreError> {
        let rows = sqlx::query("SELECT user_id FROM event_attendees WHERE event_id = $1")
            .bind(event_id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(db)?;
        rows.iter()
            .map(|row| {
                row.try_get("user_id")
                    .map(UserId::from_uuid)
                    .map_err(|e| StoreError::Corrupt(e.to_string()))
            })
            .collect()
    }
}

// ============================================================================
// Transaction steps
// ============================================================================

/// Lock the event row and return its capacity.
async fn lock_event(conn: &mut PgConnection, event_id: EventId) -> Result<u32, StoreError> {
    let row = sqlx::query("SELECT capacity FROM events WHERE id = $1 FOR UPDATE")
        .bind(event_id.as_uuid())
        .fetch_optional(&mut *conn)
        .await
        .map_err(db)?
        .ok_or(StoreError::EventNotFound(event_id))?;
    let capacity: i32 = row
        .try_get("capacity")
        .map_err(|e| StoreError::Corrupt(e.to_string()))?;
    to_u32(capacity, "capacity")
}

async fn set_event_capacity(
    conn: &mut PgConnection,
    event_id: EventId,
    capacity: u32,
) -> Result<(), StoreError> {
    sqlx::query("UPDATE events SET capacity = $2 WHERE id = $1")
        .bind(event_id.as_uuid())
        .bind(to_i32(capacity)?)
        .execute(&mut *conn)
        .await
        .map_err(db)?;
    Ok(())
}

async fn load_registration(
    conn: &mut PgConnection,
    id: RegistrationId,
) -> Result<Option<Registration>, StoreError> {
    let sql = format!("SELECT {REGISTRATION_COLUMNS} FROM registrations r WHERE r.id = $1");
    sqlx::query(&sql)
        .bind(id.as_uuid())
        .fetch_optional(&mut *conn)
        .await
        .map_err(db)?
        .as_ref()
        .map(rows::registration)
        .transpose()
}

/// Lock the event and then the registration, in that order.
async fn lock_registration(
    conn: &mut PgConnection,
    id: RegistrationId,
) -> Result<(Registration, u32), StoreError> {
    let event_id: uuid::Uuid = sqlx::query("SELECT event_id FROM registrations WHERE id = $1")
        .bind(id.as_uuid())
        .fetch_optional(&mut *conn)
        .await
        .map_err(db)?
        .ok_or(StoreError::RegistrationNotFound(id))?
        .try_get("event_id")
        .map_err(|e| StoreError::Corrupt(e.to_string()))?;

    let capacity = lock_event(conn, EventId::from_uuid(event_id)).await?;

    sqlx::query("SELECT id FROM registrations WHERE id = $1 FOR UPDATE")
        .bind(id.as_uuid())
        .fetch_optional(&mut *conn)
        .await
        .map_err(db)?
        .ok_or(StoreError::RegistrationNotFound(id))?;

    let registration = load_registration(conn, id)
        .await?
        .ok_or(StoreError::RegistrationNotFound(id))?;
    Ok((registration, capacity))
}

async fn insert_registration(
    conn: &mut PgConnection,
    registration: &Registration,
) -> Result<(), StoreError> {
    sqlx::query(
        r"
        INSERT INTO registrations (id, user_id, event_id, quantity, status, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ",
    )
    .bind(registration.id.as_uuid())
    .bind(registration.user_id.as_uuid())
    .bind(registration.event_id.as_uuid())
    .bind(to_i32(registration.quantity.get())?)
    .bind(registration.status.as_str())
    .bind(registration.created_at)
    .bind(registration.updated_at)
    .execute(&mut *conn)
    .await
    .map_err(db)?;
    Ok(())
}

async fn update_registration_status(
    conn: &mut PgConnection,
    registration: &Registration,
) -> Result<(), StoreError> {
    sqlx::query("UPDATE registrations SET status = $2, updated_at = $3 WHERE id = $1")
        .bind(registration.id.as_uuid())
        .bind(registration.status.as_str())
        .bind(registration.updated_at)
        .execute(&mut *conn)
        .await
        .map_err(db)?;
    Ok(())
}

/// Reserve each code, then insert the ticket.
async fn insert_tickets(conn: &mut PgConnection, tickets: &[Ticket]) -> Result<(), StoreError> {
    for ticket in tickets {
        sqlx::query("INSERT INTO ticket_codes (code, issued_at) VALUES ($1, $2)")
            .bind(ticket.code.as_str())
            .bind(ticket.created_at)
            .execute(&mut *conn)
            .await
            .map_err(db)?;

        sqlx::query(
            r"
            INSERT INTO tickets (
                id, registration_id, user_id, event_id, seat_index, code, status,
                qr_data_url, qr_expires_at, scanned_at, scanned_by, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ",
        )
        .bind(ticket.id.as_uuid())
        .bind(ticket.registration_id.as_uuid())
        .bind(ticket.user_id.as_uuid())
        .bind(ticket.event_id.as_uuid())
        .bind(to_i32(ticket.seat_index)?)
        .bind(ticket.code.as_str())
        .bind(ticket.status.as_str())
        .bind(ticket.qr_data_url.as_deref())
        .bind(ticket.qr_expires_at)
        .bind(ticket.scanned_at)
        .bind(ticket.scanned_by.map(|id| *id.as_uuid()))
        .bind(ticket.created_at)
        .execute(&mut *conn)
        .await
        .map_err(db)?;
    }
    Ok(())
}

async fn add_attendee(conn: &mut PgConnection, event_id: EventId, user_id: UserId) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO event_attendees (event_id, user_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
    )
    .bind(event_id.as_uuid())
    .bind(user_id.as_uuid())
    .execute(&mut *conn)
    .await
    .map_err(db)?;
    Ok(())
}

/// Return a confirmed registration's seats to the event. Returns the number
/// of seats released (zero unless confirmed).
async fn release_seats(
    conn: &mut PgConnection,
    registration: &Registration,
    capacity: u32,
) -> Result<u32, StoreError> {
    if registration.status != RegistrationStatus::Confirmed {
        return Ok(0);
    }
    let seats = registration.quantity.get();
    set_event_capacity(conn, registration.event_id, capacity.saturating_add(seats)).await?;
    sqlx::query("DELETE FROM event_attendees WHERE event_id = $1 AND user_id = $2")
        .bind(registration.event_id.as_uuid())
        .bind(registration.user_id.as_uuid())
        .execute(&mut *conn)
        .await
        .map_err(db)?;
    Ok(seats)
}

/// First-fit FIFO promotion against `capacity`. The event row must already
/// be locked by the caller.
async fn promote(
    conn: &mut PgConnection,
    event_id: EventId,
    capacity: u32,
    issuer: &TicketIssuer,
) -> Result<Vec<Promotion>, StoreError> {
    let sql = format!(
        "SELECT {REGISTRATION_COLUMNS} FROM registrations r \
         WHERE r.event_id = $1 AND r.status = 'waitlisted' \
         ORDER BY r.created_at, r.id"
    );
    let waitlist = sqlx::query(&sql)
        .bind(event_id.as_uuid())
        .fetch_all(&mut *conn)
        .await
        .map_err(db)?
        .iter()
        .map(rows::registration)
        .collect::<Result<Vec<_>, _>>()?;

    let plan = plan_promotions(capacity, waitlist.iter());
    if plan.is_empty() {
        return Ok(Vec::new());
    }

    let now = issuer.now();
    let mut promotions = Vec::with_capacity(plan.promoted.len());
    for id in &plan.promoted {
        let Some(mut registration) = waitlist.iter().find(|r| r.id == *id).cloned() else {
            continue;
        };
        registration.transition(RegistrationStatus::Confirmed, now)?;
        let tickets = issuer.issue(&mut registration);
        update_registration_status(conn, &registration).await?;
        insert_tickets(conn, &tickets).await?;
        add_attendee(conn, event_id, registration.user_id).await?;
        promotions.push(Promotion {
            registration,
            tickets,
        });
    }

    set_event_capacity(conn, event_id, plan.remaining).await?;
    Ok(promotions)
}

// ============================================================================
// RegistrationStore
// ============================================================================

impl RegistrationStore for PostgresRegistrationStore {
    fn find_event(&self, id: EventId) -> StoreFuture<'_, Option<EventSummary>> {
        Box::pin(async move {
            let sql = format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = $1");
            sqlx::query(&sql)
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(db)?
                .as_ref()
                .map(rows::event)
                .transpose()
        })
    }

    fn find_user(&self, id: UserId) -> StoreFuture<'_, Option<UserProfile>> {
        Box::pin(async move {
            sqlx::query("SELECT id, name, email FROM users WHERE id = $1")
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(db)?
                .as_ref()
                .map(|row| rows::user(row, ""))
                .transpose()
        })
    }

    fn find_registration(&self, id: RegistrationId) -> StoreFuture<'_, Option<Registration>> {
        Box::pin(async move {
            let mut conn = self.pool.acquire().await.map_err(db)?;
            load_registration(&mut conn, id).await
        })
    }

    fn registrations_for_user(&self, user_id: UserId) -> StoreFuture<'_, Vec<Registration>> {
        Box::pin(async move {
            let sql = format!(
                "SELECT {REGISTRATION_COLUMNS} FROM registrations r \
                 WHERE r.user_id = $1 ORDER BY r.created_at DESC, r.id DESC"
            );
            sqlx::query(&sql)
                .bind(user_id.as_uuid())
                .fetch_all(&self.pool)
                .await
                .map_err(db)?
                .iter()
                .map(rows::registration)
                .collect()
        })
    }

    fn waitlist(&self, event_id: EventId) -> StoreFuture<'_, Vec<Registration>> {
        Box::pin(async move {
            let sql = format!(
                "SELECT {REGISTRATION_COLUMNS} FROM registrations r \
                 WHERE r.event_id = $1 AND r.status = 'waitlisted' \
                 ORDER BY r.created_at, r.id"
            );
            sqlx::query(&sql)
                .bind(event_id.as_uuid())
                .fetch_all(&self.pool)
                .await
                .map_err(db)?
                .iter()
                .map(rows::registration)
                .collect()
        })
    }

    fn tickets_for_registration(&self, id: RegistrationId) -> StoreFuture<'_, Vec<Ticket>> {
        Box::pin(async move {
            let sql = format!(
                "SELECT {TICKET_COLUMNS} FROM tickets WHERE registration_id = $1 ORDER BY seat_index"
            );
            sqlx::query(&sql)
                .bind(id.as_uuid())
                .fetch_all(&self.pool)
                .await
                .map_err(db)?
                .iter()
                .map(rows::ticket)
                .collect()
        })
    }

    fn find_ticket(&self, id: TicketId) -> StoreFuture<'_, Option<Ticket>> {
        Box::pin(async move {
            let sql = format!("SELECT {TICKET_COLUMNS} FROM tickets WHERE id = $1");
            sqlx::query(&sql)
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(db)?
                .as_ref()
                .map(rows::ticket)
                .transpose()
        })
    }

    fn ticket_details_by_code(&self, code: ScanCode) -> StoreFuture<'_, Option<TicketDetails>> {
        Box::pin(async move {
            let row = sqlx::query(
                r"
                SELECT t.id, t.registration_id, t.user_id, t.event_id, t.seat_index, t.code,
                       t.status, t.qr_data_url, t.qr_expires_at, t.scanned_at, t.scanned_by,
                       t.created_at,
                       u.id AS attendee_id, u.name AS attendee_name, u.email AS attendee_email,
                       e.title, e.organization, e.starts_at, e.location, e.capacity
                FROM tickets t
                JOIN users u ON u.id = t.user_id
                JOIN events e ON e.id = t.event_id
                WHERE t.code = $1
                ",
            )
            .bind(code.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(db)?;

            let Some(row) = row else {
                return Ok(None);
            };
            let ticket = rows::ticket(&row)?;
            let attendee = rows::user(&row, "attendee_")?;
            let event = EventSummary {
                id: ticket.event_id,
                title: row.try_get("title").map_err(|e| StoreError::Corrupt(e.to_string()))?,
                organization: row
                    .try_get("organization")
                    .map_err(|e| StoreError::Corrupt(e.to_string()))?,
                starts_at: row
                    .try_get("starts_at")
                    .map_err(|e| StoreError::Corrupt(e.to_string()))?,
                location: row
                    .try_get("location")
                    .map_err(|e| StoreError::Corrupt(e.to_string()))?,
                capacity: to_u32(
                    row.try_get("capacity")
                        .map_err(|e| StoreError::Corrupt(e.to_string()))?,
                    "capacity",
                )?,
            };
            Ok(Some(TicketDetails {
                ticket,
                attendee,
                event,
            }))
        })
    }

    fn register<'a>(
        &'a self,
        request: NewRegistration,
        issuer: &'a TicketIssuer,
    ) -> StoreFuture<'a, RegisterOutcome> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await.map_err(db)?;
            let capacity = lock_event(&mut tx, request.event_id).await?;

            let sql = format!(
                "SELECT {REGISTRATION_COLUMNS} FROM registrations r \
                 WHERE r.user_id = $1 AND r.event_id = $2 AND r.status <> 'cancelled'"
            );
            let existing = sqlx::query(&sql)
                .bind(request.user_id.as_uuid())
                .bind(request.event_id.as_uuid())
                .fetch_optional(&mut *tx)
                .await
                .map_err(db)?;
            if let Some(row) = existing {
                let registration = rows::registration(&row)?;
                tx.rollback().await.map_err(db)?;
                return Ok(RegisterOutcome::AlreadyRegistered { registration });
            }

            let now = issuer.now();
            let outcome = match admit(capacity, request.quantity) {
                Admission::Confirm { remaining } => {
                    let mut registration = Registration::new(
                        request.user_id,
                        request.event_id,
                        request.quantity,
                        RegistrationStatus::Confirmed,
                        now,
                    );
                    let tickets = issuer.issue(&mut registration);
                    insert_registration(&mut tx, &registration).await?;
                    insert_tickets(&mut tx, &tickets).await?;
                    set_event_capacity(&mut tx, request.event_id, remaining).await?;
                    add_attendee(&mut tx, request.event_id, request.user_id).await?;
                    RegisterOutcome::Confirmed {
                        registration,
                        tickets,
                    }
                },
                Admission::Waitlist { shortfall } => {
                    let registration = Registration::new(
                        request.user_id,
                        request.event_id,
                        request.quantity,
                        RegistrationStatus::Waitlisted,
                        now,
                    );
                    insert_registration(&mut tx, &registration).await?;
                    tracing::debug!(event_id = %request.event_id, shortfall, "Insufficient capacity");
                    RegisterOutcome::Waitlisted { registration }
                },
            };

            tx.commit().await.map_err(db)?;
            Ok(outcome)
        })
    }

    fn cancel_registration<'a>(
        &'a self,
        id: RegistrationId,
        issuer: &'a TicketIssuer,
    ) -> StoreFuture<'a, CancelOutcome> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await.map_err(db)?;
            let (mut registration, capacity) = lock_registration(&mut tx, id).await?;

            if registration.status == RegistrationStatus::Cancelled {
                return Ok(CancelOutcome::AlreadyCancelled(registration));
            }
            let used: bool = sqlx::query(
                "SELECT EXISTS (SELECT 1 FROM tickets WHERE registration_id = $1 AND status = 'used') AS used",
            )
            .bind(id.as_uuid())
            .fetch_one(&mut *tx)
            .await
            .map_err(db)?
            .try_get("used")
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;
            if used {
                return Ok(CancelOutcome::TicketsInUse(registration));
            }

            let released_seats = release_seats(&mut tx, &registration, capacity).await?;
            registration.transition(RegistrationStatus::Cancelled, issuer.now())?;
            update_registration_status(&mut tx, &registration).await?;

            let cancelled_tickets = sqlx::query(
                r"
                UPDATE tickets SET status = 'cancelled'
                WHERE registration_id = $1 AND status = 'valid'
                RETURNING id, seat_index
                ",
            )
            .bind(id.as_uuid())
            .fetch_all(&mut *tx)
            .await
            .map_err(db)?;
            let mut cancelled_tickets = cancelled_tickets
                .iter()
                .map(|row| {
                    let id: uuid::Uuid = row.try_get("id")?;
                    let seat: i32 = row.try_get("seat_index")?;
                    Ok((seat, TicketId::from_uuid(id)))
                })
                .collect::<Result<Vec<_>, sqlx::Error>>()
                .map_err(|e| StoreError::Corrupt(e.to_string()))?;
            cancelled_tickets.sort_unstable();

            let promotions = if released_seats > 0 {
                promote(
                    &mut tx,
                    registration.event_id,
                    capacity.saturating_add(released_seats),
                    issuer,
                )
                .await?
            } else {
                Vec::new()
            };

            tx.commit().await.map_err(db)?;
            Ok(CancelOutcome::Cancelled(CancellationReport {
                registration,
                cancelled_tickets: cancelled_tickets.into_iter().map(|(_, id)| id).collect(),
                released_seats,
                promotions,
            }))
        })
    }

    fn delete_registration<'a>(
        &'a self,
        id: RegistrationId,
        issuer: &'a TicketIssuer,
    ) -> StoreFuture<'a, DeletionReport> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await.map_err(db)?;
            let (registration, capacity) = lock_registration(&mut tx, id).await?;

            sqlx::query("DELETE FROM registrations WHERE id = $1")
                .bind(id.as_uuid())
                .execute(&mut *tx)
                .await
                .map_err(db)?;

            let released_seats = release_seats(&mut tx, &registration, capacity).await?;
            let promotions = if released_seats > 0 {
                promote(
                    &mut tx,
                    registration.event_id,
                    capacity.saturating_add(released_seats),
                    issuer,
                )
                .await?
            } else {
                Vec::new()
            };

            tx.commit().await.map_err(db)?;
            Ok(DeletionReport {
                deleted_tickets: registration.ticket_ids.clone(),
                registration,
                released_seats,
                promotions,
            })
        })
    }

    fn promote_waitlist<'a>(
        &'a self,
        event_id: EventId,
        issuer: &'a TicketIssuer,
    ) -> StoreFuture<'a, Vec<Promotion>> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await.map_err(db)?;
            let capacity = lock_event(&mut tx, event_id).await?;
            let promotions = promote(&mut tx, event_id, capacity, issuer).await?;
            tx.commit().await.map_err(db)?;
            Ok(promotions)
        })
    }

    fn mark_ticket_used(
        &self,
        id: TicketId,
        at: DateTime<Utc>,
        scanned_by: UserId,
    ) -> StoreFuture<'_, Option<Ticket>> {
        Box::pin(async move {
            let sql = format!(
                "UPDATE tickets SET status = 'used', scanned_at = $2, scanned_by = $3 \
                 WHERE id = $1 AND status = 'valid' AND qr_expires_at >= $2 \
                 RETURNING {TICKET_COLUMNS}"
            );
            sqlx::query(&sql)
                .bind(id.as_uuid())
                .bind(at)
                .bind(scanned_by.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(db)?
                .as_ref()
                .map(rows::ticket)
                .transpose()
        })
    }

    fn cancel_ticket(&self, id: TicketId) -> StoreFuture<'_, TicketCancelOutcome> {
        Box::pin(async move {
            let sql = format!(
                "UPDATE tickets SET status = 'cancelled' WHERE id = $1 AND status = 'valid' \
                 RETURNING {TICKET_COLUMNS}"
            );
            let updated = sqlx::query(&sql)
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(db)?;
            if let Some(row) = updated {
                return Ok(TicketCancelOutcome::Cancelled(rows::ticket(&row)?));
            }

            match self.find_ticket(id).await? {
                Some(ticket) => Ok(TicketCancelOutcome::Refused(ticket)),
                None => Err(StoreError::TicketNotFound(id)),
            }
        })
    }

    fn attach_qr(
        &self,
        id: TicketId,
        data_url: String,
        expires_at: Option<DateTime<Utc>>,
    ) -> StoreFuture<'_, bool> {
        Box::pin(async move {
            let result = sqlx::query(
                r"
                UPDATE tickets
                SET qr_data_url = $2, qr_expires_at = COALESCE($3, qr_expires_at)
                WHERE id = $1 AND status = 'valid'
                ",
            )
            .bind(id.as_uuid())
            .bind(data_url)
            .bind(expires_at)
            .execute(&self.pool)
            .await
            .map_err(db)?;
            Ok(result.rows_affected() == 1)
        })
    }

    fn ping(&self) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            sqlx::query("SELECT 1")
                .execute(&self.pool)
                .await
                .map_err(db)?;
            Ok(())
        })
    }
}

//! Row decoding and error mapping shared by the PostgreSQL types.

use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{Postgres, Row};
use turnstile_core::error::StoreError;
use turnstile_core::types::{
    EventId, EventSummary, Quantity, Registration, RegistrationId, RegistrationStatus, ScanCode,
    Ticket, TicketId, TicketStatus, UserId, UserProfile,
};
use uuid::Uuid;

pub(crate) const EVENT_COLUMNS: &str = "id, title, organization, starts_at, location, capacity";

pub(crate) const TICKET_COLUMNS: &str = "id, registration_id, user_id, event_id, seat_index, code, \
     status, qr_data_url, qr_expires_at, scanned_at, scanned_by, created_at";

pub(crate) const REGISTRATION_COLUMNS: &str = "r.id, r.user_id, r.event_id, r.quantity, r.status, \
     r.created_at, r.updated_at, \
     ARRAY(SELECT t.id FROM tickets t WHERE t.registration_id = r.id ORDER BY t.seat_index) AS ticket_ids";

/// Unique violations on scan codes become [`StoreError::CodeCollision`];
/// everything else is an opaque database failure.
pub(crate) fn db(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation()
            && matches!(db_err.constraint(), Some("ticket_codes_pkey" | "tickets_code_key"))
        {
            return StoreError::CodeCollision;
        }
    }
    StoreError::Database(err.to_string())
}

fn get<'r, T>(row: &'r PgRow, column: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(column)
        .map_err(|e| StoreError::Corrupt(format!("column {column}: {e}")))
}

pub(crate) fn to_u32(value: i32, column: &str) -> Result<u32, StoreError> {
    u32::try_from(value).map_err(|_| StoreError::Corrupt(format!("negative {column}: {value}")))
}

pub(crate) fn to_i32(value: u32) -> Result<i32, StoreError> {
    i32::try_from(value).map_err(|_| StoreError::Database(format!("value {value} out of range")))
}

pub(crate) fn event(row: &PgRow) -> Result<EventSummary, StoreError> {
    Ok(EventSummary {
        id: EventId::from_uuid(get(row, "id")?),
        title: get(row, "title")?,
        organization: get(row, "organization")?,
        starts_at: get(row, "starts_at")?,
        location: get(row, "location")?,
        capacity: to_u32(get(row, "capacity")?, "capacity")?,
    })
}

pub(crate) fn registration(row: &PgRow) -> Result<Registration, StoreError> {
    let status: String = get(row, "status")?;
    let quantity = to_u32(get(row, "quantity")?, "quantity")?;
    let ticket_ids: Vec<Uuid> = get(row, "ticket_ids")?;

    Ok(Registration {
        id: RegistrationId::from_uuid(get(row, "id")?),
        user_id: UserId::from_uuid(get(row, "user_id")?),
        event_id: EventId::from_uuid(get(row, "event_id")?),
        quantity: Quantity::new(quantity).map_err(|e| StoreError::Corrupt(e.to_string()))?,
        status: RegistrationStatus::parse(&status)
            .ok_or_else(|| StoreError::Corrupt(format!("registration status {status}")))?,
        ticket_ids: ticket_ids.into_iter().map(TicketId::from_uuid).collect(),
        created_at: get(row, "created_at")?,
        updated_at: get(row, "updated_at")?,
    })
}

pub(crate) fn ticket(row: &PgRow) -> Result<Ticket, StoreError> {
    let status: String = get(row, "status")?;
    let code: String = get(row, "code")?;
    let scanned_by: Option<Uuid> = get(row, "scanned_by")?;

    Ok(Ticket {
        id: TicketId::from_uuid(get(row, "id")?),
        registration_id: RegistrationId::from_uuid(get(row, "registration_id")?),
        user_id: UserId::from_uuid(get(row, "user_id")?),
        event_id: EventId::from_uuid(get(row, "event_id")?),
        seat_index: to_u32(get(row, "seat_index")?, "seat_index")?,
        code: ScanCode::new(code),
        status: TicketStatus::parse(&status)
            .ok_or_else(|| StoreError::Corrupt(format!("ticket status {status}")))?,
        qr_data_url: get(row, "qr_data_url")?,
        qr_expires_at: get(row, "qr_expires_at")?,
        scanned_at: get::<Option<DateTime<Utc>>>(row, "scanned_at")?,
        scanned_by: scanned_by.map(UserId::from_uuid),
        created_at: get(row, "created_at")?,
    })
}

/// Decode a user profile from columns prefixed with `prefix` (e.g. `attendee_`).
pub(crate) fn user(row: &PgRow, prefix: &str) -> Result<UserProfile, StoreError> {
    Ok(UserProfile {
        id: UserId::from_uuid(get(row, &format!("{prefix}id"))?),
        name: get(row, &format!("{prefix}name"))?,
        email: get(row, &format!("{prefix}email"))?,
    })
}

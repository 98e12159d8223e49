use {
    crate::domain::booking::{Booking, BookingStatus},
    crate::domain::error::CoreError,
    chrono::{DateTime, Utc},
    sqlx::{PgPool, Postgres, Transaction},
    uuid::Uuid,
};

#[derive(Debug, sqlx::FromRow)]
pub struct BookingRow {
    pub id: Uuid,
    pub transaction_id: String,
    pub node_id: String,
    pub procedure_id: String,
    pub status: String,
    pub hold_expires_at: Option<DateTime<Utc>>,
    pub scheduled_slot: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl BookingRow {
    pub fn into_domain(self) -> Result<Booking, CoreError> {
        Ok(Booking {
            id: self.id,
            transaction_id: self.transaction_id,
            node_id: self.node_id,
            procedure_id: self.procedure_id,
            status: BookingStatus::try_from(self.status.as_str())?,
            hold_expires_at: self.hold_expires_at,
            scheduled_slot: self.scheduled_slot,
            created_at: self.created_at,
        })
    }
}

pub struct NewBookingRow {
    pub id: Uuid,
    pub transaction_id: String,
    pub node_id: String,
    pub procedure_id: String,
    pub hold_expires_at: DateTime<Utc>,
    pub scheduled_slot: DateTime<Utc>,
}

const SELECT_COLS: &str =
    "id, transaction_id, node_id, procedure_id, status, hold_expires_at, scheduled_slot, created_at";

/// Insert a HOLD booking. Returns `false` when the transaction_id already
/// exists (idempotent replay of the reservation request).
pub async fn insert_hold(
    tx: &mut Transaction<'_, Postgres>,
    row: &NewBookingRow,
) -> Result<bool, CoreError> {
    let result = sqlx::query(
        r#"
        INSERT INTO bookings
            (id, transaction_id, node_id, procedure_id, status, hold_expires_at, scheduled_slot)
        VALUES ($1, $2, $3, $4, 'hold', $5, $6)
        ON CONFLICT (transaction_id) DO NOTHING
        "#,
    )
    .bind(row.id)
    .bind(&row.transaction_id)
    .bind(&row.node_id)
    .bind(&row.procedure_id)
    .bind(row.hold_expires_at)
    .bind(row.scheduled_slot)
    .execute(&mut **tx)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Unlocked read inside a transaction, used to learn the transaction id
/// before taking locks in payment-then-booking order.
pub async fn get_by_id(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
) -> Result<Option<BookingRow>, CoreError> {
    let row = sqlx::query_as::<_, BookingRow>(&format!(
        "SELECT {SELECT_COLS} FROM bookings WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(&mut **tx)
    .await?;

    Ok(row)
}

/// Row-lock read. Blocks concurrent confirm/expire on the same booking
/// until this transaction finishes.
pub async fn get_for_update(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
) -> Result<Option<BookingRow>, CoreError> {
    let row = sqlx::query_as::<_, BookingRow>(&format!(
        "SELECT {SELECT_COLS} FROM bookings WHERE id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(&mut **tx)
    .await?;

    Ok(row)
}

pub async fn get_by_transaction(
    pool: &PgPool,
    transaction_id: &str,
) -> Result<Option<BookingRow>, CoreError> {
    let row = sqlx::query_as::<_, BookingRow>(&format!(
        "SELECT {SELECT_COLS} FROM bookings WHERE transaction_id = $1"
    ))
    .bind(transaction_id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

pub async fn lock_by_transaction(
    tx: &mut Transaction<'_, Postgres>,
    transaction_id: &str,
) -> Result<Option<BookingRow>, CoreError> {
    let row = sqlx::query_as::<_, BookingRow>(&format!(
        "SELECT {SELECT_COLS} FROM bookings WHERE transaction_id = $1 FOR UPDATE"
    ))
    .bind(transaction_id)
    .fetch_optional(&mut **tx)
    .await?;

    Ok(row)
}

pub async fn set_status(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
    status: BookingStatus,
) -> Result<(), CoreError> {
    sqlx::query("UPDATE bookings SET status = $1, updated_at = now() WHERE id = $2")
        .bind(status.as_str())
        .bind(id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

pub async fn mark_confirmed(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
) -> Result<(), CoreError> {
    sqlx::query(
        "UPDATE bookings SET status = 'confirmed', hold_expires_at = NULL, updated_at = now() WHERE id = $1",
    )
    .bind(id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Conditional confirm used by the capture protocol: a no-op when the
/// booking already left HOLD. Returns the affected-row count; callers keep
/// it in its own variable rather than inferring it from the row.
pub async fn confirm_if_hold(
    tx: &mut Transaction<'_, Postgres>,
    transaction_id: &str,
) -> Result<u64, CoreError> {
    let result = sqlx::query(
        r#"
        UPDATE bookings
        SET status = 'confirmed', hold_expires_at = NULL, updated_at = now()
        WHERE transaction_id = $1 AND status = 'hold'
        "#,
    )
    .bind(transaction_id)
    .execute(&mut **tx)
    .await?;

    Ok(result.rows_affected())
}

/// Read the current status inside the capture transaction, after any
/// conditional update has run.
pub async fn status_by_transaction(
    tx: &mut Transaction<'_, Postgres>,
    transaction_id: &str,
) -> Result<Option<String>, CoreError> {
    let status = sqlx::query_scalar::<_, String>(
        "SELECT status FROM bookings WHERE transaction_id = $1",
    )
    .bind(transaction_id)
    .fetch_optional(&mut **tx)
    .await?;

    Ok(status)
}

/// Bookings whose hold has lapsed, for the expiry sweeper. Plain read;
/// the sweeper re-checks each row under its lock.
pub async fn find_lapsed_holds(
    pool: &PgPool,
    now: DateTime<Utc>,
    limit: i64,
) -> Result<Vec<BookingRow>, CoreError> {
    let rows = sqlx::query_as::<_, BookingRow>(&format!(
        r#"
        SELECT {SELECT_COLS} FROM bookings
        WHERE status = 'hold' AND hold_expires_at IS NOT NULL AND hold_expires_at <= $1
        ORDER BY hold_expires_at
        LIMIT $2
        "#
    ))
    .bind(now)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

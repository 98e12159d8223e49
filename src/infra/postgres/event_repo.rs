use {
    crate::domain::error::CoreError,
    crate::domain::event::{EventType, NewEvent},
    chrono::{DateTime, Utc},
    sqlx::{PgPool, Postgres, Transaction},
    uuid::Uuid,
};

/// Append one event inside the transaction that performs the transition it
/// documents. This is the only write path into the ledger.
pub async fn append(
    tx: &mut Transaction<'_, Postgres>,
    event: &NewEvent,
) -> Result<(), CoreError> {
    sqlx::query(
        r#"
        INSERT INTO events (id, event_type, transaction_id, booking_id, payload)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(event.id)
    .bind(event.event_type.as_str())
    .bind(&event.transaction_id)
    .bind(event.booking_id)
    .bind(&event.payload)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

#[derive(Debug, sqlx::FromRow)]
pub struct EventRow {
    pub id: Uuid,
    pub event_type: String,
    pub transaction_id: String,
    pub booking_id: Option<Uuid>,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Per-transaction replay, in commit order.
pub async fn list_by_transaction(
    pool: &PgPool,
    transaction_id: &str,
) -> Result<Vec<EventRow>, CoreError> {
    let rows = sqlx::query_as::<_, EventRow>(
        r#"
        SELECT id, event_type, transaction_id, booking_id, payload, created_at
        FROM events
        WHERE transaction_id = $1
        ORDER BY created_at, id
        "#,
    )
    .bind(transaction_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

pub async fn count_by_type(
    pool: &PgPool,
    transaction_id: &str,
    event_type: EventType,
) -> Result<i64, CoreError> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM events WHERE transaction_id = $1 AND event_type = $2",
    )
    .bind(transaction_id)
    .bind(event_type.as_str())
    .fetch_one(pool)
    .await?;

    Ok(count)
}

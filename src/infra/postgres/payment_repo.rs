use {
    crate::domain::error::CoreError,
    crate::domain::payment::{Payment, PaymentStatus},
    chrono::{DateTime, Utc},
    sqlx::{PgPool, Postgres, Transaction},
    uuid::Uuid,
};

#[derive(Debug, sqlx::FromRow)]
pub struct PaymentRow {
    pub id: Uuid,
    pub transaction_id: String,
    pub booking_id: Option<Uuid>,
    pub amount: i64,
    pub currency: String,
    pub gateway: String,
    pub status: String,
    pub idempotency_key: String,
    pub gateway_reference: Option<String>,
    pub captured_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl PaymentRow {
    pub fn into_domain(self) -> Result<Payment, CoreError> {
        Ok(Payment {
            id: self.id,
            transaction_id: self.transaction_id,
            booking_id: self.booking_id,
            amount: self.amount,
            currency: self.currency,
            gateway: self.gateway,
            status: PaymentStatus::try_from(self.status.as_str())?,
            idempotency_key: self.idempotency_key,
            gateway_reference: self.gateway_reference,
            captured_at: self.captured_at,
            created_at: self.created_at,
        })
    }
}

pub struct NewPaymentRow {
    pub id: Uuid,
    pub transaction_id: String,
    pub booking_id: Option<Uuid>,
    pub amount: i64,
    pub currency: String,
    pub gateway: String,
    pub idempotency_key: String,
}

const SELECT_COLS: &str = "id, transaction_id, booking_id, amount, currency, gateway, status, \
     idempotency_key, gateway_reference, captured_at, created_at";

/// Insert a PENDING payment. Returns `false` when the idempotency key (or
/// the transaction_id) already holds a row — the caller decides whether the
/// existing row matches the replay.
pub async fn insert_pending(
    tx: &mut Transaction<'_, Postgres>,
    row: &NewPaymentRow,
) -> Result<bool, CoreError> {
    let result = sqlx::query(
        r#"
        INSERT INTO payments
            (id, transaction_id, booking_id, amount, currency, gateway, status, idempotency_key)
        VALUES ($1, $2, $3, $4, $5, $6, 'pending', $7)
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(row.id)
    .bind(&row.transaction_id)
    .bind(row.booking_id)
    .bind(row.amount)
    .bind(&row.currency)
    .bind(&row.gateway)
    .bind(&row.idempotency_key)
    .execute(&mut **tx)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Row-lock read by transaction id. The single intentional blocking point
/// of the capture protocol: concurrent captures of the same transaction
/// queue here and then hit the idempotent branch.
pub async fn lock_by_transaction(
    tx: &mut Transaction<'_, Postgres>,
    transaction_id: &str,
) -> Result<Option<PaymentRow>, CoreError> {
    let row = sqlx::query_as::<_, PaymentRow>(&format!(
        "SELECT {SELECT_COLS} FROM payments WHERE transaction_id = $1 FOR UPDATE"
    ))
    .bind(transaction_id)
    .fetch_optional(&mut **tx)
    .await?;

    Ok(row)
}

pub async fn get_by_transaction(
    pool: &PgPool,
    transaction_id: &str,
) -> Result<Option<PaymentRow>, CoreError> {
    let row = sqlx::query_as::<_, PaymentRow>(&format!(
        "SELECT {SELECT_COLS} FROM payments WHERE transaction_id = $1"
    ))
    .bind(transaction_id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

pub async fn get_by_idempotency_key(
    tx: &mut Transaction<'_, Postgres>,
    key: &str,
) -> Result<Option<PaymentRow>, CoreError> {
    let row = sqlx::query_as::<_, PaymentRow>(&format!(
        "SELECT {SELECT_COLS} FROM payments WHERE idempotency_key = $1"
    ))
    .bind(key)
    .fetch_optional(&mut **tx)
    .await?;

    Ok(row)
}

/// Capture transition: status, timestamp and gateway evidence in one
/// statement. Only ever called with the row lock held.
pub async fn mark_captured(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
    gateway_reference: Option<&str>,
    gateway_response: &serde_json::Value,
) -> Result<(), CoreError> {
    sqlx::query(
        r#"
        UPDATE payments
        SET status = 'captured',
            captured_at = now(),
            gateway_reference = COALESCE($2, gateway_reference),
            gateway_response = CASE WHEN $3::jsonb = 'null'::jsonb THEN gateway_response ELSE $3 END,
            updated_at = now()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(gateway_reference)
    .bind(gateway_response)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub async fn set_status(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
    status: PaymentStatus,
    gateway_reference: Option<&str>,
    gateway_response: &serde_json::Value,
) -> Result<(), CoreError> {
    sqlx::query(
        r#"
        UPDATE payments
        SET status = $2,
            gateway_reference = COALESCE($3, gateway_reference),
            gateway_response = CASE WHEN $4::jsonb = 'null'::jsonb THEN gateway_response ELSE $4 END,
            updated_at = now()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(status.as_str())
    .bind(gateway_reference)
    .bind(gateway_response)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

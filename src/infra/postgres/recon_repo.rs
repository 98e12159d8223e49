use {
    crate::domain::booking::BookingStatus,
    crate::domain::error::CoreError,
    crate::domain::payment::PaymentStatus,
    crate::domain::recon::{ReconPair, ReconReport},
    chrono::{DateTime, Utc},
    sqlx::PgPool,
    uuid::Uuid,
};

#[derive(Debug, sqlx::FromRow)]
struct PairRow {
    transaction_id: String,
    payment_status: Option<String>,
    booking_status: Option<String>,
    hold_expires_at: Option<DateTime<Utc>>,
    hold_expired_event_seen: bool,
}

/// Payments joined both ways with bookings for the period, with the
/// ledger consulted for HOLD_EXPIRED evidence. Pure read.
pub async fn scan_pairs(
    pool: &PgPool,
    period_start: DateTime<Utc>,
    period_end: DateTime<Utc>,
) -> Result<Vec<ReconPair>, CoreError> {
    let rows = sqlx::query_as::<_, PairRow>(
        r#"
        SELECT COALESCE(p.transaction_id, b.transaction_id) AS transaction_id,
               p.status AS payment_status,
               b.status AS booking_status,
               b.hold_expires_at,
               EXISTS (
                   SELECT 1 FROM events e
                   WHERE e.transaction_id = COALESCE(p.transaction_id, b.transaction_id)
                     AND e.event_type = 'HOLD_EXPIRED'
               ) AS hold_expired_event_seen
        FROM payments p
        FULL OUTER JOIN bookings b ON b.transaction_id = p.transaction_id
        WHERE COALESCE(p.created_at, b.created_at) >= $1
          AND COALESCE(p.created_at, b.created_at) < $2
        ORDER BY 1
        "#,
    )
    .bind(period_start)
    .bind(period_end)
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|r| {
            Ok(ReconPair {
                transaction_id: r.transaction_id,
                payment_status: r
                    .payment_status
                    .as_deref()
                    .map(PaymentStatus::try_from)
                    .transpose()?,
                booking_status: r
                    .booking_status
                    .as_deref()
                    .map(BookingStatus::try_from)
                    .transpose()?,
                hold_expires_at: r.hold_expires_at,
                hold_expired_event_seen: r.hold_expired_event_seen,
            })
        })
        .collect()
}

/// Persist a report. Reports are immutable: insert is the only statement
/// this module issues against the table besides reads.
pub async fn insert_report(pool: &PgPool, report: &ReconReport) -> Result<(), CoreError> {
    sqlx::query(
        r#"
        INSERT INTO reconciliation_reports
            (id, period_start, period_end, consistent_captured, consistent_pending,
             consistent_closed, anomaly_count, anomalies, signature, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(report.id)
    .bind(report.period_start)
    .bind(report.period_end)
    .bind(report.consistent_captured)
    .bind(report.consistent_pending)
    .bind(report.consistent_closed)
    .bind(report.anomaly_count)
    .bind(serde_json::to_value(&report.anomalies)?)
    .bind(&report.signature)
    .bind(report.created_at)
    .execute(pool)
    .await?;
    Ok(())
}

#[derive(Debug, sqlx::FromRow, serde::Serialize)]
pub struct ReportRow {
    pub id: Uuid,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub consistent_captured: i64,
    pub consistent_pending: i64,
    pub consistent_closed: i64,
    pub anomaly_count: i64,
    pub anomalies: serde_json::Value,
    pub signature: String,
    pub created_at: DateTime<Utc>,
}

pub async fn latest_report(pool: &PgPool) -> Result<Option<ReportRow>, CoreError> {
    let row = sqlx::query_as::<_, ReportRow>(
        r#"
        SELECT id, period_start, period_end, consistent_captured, consistent_pending,
               consistent_closed, anomaly_count, anomalies, signature, created_at
        FROM reconciliation_reports
        ORDER BY created_at DESC, id DESC
        LIMIT 1
        "#,
    )
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

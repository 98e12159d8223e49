use {
    super::booking::BookingStatus,
    super::payment::PaymentStatus,
    chrono::{DateTime, Utc},
    serde::Serialize,
    uuid::Uuid,
};

/// One payment/booking pair as seen by the reconciliation scan.
#[derive(Debug, Clone)]
pub struct ReconPair {
    pub transaction_id: String,
    pub payment_status: Option<PaymentStatus>,
    pub booking_status: Option<BookingStatus>,
    pub hold_expires_at: Option<DateTime<Utc>>,
    pub hold_expired_event_seen: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconClass {
    ConsistentCaptured,
    ConsistentPending,
    ConsistentClosed,
    Anomalous,
}

#[derive(Debug, Clone, Serialize)]
pub struct Anomaly {
    pub transaction_id: String,
    pub reason: String,
}

/// Classify one pair. Anomalies are data for review, not errors: every
/// CAPTURED payment either sits on a CONFIRMED booking or lands here.
pub fn classify(pair: &ReconPair, now: DateTime<Utc>) -> (ReconClass, Option<Anomaly>) {
    let anomaly = |reason: &str| {
        Some(Anomaly {
            transaction_id: pair.transaction_id.clone(),
            reason: reason.to_string(),
        })
    };

    match (pair.payment_status, pair.booking_status) {
        (Some(PaymentStatus::Captured), Some(BookingStatus::Confirmed)) => {
            (ReconClass::ConsistentCaptured, None)
        }
        (Some(PaymentStatus::Captured), Some(other)) => (
            ReconClass::Anomalous,
            anomaly(&format!("captured payment with {other} booking")),
        ),
        (Some(PaymentStatus::Captured), None) => (
            ReconClass::Anomalous,
            anomaly("captured payment with no booking"),
        ),
        (Some(PaymentStatus::Pending), Some(BookingStatus::Hold)) => {
            let within_grace = matches!(pair.hold_expires_at, Some(deadline) if now < deadline);
            if within_grace {
                (ReconClass::ConsistentPending, None)
            } else if pair.hold_expired_event_seen {
                // Sweep recorded the lapse but the row has not moved yet.
                (ReconClass::ConsistentClosed, None)
            } else {
                (
                    ReconClass::Anomalous,
                    anomaly("pending payment past hold expiry without HOLD_EXPIRED event"),
                )
            }
        }
        (Some(PaymentStatus::Pending), None) => (
            ReconClass::Anomalous,
            anomaly("pending payment with no booking"),
        ),
        (Some(PaymentStatus::Pending), Some(other)) => (
            ReconClass::Anomalous,
            anomaly(&format!("pending payment with {other} booking")),
        ),
        // Failed, expired or refunded payments close out the pair whatever
        // the booking side shows.
        (Some(_), Some(_)) => (ReconClass::ConsistentClosed, None),
        (Some(_), None) => (
            ReconClass::Anomalous,
            anomaly("payment with no booking"),
        ),
        (None, Some(_)) => (
            ReconClass::Anomalous,
            anomaly("booking with no payment"),
        ),
        (None, None) => (ReconClass::Anomalous, anomaly("empty pair")),
    }
}

/// Persisted, immutable reconciliation report.
#[derive(Debug, Clone, Serialize)]
pub struct ReconReport {
    pub id: Uuid,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub consistent_captured: i64,
    pub consistent_pending: i64,
    pub consistent_closed: i64,
    pub anomaly_count: i64,
    pub anomalies: Vec<Anomaly>,
    pub signature: String,
    pub created_at: DateTime<Utc>,
}

/// Machine-readable summary returned to the trigger and used for alerting.
#[derive(Debug, Clone, Serialize)]
pub struct ReconSummary {
    pub report_id: Uuid,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub consistent_captured: i64,
    pub consistent_pending: i64,
    pub consistent_closed: i64,
    pub anomaly_count: i64,
    pub anomalous_transaction_ids: Vec<String>,
}

/// Canonical string the report signature covers. Field order is fixed;
/// changing it invalidates previously persisted signatures.
pub fn signable_summary(
    id: Uuid,
    period_start: DateTime<Utc>,
    period_end: DateTime<Utc>,
    consistent_captured: i64,
    consistent_pending: i64,
    consistent_closed: i64,
    anomalies: &[Anomaly],
) -> String {
    let mut txids: Vec<&str> = anomalies.iter().map(|a| a.transaction_id.as_str()).collect();
    txids.sort_unstable();
    format!(
        "{id}:{}:{}:{consistent_captured}:{consistent_pending}:{consistent_closed}:{}",
        period_start.timestamp(),
        period_end.timestamp(),
        txids.join(",")
    )
}

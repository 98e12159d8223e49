use {
    crate::domain::error::CoreError,
    crate::domain::recon::{
        self, Anomaly, ReconClass, ReconReport, ReconSummary,
    },
    crate::infra::postgres::recon_repo,
    chrono::{DateTime, Duration, Utc},
    hmac::{Hmac, Mac},
    sha2::Sha256,
    sqlx::PgPool,
    tokio::sync::watch,
    uuid::Uuid,
};

type HmacSha256 = Hmac<Sha256>;

/// HMAC-SHA256 hex signature over the report's canonical summary string.
pub fn sign_report(secret: &str, canonical: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(canonical.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Cross-check payments against bookings for the period and persist one
/// immutable signed report. Anomalies are recorded for review, never
/// auto-corrected.
pub async fn run_reconciliation(
    pool: &PgPool,
    signing_secret: &str,
    period_start: DateTime<Utc>,
    period_end: DateTime<Utc>,
) -> Result<ReconSummary, CoreError> {
    if period_end <= period_start {
        return Err(CoreError::Validation(format!(
            "reconciliation period is empty: {period_start} .. {period_end}"
        )));
    }

    let pairs = recon_repo::scan_pairs(pool, period_start, period_end).await?;
    let now = Utc::now();

    let mut consistent_captured = 0i64;
    let mut consistent_pending = 0i64;
    let mut consistent_closed = 0i64;
    let mut anomalies: Vec<Anomaly> = Vec::new();

    for pair in &pairs {
        match recon::classify(pair, now) {
            (ReconClass::ConsistentCaptured, _) => consistent_captured += 1,
            (ReconClass::ConsistentPending, _) => consistent_pending += 1,
            (ReconClass::ConsistentClosed, _) => consistent_closed += 1,
            (ReconClass::Anomalous, Some(anomaly)) => anomalies.push(anomaly),
            (ReconClass::Anomalous, None) => {
                // classify always attaches a reason to an anomaly; keep the
                // pair visible even if that invariant ever slips.
                anomalies.push(Anomaly {
                    transaction_id: pair.transaction_id.clone(),
                    reason: "unclassified anomaly".to_string(),
                });
            }
        }
    }

    let report_id = Uuid::now_v7();
    let canonical = recon::signable_summary(
        report_id,
        period_start,
        period_end,
        consistent_captured,
        consistent_pending,
        consistent_closed,
        &anomalies,
    );
    let signature = sign_report(signing_secret, &canonical);

    let report = ReconReport {
        id: report_id,
        period_start,
        period_end,
        consistent_captured,
        consistent_pending,
        consistent_closed,
        anomaly_count: anomalies.len() as i64,
        anomalies: anomalies.clone(),
        signature,
        created_at: now,
    };
    recon_repo::insert_report(pool, &report).await?;

    if report.anomaly_count > 0 {
        tracing::warn!(
            report_id = %report_id,
            anomalies = report.anomaly_count,
            "reconciliation found anomalies"
        );
    } else {
        tracing::info!(report_id = %report_id, pairs = pairs.len(), "reconciliation clean");
    }

    Ok(ReconSummary {
        report_id,
        period_start,
        period_end,
        consistent_captured,
        consistent_pending,
        consistent_closed,
        anomaly_count: report.anomaly_count,
        anomalous_transaction_ids: anomalies.into_iter().map(|a| a.transaction_id).collect(),
    })
}

/// Scheduled reconciliation: every `interval` the trailing 24 hours are
/// audited. The on-demand HTTP trigger uses `run_reconciliation` directly.
pub async fn run_scheduler(
    pool: PgPool,
    signing_secret: String,
    interval: std::time::Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    tracing::info!(interval_secs = interval.as_secs(), "reconciliation scheduler started");

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                tracing::info!("reconciliation scheduler shutting down");
                return;
            }
            _ = tokio::time::sleep(interval) => {}
        }

        let period_end = Utc::now();
        let period_start = period_end - Duration::hours(24);
        match run_reconciliation(&pool, &signing_secret, period_start, period_end).await {
            Ok(summary) => {
                tracing::info!(
                    report_id = %summary.report_id,
                    anomalies = summary.anomaly_count,
                    "scheduled reconciliation completed"
                );
            }
            Err(e) => tracing::error!(error = %e, "scheduled reconciliation failed"),
        }
    }
}

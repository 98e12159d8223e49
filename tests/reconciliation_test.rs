mod common;

use care_ledger::domain::booking::BookingStatus;
use care_ledger::domain::payment::PaymentStatus;
use care_ledger::domain::recon::{Anomaly, ReconClass, ReconPair, classify, signable_summary};
use care_ledger::infra::postgres::recon_repo::scan_pairs;
use care_ledger::services::booking::create_hold;
use care_ledger::services::capture::capture;
use care_ledger::services::expiry;
use care_ledger::services::reconciliation::{run_reconciliation, sign_report};
use chrono::{Duration, Utc};
use common::*;
use uuid::Uuid;

const SIGNING_SECRET: &str = "report_secret_test";

fn pair(
    transaction_id: &str,
    payment: Option<PaymentStatus>,
    booking: Option<BookingStatus>,
) -> ReconPair {
    ReconPair {
        transaction_id: transaction_id.to_string(),
        payment_status: payment,
        booking_status: booking,
        hold_expires_at: None,
        hold_expired_event_seen: false,
    }
}

// ── Pure classification ────────────────────────────────────────────────────

#[test]
fn captured_confirmed_is_consistent() {
    let now = Utc::now();
    let p = pair("tx_a", Some(PaymentStatus::Captured), Some(BookingStatus::Confirmed));
    assert_eq!(classify(&p, now).0, ReconClass::ConsistentCaptured);
}

#[test]
fn pending_hold_within_grace_is_consistent() {
    let now = Utc::now();
    let mut p = pair("tx_b", Some(PaymentStatus::Pending), Some(BookingStatus::Hold));
    p.hold_expires_at = Some(now + Duration::minutes(30));
    assert_eq!(classify(&p, now).0, ReconClass::ConsistentPending);
}

#[test]
fn pending_past_expiry_without_event_is_anomalous() {
    let now = Utc::now();
    let mut p = pair("tx_c", Some(PaymentStatus::Pending), Some(BookingStatus::Hold));
    p.hold_expires_at = Some(now - Duration::minutes(30));
    let (class, anomaly) = classify(&p, now);
    assert_eq!(class, ReconClass::Anomalous);
    assert!(anomaly.unwrap().reason.contains("HOLD_EXPIRED"));
}

#[test]
fn pending_past_expiry_with_event_is_closed() {
    let now = Utc::now();
    let mut p = pair("tx_d", Some(PaymentStatus::Pending), Some(BookingStatus::Hold));
    p.hold_expires_at = Some(now - Duration::minutes(30));
    p.hold_expired_event_seen = true;
    assert_eq!(classify(&p, now).0, ReconClass::ConsistentClosed);
}

#[test]
fn captured_with_non_confirmed_booking_is_anomalous() {
    let now = Utc::now();
    for booking in [
        Some(BookingStatus::Hold),
        Some(BookingStatus::Expired),
        Some(BookingStatus::Cancelled),
        None,
    ] {
        let p = pair("tx_e", Some(PaymentStatus::Captured), booking);
        assert_eq!(classify(&p, now).0, ReconClass::Anomalous);
    }
}

#[test]
fn orphans_are_anomalous() {
    let now = Utc::now();
    let p = pair("tx_f", Some(PaymentStatus::Pending), None);
    assert_eq!(classify(&p, now).0, ReconClass::Anomalous);

    let b = pair("tx_g", None, Some(BookingStatus::Hold));
    assert_eq!(classify(&b, now).0, ReconClass::Anomalous);
}

#[test]
fn settled_pairs_are_closed() {
    let now = Utc::now();
    for payment in [
        PaymentStatus::Failed,
        PaymentStatus::Expired,
        PaymentStatus::Refunded,
    ] {
        let p = pair("tx_h", Some(payment), Some(BookingStatus::Expired));
        assert_eq!(classify(&p, now).0, ReconClass::ConsistentClosed);
    }
}

// ── Scan over the store ────────────────────────────────────────────────────

async fn find_pair(pool: &sqlx::PgPool, transaction_id: &str) -> ReconPair {
    let start = Utc::now() - Duration::hours(1);
    let end = Utc::now() + Duration::hours(1);
    scan_pairs(pool, start, end)
        .await
        .unwrap()
        .into_iter()
        .find(|p| p.transaction_id == transaction_id)
        .expect("pair not in scan")
}

#[tokio::test]
async fn scan_sees_captured_pair() {
    let pool = setup_pool("care_ledger_test_recon").await;

    let req = make_reservation("tx_scan_1", "clinic-a", "proc-implant", 60);
    create_hold(&pool, &req).await.unwrap();
    capture(&pool, &tx("tx_scan_1"), Some("gw_s1"), &serde_json::json!({}))
        .await
        .unwrap();

    let p = find_pair(&pool, "tx_scan_1").await;
    assert_eq!(p.payment_status, Some(PaymentStatus::Captured));
    assert_eq!(p.booking_status, Some(BookingStatus::Confirmed));
    assert_eq!(classify(&p, Utc::now()).0, ReconClass::ConsistentCaptured);
}

#[tokio::test]
async fn scan_sees_hold_expired_evidence() {
    let pool = setup_pool("care_ledger_test_recon").await;

    let req = make_reservation("tx_scan_2", "clinic-a", "proc-implant", 60);
    let ack = create_hold(&pool, &req).await.unwrap();
    lapse_hold(&pool, ack.booking_id).await;
    assert!(expiry::expire_one(&pool, ack.booking_id).await.unwrap());

    let p = find_pair(&pool, "tx_scan_2").await;
    assert!(p.hold_expired_event_seen);
    assert_eq!(p.payment_status, Some(PaymentStatus::Expired));
    assert_eq!(p.booking_status, Some(BookingStatus::Expired));
    assert_eq!(classify(&p, Utc::now()).0, ReconClass::ConsistentClosed);
}

#[tokio::test]
async fn scan_sees_orphan_payment() {
    let pool = setup_pool("care_ledger_test_recon").await;

    sqlx::query(
        r#"
        INSERT INTO payments
            (id, transaction_id, amount, currency, gateway, status, idempotency_key)
        VALUES ($1, 'tx_scan_orphan', 1000, 'usd', 'testpay', 'pending', 'orphan-key-1')
        "#,
    )
    .bind(Uuid::now_v7())
    .execute(&pool)
    .await
    .unwrap();

    let p = find_pair(&pool, "tx_scan_orphan").await;
    assert_eq!(p.booking_status, None);
    assert_eq!(classify(&p, Utc::now()).0, ReconClass::Anomalous);
}

// ── End-to-end report ──────────────────────────────────────────────────────

#[tokio::test]
async fn reconciliation_reports_drift_and_signs() {
    let pool = setup_pool("care_ledger_test_recon").await;

    // A clean captured pair.
    let ok = make_reservation("tx_rep_ok", "clinic-a", "proc-implant", 60);
    create_hold(&pool, &ok).await.unwrap();
    capture(&pool, &tx("tx_rep_ok"), None, &serde_json::Value::Null)
        .await
        .unwrap();

    // Drift: a captured payment whose booking regressed behind its back.
    let bad = make_reservation("tx_rep_drift", "clinic-a", "proc-implant", 60);
    create_hold(&pool, &bad).await.unwrap();
    capture(&pool, &tx("tx_rep_drift"), None, &serde_json::Value::Null)
        .await
        .unwrap();
    sqlx::query("UPDATE bookings SET status = 'expired' WHERE transaction_id = 'tx_rep_drift'")
        .execute(&pool)
        .await
        .unwrap();

    let start = Utc::now() - Duration::hours(1);
    let end = Utc::now() + Duration::hours(1);
    let summary = run_reconciliation(&pool, SIGNING_SECRET, start, end)
        .await
        .unwrap();

    assert!(
        summary
            .anomalous_transaction_ids
            .contains(&"tx_rep_drift".to_string())
    );
    assert!(
        !summary
            .anomalous_transaction_ids
            .contains(&"tx_rep_ok".to_string())
    );

    // The persisted report carries a signature that recomputes from its
    // own contents.
    let stored_signature: String = sqlx::query_scalar(
        "SELECT signature FROM reconciliation_reports WHERE id = $1",
    )
    .bind(summary.report_id)
    .fetch_one(&pool)
    .await
    .unwrap();

    let anomalies: Vec<Anomaly> = summary
        .anomalous_transaction_ids
        .iter()
        .map(|txid| Anomaly {
            transaction_id: txid.clone(),
            reason: String::new(),
        })
        .collect();
    let canonical = signable_summary(
        summary.report_id,
        summary.period_start,
        summary.period_end,
        summary.consistent_captured,
        summary.consistent_pending,
        summary.consistent_closed,
        &anomalies,
    );
    assert_eq!(stored_signature, sign_report(SIGNING_SECRET, &canonical));
}

#[tokio::test]
async fn reconciliation_rejects_empty_period() {
    let pool = setup_pool("care_ledger_test_recon").await;

    let now = Utc::now();
    let err = run_reconciliation(&pool, SIGNING_SECRET, now, now)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        care_ledger::domain::error::CoreError::Validation(_)
    ));
}

// ── Completeness: captured ⇒ confirmed or reported ─────────────────────────

#[tokio::test]
async fn every_captured_payment_is_confirmed_or_reported() {
    let pool = setup_pool("care_ledger_test_recon").await;

    for (txid, drift) in [("tx_cmp_1", false), ("tx_cmp_2", true), ("tx_cmp_3", false)] {
        let req = make_reservation(txid, "clinic-a", "proc-implant", 60);
        create_hold(&pool, &req).await.unwrap();
        capture(&pool, &tx(txid), None, &serde_json::Value::Null)
            .await
            .unwrap();
        if drift {
            sqlx::query("UPDATE bookings SET status = 'cancelled' WHERE transaction_id = $1")
                .bind(txid)
                .execute(&pool)
                .await
                .unwrap();
        }
    }

    let start = Utc::now() - Duration::hours(1);
    let end = Utc::now() + Duration::hours(1);
    let summary = run_reconciliation(&pool, SIGNING_SECRET, start, end)
        .await
        .unwrap();

    for txid in ["tx_cmp_1", "tx_cmp_2", "tx_cmp_3"] {
        let confirmed = booking_status(&pool, txid).await.as_deref() == Some("confirmed");
        let reported = summary
            .anomalous_transaction_ids
            .contains(&txid.to_string());
        assert!(
            confirmed ^ reported,
            "{txid}: captured payment must be confirmed XOR reported, got confirmed={confirmed} reported={reported}"
        );
    }
}

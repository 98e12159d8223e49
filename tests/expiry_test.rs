mod common;

use care_ledger::domain::error::CoreError;
use care_ledger::services::booking::{confirm_booking, create_hold};
use care_ledger::services::capture::capture;
use care_ledger::services::expiry::{expire_one, sweep_once};
use common::*;

// ── 1. a lapsed hold is swept exactly once ─────────────────────────────────

#[tokio::test]
async fn sweep_expires_lapsed_hold() {
    let pool = setup_pool("care_ledger_test_expiry").await;

    let lapsed = make_reservation("tx_sweep_1", "clinic-a", "proc-implant", 60);
    let lapsed_ack = create_hold(&pool, &lapsed).await.unwrap();
    lapse_hold(&pool, lapsed_ack.booking_id).await;

    let fresh = make_reservation("tx_sweep_2", "clinic-a", "proc-implant", 60);
    create_hold(&pool, &fresh).await.unwrap();

    sweep_once(&pool).await.unwrap();

    assert_eq!(booking_status(&pool, "tx_sweep_1").await.as_deref(), Some("expired"));
    assert_eq!(payment_status(&pool, "tx_sweep_1").await.as_deref(), Some("expired"));
    assert_eq!(count_events(&pool, "tx_sweep_1", "HOLD_EXPIRED").await, 1);

    // The live hold is untouched.
    assert_eq!(booking_status(&pool, "tx_sweep_2").await.as_deref(), Some("hold"));
    assert_eq!(count_events(&pool, "tx_sweep_2", "HOLD_EXPIRED").await, 0);

    // Sweeping again finds nothing new for this booking.
    sweep_once(&pool).await.unwrap();
    assert_eq!(count_events(&pool, "tx_sweep_1", "HOLD_EXPIRED").await, 1);
}

// ── 2. a booking that moved on is skipped ──────────────────────────────────

#[tokio::test]
async fn expire_one_skips_confirmed_booking() {
    let pool = setup_pool("care_ledger_test_expiry").await;

    let req = make_reservation("tx_sweep_3", "clinic-a", "proc-implant", 60);
    let ack = create_hold(&pool, &req).await.unwrap();
    confirm_booking(&pool, ack.booking_id).await.unwrap();

    assert!(!expire_one(&pool, ack.booking_id).await.unwrap());
    assert_eq!(booking_status(&pool, "tx_sweep_3").await.as_deref(), Some("confirmed"));
    assert_eq!(count_events(&pool, "tx_sweep_3", "HOLD_EXPIRED").await, 0);
}

// ── 3. sweeper racing a late capture ───────────────────────────────────────
// The payment row lock serializes them: either the capture wins and the
// sweep skips, or the sweep wins and the capture is rejected. Never both.

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn sweeper_races_capture() {
    let pool = setup_pool("care_ledger_test_expiry").await;

    let req = make_reservation("tx_sweep_race", "clinic-a", "proc-implant", 60);
    let ack = create_hold(&pool, &req).await.unwrap();
    lapse_hold(&pool, ack.booking_id).await;

    let p1 = pool.clone();
    let sweep_task = tokio::spawn(async move { expire_one(&p1, ack.booking_id).await.unwrap() });
    let p2 = pool.clone();
    let capture_task = tokio::spawn(async move {
        capture(&p2, &tx("tx_sweep_race"), None, &serde_json::Value::Null).await
    });

    let _swept = sweep_task.await.unwrap();
    let capture_result = capture_task.await.unwrap();

    let expired_events = count_events(&pool, "tx_sweep_race", "HOLD_EXPIRED").await;
    let success_events = count_events(&pool, "tx_sweep_race", "PAYMENT_SUCCESS").await;

    match booking_status(&pool, "tx_sweep_race").await.as_deref() {
        Some("expired") => {
            assert!(matches!(capture_result, Err(CoreError::InvalidState(_))));
            assert_eq!((expired_events, success_events), (1, 0));
            assert_eq!(payment_status(&pool, "tx_sweep_race").await.as_deref(), Some("expired"));
        }
        Some("confirmed") => {
            assert_eq!((expired_events, success_events), (0, 1));
            assert_eq!(payment_status(&pool, "tx_sweep_race").await.as_deref(), Some("captured"));
        }
        other => panic!("unexpected terminal booking status: {other:?}"),
    }
}

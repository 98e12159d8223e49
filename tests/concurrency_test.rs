mod common;

use care_ledger::domain::payment::CaptureOutcome;
use care_ledger::services::booking::{confirm_booking, create_hold};
use care_ledger::services::capture::capture;
use common::*;

// ── 1. concurrent captures: one transition, one event ──────────────────────
// 10 tasks deliver the same capture. The row lock serializes them; exactly
// one performs the transition, the rest land on the idempotent branch.

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_capture_single_transition() {
    let pool = setup_pool("care_ledger_test_concurrency").await;

    let req = make_reservation("tx_ccap", "clinic-a", "proc-implant", 60);
    create_hold(&pool, &req).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..10 {
        let pool = pool.clone();
        handles.push(tokio::spawn(async move {
            capture(&pool, &tx("tx_ccap"), Some("gw_ccap"), &serde_json::json!({}))
                .await
                .unwrap()
        }));
    }

    let mut captured = 0;
    let mut replays = 0;
    for h in handles {
        match h.await.unwrap() {
            CaptureOutcome::Captured { booking_status } => {
                assert_eq!(booking_status.as_str(), "confirmed");
                captured += 1;
            }
            CaptureOutcome::AlreadyCaptured { booking_status } => {
                assert_eq!(booking_status.as_str(), "confirmed");
                replays += 1;
            }
        }
    }

    assert_eq!(captured, 1, "exactly 1 real capture");
    assert_eq!(replays, 9, "9 idempotent replays");
    assert_eq!(payment_status(&pool, "tx_ccap").await.as_deref(), Some("captured"));
    assert_eq!(booking_status(&pool, "tx_ccap").await.as_deref(), Some("confirmed"));
    assert_eq!(count_events(&pool, "tx_ccap", "PAYMENT_SUCCESS").await, 1);
}

// ── 2. concurrent confirms: one transition, one event ──────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_confirm_single_event() {
    let pool = setup_pool("care_ledger_test_concurrency").await;

    let req = make_reservation("tx_cconf", "clinic-a", "proc-implant", 60);
    let ack = create_hold(&pool, &req).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let pool = pool.clone();
        let id = ack.booking_id;
        handles.push(tokio::spawn(async move {
            confirm_booking(&pool, id).await.unwrap()
        }));
    }

    let mut confirmed = 0;
    for h in handles {
        match h.await.unwrap() {
            care_ledger::domain::booking::ConfirmOutcome::Confirmed => confirmed += 1,
            care_ledger::domain::booking::ConfirmOutcome::AlreadyConfirmed => {}
        }
    }

    assert_eq!(confirmed, 1, "exactly 1 real confirm");
    assert_eq!(count_events(&pool, "tx_cconf", "BOOKING_CONFIRMED").await, 1);
}

// ── 3. concurrent reservation replays: one row set, one event ──────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_create_hold_single_row() {
    let pool = setup_pool("care_ledger_test_concurrency").await;

    let mut handles = Vec::new();
    for _ in 0..10 {
        let pool = pool.clone();
        handles.push(tokio::spawn(async move {
            let req = make_reservation("tx_chold", "clinic-a", "proc-implant", 60);
            create_hold(&pool, &req).await.unwrap()
        }));
    }

    let mut booking_ids = std::collections::HashSet::new();
    for h in handles {
        booking_ids.insert(h.await.unwrap().booking_id);
    }
    assert_eq!(booking_ids.len(), 1, "every replay sees the same booking");

    assert_eq!(count_bookings(&pool, "tx_chold").await, 1);
    assert_eq!(count_payments(&pool, "tx_chold").await, 1);
    assert_eq!(count_events(&pool, "tx_chold", "BOOKING_CREATED").await, 1);
}

// ── 4. confirm racing capture ──────────────────────────────────────────────
// Whoever wins, the end state is captured + confirmed with exactly one
// PAYMENT_SUCCESS and at most one BOOKING_CONFIRMED event.

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn confirm_races_capture() {
    let pool = setup_pool("care_ledger_test_concurrency").await;

    let req = make_reservation("tx_race", "clinic-a", "proc-implant", 60);
    let ack = create_hold(&pool, &req).await.unwrap();

    let p1 = pool.clone();
    let confirm_task = tokio::spawn(async move {
        // May observe hold or already-confirmed; both are fine.
        let _ = confirm_booking(&p1, ack.booking_id).await;
    });
    let p2 = pool.clone();
    let capture_task = tokio::spawn(async move {
        capture(&p2, &tx("tx_race"), Some("gw_race"), &serde_json::json!({}))
            .await
            .unwrap()
    });

    confirm_task.await.unwrap();
    capture_task.await.unwrap();

    assert_eq!(payment_status(&pool, "tx_race").await.as_deref(), Some("captured"));
    assert_eq!(booking_status(&pool, "tx_race").await.as_deref(), Some("confirmed"));
    assert_eq!(count_events(&pool, "tx_race", "PAYMENT_SUCCESS").await, 1);
    assert!(count_events(&pool, "tx_race", "BOOKING_CONFIRMED").await <= 1);
}

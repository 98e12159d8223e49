use {
    crate::domain::booking::BookingStatus,
    crate::domain::error::CoreError,
    crate::domain::event::{EventType, NewEvent},
    crate::domain::payment::PaymentStatus,
    crate::infra::postgres::{booking_repo, event_repo, payment_repo},
    chrono::Utc,
    sqlx::PgPool,
    tokio::sync::watch,
};

const SWEEP_BATCH: i64 = 100;

/// Expire one lapsed HOLD booking: payment lock first, booking lock
/// second, state re-checked under the locks, both rows moved and one
/// HOLD_EXPIRED event appended in a single transaction. Returns `false`
/// when the booking moved concurrently and there was nothing to do.
pub async fn expire_one(pool: &PgPool, booking_id: uuid::Uuid) -> Result<bool, CoreError> {
    let mut tx = pool.begin().await?;
    sqlx::query("SET LOCAL lock_timeout = '5s'")
        .execute(&mut *tx)
        .await?;

    let Some(peek) = booking_repo::get_by_id(&mut tx, booking_id).await? else {
        return Ok(false);
    };
    let transaction_id = peek.transaction_id.clone();

    let payment = payment_repo::lock_by_transaction(&mut tx, &transaction_id).await?;

    let Some(locked) = booking_repo::get_for_update(&mut tx, booking_id).await? else {
        return Ok(false);
    };
    let booking = locked.into_domain()?;
    let now = Utc::now();
    if booking.status != BookingStatus::Hold || !booking.hold_has_lapsed(now) {
        // Confirmed, cancelled or re-dated while we were queueing.
        tx.commit().await?;
        return Ok(false);
    }

    booking_repo::set_status(&mut tx, booking_id, BookingStatus::Expired).await?;

    let mut payment_expired = false;
    if let Some(payment) = payment {
        let payment = payment.into_domain()?;
        if payment.status == PaymentStatus::Pending {
            payment_repo::set_status(
                &mut tx,
                payment.id,
                PaymentStatus::Expired,
                None,
                &serde_json::Value::Null,
            )
            .await?;
            payment_expired = true;
        }
    }

    let event = NewEvent::new(
        EventType::HoldExpired,
        transaction_id.as_str(),
        Some(booking_id),
        serde_json::json!({
            "hold_expires_at": booking.hold_expires_at,
            "observed_at": now,
            "payment_expired": payment_expired,
        }),
    );
    event_repo::append(&mut tx, &event).await?;
    tx.commit().await?;

    tracing::info!(booking_id = %booking_id, payment_expired, "hold expired");
    Ok(true)
}

/// One sweep pass over lapsed holds. Per-row failures are logged and
/// skipped so one poisoned row cannot stall the sweep.
pub async fn sweep_once(pool: &PgPool) -> Result<u64, CoreError> {
    let lapsed = booking_repo::find_lapsed_holds(pool, Utc::now(), SWEEP_BATCH).await?;

    let mut expired = 0u64;
    for row in lapsed {
        match expire_one(pool, row.id).await {
            Ok(true) => expired += 1,
            Ok(false) => {}
            Err(e) => {
                tracing::error!(booking_id = %row.id, error = %e, "hold expiry failed");
            }
        }
    }

    Ok(expired)
}

/// Periodic hold-expiry sweeper.
pub async fn run_sweeper(
    pool: PgPool,
    interval: std::time::Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    tracing::info!(interval_secs = interval.as_secs(), "hold-expiry sweeper started");

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                tracing::info!("hold-expiry sweeper shutting down");
                return;
            }
            _ = tokio::time::sleep(interval) => {}
        }

        match sweep_once(&pool).await {
            Ok(0) => {}
            Ok(n) => tracing::info!(count = n, "expired lapsed holds"),
            Err(e) => tracing::error!(error = %e, "sweep error"),
        }
    }
}

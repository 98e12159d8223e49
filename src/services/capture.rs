use {
    crate::domain::booking::BookingStatusView,
    crate::domain::error::CoreError,
    crate::domain::event::{EventType, NewEvent},
    crate::domain::id::TransactionId,
    crate::domain::payment::{CaptureOutcome, PaymentStatus, SettleOutcome},
    crate::infra::postgres::{booking_repo, event_repo, payment_repo},
    sqlx::{PgPool, Postgres, Transaction},
};

async fn set_lock_timeout(tx: &mut Transaction<'_, Postgres>) -> Result<(), CoreError> {
    sqlx::query("SET LOCAL lock_timeout = '5s'")
        .execute(&mut **tx)
        .await?;
    Ok(())
}

async fn booking_view(
    tx: &mut Transaction<'_, Postgres>,
    transaction_id: &str,
) -> Result<BookingStatusView, CoreError> {
    let view = match booking_repo::status_by_transaction(tx, transaction_id).await? {
        Some(status) => BookingStatusView::Present(status.as_str().try_into()?),
        None => BookingStatusView::Missing,
    };
    Ok(view)
}

/// Capture a payment and confirm its booking, exactly once. Retried
/// deliveries of the same gateway event land on the already-captured
/// branch and get the same success answer with no second mutation and no
/// second ledger event.
pub async fn capture(
    pool: &PgPool,
    transaction_id: &TransactionId,
    gateway_reference: Option<&str>,
    gateway_response: &serde_json::Value,
) -> Result<CaptureOutcome, CoreError> {
    let txid = transaction_id.as_str();

    let mut tx = pool.begin().await?;
    set_lock_timeout(&mut tx).await?;

    let Some(payment) = payment_repo::lock_by_transaction(&mut tx, txid).await? else {
        return Err(CoreError::NotFound(format!("payment for transaction {txid}")));
    };
    let payment = payment.into_domain()?;

    match payment.status {
        PaymentStatus::Captured => {
            let booking_status = booking_view(&mut tx, txid).await?;
            tx.commit().await?;
            tracing::info!(
                transaction_id = %txid,
                "capture replay, payment already captured"
            );
            return Ok(CaptureOutcome::AlreadyCaptured { booking_status });
        }
        PaymentStatus::Pending => {}
        other => {
            return Err(CoreError::InvalidState(format!(
                "payment for transaction {txid} is {other}, not pending"
            )));
        }
    }

    payment_repo::mark_captured(&mut tx, payment.id, gateway_reference, gateway_response).await?;

    // The affected-row count of the conditional booking confirm lives in
    // its own counter; the booking row itself is not re-read for this.
    let booking_rows_updated: u64 = booking_repo::confirm_if_hold(&mut tx, txid).await?;

    let event = NewEvent::new(
        EventType::PaymentSuccess,
        txid,
        payment.booking_id,
        serde_json::json!({
            "gateway_reference": gateway_reference,
            "booking_rows_updated": booking_rows_updated,
        }),
    );
    event_repo::append(&mut tx, &event).await?;

    let booking_status = booking_view(&mut tx, txid).await?;
    tx.commit().await?;

    tracing::info!(
        transaction_id = %txid,
        booking_rows_updated,
        booking_status = %booking_status,
        "payment captured"
    );

    Ok(CaptureOutcome::Captured { booking_status })
}

/// Terminal gateway failure: PENDING → FAILED. The booking keeps its hold
/// and lapses on its own clock.
pub async fn fail_payment(
    pool: &PgPool,
    transaction_id: &TransactionId,
    gateway_reference: Option<&str>,
    gateway_response: &serde_json::Value,
) -> Result<SettleOutcome, CoreError> {
    let txid = transaction_id.as_str();

    let mut tx = pool.begin().await?;
    set_lock_timeout(&mut tx).await?;

    let Some(payment) = payment_repo::lock_by_transaction(&mut tx, txid).await? else {
        return Err(CoreError::NotFound(format!("payment for transaction {txid}")));
    };
    let payment = payment.into_domain()?;

    match payment.status {
        PaymentStatus::Failed => {
            tx.commit().await?;
            return Ok(SettleOutcome::AlreadyApplied);
        }
        PaymentStatus::Pending => {}
        other => {
            return Err(CoreError::InvalidState(format!(
                "payment for transaction {txid} is {other}, not pending"
            )));
        }
    }

    payment_repo::set_status(
        &mut tx,
        payment.id,
        PaymentStatus::Failed,
        gateway_reference,
        gateway_response,
    )
    .await?;

    let event = NewEvent::new(
        EventType::PaymentFailed,
        txid,
        payment.booking_id,
        serde_json::json!({ "gateway_reference": gateway_reference }),
    );
    event_repo::append(&mut tx, &event).await?;
    tx.commit().await?;

    tracing::warn!(transaction_id = %txid, "payment failed at gateway");
    Ok(SettleOutcome::Applied)
}

/// Refund: CAPTURED → REFUNDED. The booking is left as it is; undoing a
/// confirmed reservation is a separately audited manual operation.
pub async fn refund_payment(
    pool: &PgPool,
    transaction_id: &TransactionId,
    gateway_reference: Option<&str>,
    gateway_response: &serde_json::Value,
) -> Result<SettleOutcome, CoreError> {
    let txid = transaction_id.as_str();

    let mut tx = pool.begin().await?;
    set_lock_timeout(&mut tx).await?;

    let Some(payment) = payment_repo::lock_by_transaction(&mut tx, txid).await? else {
        return Err(CoreError::NotFound(format!("payment for transaction {txid}")));
    };
    let payment = payment.into_domain()?;

    match payment.status {
        PaymentStatus::Refunded => {
            tx.commit().await?;
            return Ok(SettleOutcome::AlreadyApplied);
        }
        PaymentStatus::Captured => {}
        other => {
            return Err(CoreError::InvalidState(format!(
                "payment for transaction {txid} is {other}, not captured"
            )));
        }
    }

    payment_repo::set_status(
        &mut tx,
        payment.id,
        PaymentStatus::Refunded,
        gateway_reference,
        gateway_response,
    )
    .await?;

    let event = NewEvent::new(
        EventType::PaymentRefunded,
        txid,
        payment.booking_id,
        serde_json::json!({ "gateway_reference": gateway_reference }),
    );
    event_repo::append(&mut tx, &event).await?;
    tx.commit().await?;

    tracing::info!(transaction_id = %txid, "payment refunded");
    Ok(SettleOutcome::Applied)
}

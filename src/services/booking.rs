use {
    crate::domain::booking::{BookingStatus, CancelOutcome, ConfirmOutcome},
    crate::domain::error::CoreError,
    crate::domain::event::{EventType, NewEvent},
    crate::domain::id::{IdempotencyKey, TransactionId},
    crate::domain::money::Money,
    crate::domain::payment::PaymentStatus,
    crate::infra::postgres::{booking_repo, event_repo, payment_repo},
    chrono::{DateTime, Duration, Utc},
    sqlx::{PgPool, Postgres, Transaction},
    uuid::Uuid,
};

const MIN_HOLD_TTL_MINUTES: i64 = 1;
const MAX_HOLD_TTL_MINUTES: i64 = 24 * 60;

pub struct ReservationRequest {
    pub transaction_id: TransactionId,
    pub node_id: String,
    pub procedure_id: String,
    pub scheduled_slot: DateTime<Utc>,
    pub hold_ttl_minutes: i64,
    pub money: Money,
    pub gateway: String,
    pub idempotency_key: Option<IdempotencyKey>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ReservationAck {
    pub booking_id: Uuid,
    pub transaction_id: String,
    pub status: BookingStatus,
    pub hold_expires_at: Option<DateTime<Utc>>,
}

async fn set_lock_timeout(tx: &mut Transaction<'_, Postgres>) -> Result<(), CoreError> {
    sqlx::query("SET LOCAL lock_timeout = '5s'")
        .execute(&mut **tx)
        .await?;
    Ok(())
}

/// Create a HOLD booking with its PENDING payment and the BOOKING_CREATED
/// event, all in one transaction. Idempotent on transaction_id: a replay
/// returns the reservation as it currently stands, with no second row and
/// no second event.
pub async fn create_hold(
    pool: &PgPool,
    req: &ReservationRequest,
) -> Result<ReservationAck, CoreError> {
    if !(MIN_HOLD_TTL_MINUTES..=MAX_HOLD_TTL_MINUTES).contains(&req.hold_ttl_minutes) {
        return Err(CoreError::Validation(format!(
            "hold_ttl_minutes must be {MIN_HOLD_TTL_MINUTES}..={MAX_HOLD_TTL_MINUTES}, got {}",
            req.hold_ttl_minutes
        )));
    }

    let mut tx = pool.begin().await?;
    set_lock_timeout(&mut tx).await?;

    let hold_expires_at = Utc::now() + Duration::minutes(req.hold_ttl_minutes);
    let booking = booking_repo::NewBookingRow {
        id: Uuid::now_v7(),
        transaction_id: req.transaction_id.as_str().to_string(),
        node_id: req.node_id.clone(),
        procedure_id: req.procedure_id.clone(),
        hold_expires_at,
        scheduled_slot: req.scheduled_slot,
    };

    let inserted = booking_repo::insert_hold(&mut tx, &booking).await?;
    if !inserted {
        // Replay: hand back the reservation as it stands today.
        tx.commit().await?;
        let existing = booking_repo::get_by_transaction(pool, req.transaction_id.as_str())
            .await?
            .ok_or_else(|| {
                CoreError::NotFound(format!(
                    "booking for transaction {} vanished during replay",
                    req.transaction_id
                ))
            })?
            .into_domain()?;
        tracing::info!(
            transaction_id = %req.transaction_id,
            booking_id = %existing.id,
            "reservation replay, returning existing booking"
        );
        return Ok(ReservationAck {
            booking_id: existing.id,
            transaction_id: existing.transaction_id,
            status: existing.status,
            hold_expires_at: existing.hold_expires_at,
        });
    }

    let key = req
        .idempotency_key
        .clone()
        .unwrap_or_else(|| IdempotencyKey::for_reservation(&req.transaction_id));
    let payment = payment_repo::NewPaymentRow {
        id: Uuid::now_v7(),
        transaction_id: req.transaction_id.as_str().to_string(),
        booking_id: Some(booking.id),
        amount: req.money.amount().cents(),
        currency: req.money.currency().as_str().to_string(),
        gateway: req.gateway.clone(),
        idempotency_key: key.as_str().to_string(),
    };

    let payment_inserted = payment_repo::insert_pending(&mut tx, &payment).await?;
    if !payment_inserted {
        // The booking row was fresh, so this key belongs to some other
        // transaction: a real collision, not a replay.
        return Err(CoreError::Conflict(format!(
            "idempotency key {} already bound to another payment",
            key
        )));
    }

    let event = NewEvent::new(
        EventType::BookingCreated,
        req.transaction_id.as_str(),
        Some(booking.id),
        serde_json::json!({
            "node_id": req.node_id,
            "procedure_id": req.procedure_id,
            "hold_expires_at": hold_expires_at,
            "amount": req.money.amount().cents(),
            "currency": req.money.currency().as_str(),
            "gateway": req.gateway,
        }),
    );
    event_repo::append(&mut tx, &event).await?;

    tx.commit().await?;

    tracing::info!(
        transaction_id = %req.transaction_id,
        booking_id = %booking.id,
        "reservation created"
    );

    Ok(ReservationAck {
        booking_id: booking.id,
        transaction_id: booking.transaction_id,
        status: BookingStatus::Hold,
        hold_expires_at: Some(hold_expires_at),
    })
}

/// Confirm a HOLD booking. One transaction: payment row locked first (all
/// operations that may touch both rows take them in that order), then the
/// booking row, then the branch dictated by its current state.
pub async fn confirm_booking(pool: &PgPool, booking_id: Uuid) -> Result<ConfirmOutcome, CoreError> {
    let mut tx = pool.begin().await?;
    set_lock_timeout(&mut tx).await?;

    let booking = lock_pair_by_booking(&mut tx, booking_id).await?;
    let transaction_id = booking.transaction_id.clone();

    match booking.status {
        BookingStatus::Confirmed => {
            // Idempotent re-confirm: no mutation, no event.
            tx.commit().await?;
            return Ok(ConfirmOutcome::AlreadyConfirmed);
        }
        BookingStatus::Hold => {}
        other => {
            return Err(CoreError::InvalidState(format!(
                "booking {booking_id} is {other}, not hold"
            )));
        }
    }

    let now = Utc::now();
    if booking.hold_has_lapsed(now) {
        booking_repo::set_status(&mut tx, booking_id, BookingStatus::Expired).await?;
        expire_pending_payment(&mut tx, &transaction_id).await?;
        let event = NewEvent::new(
            EventType::HoldExpired,
            transaction_id.as_str(),
            Some(booking_id),
            serde_json::json!({
                "hold_expires_at": booking.hold_expires_at,
                "observed_at": now,
            }),
        );
        event_repo::append(&mut tx, &event).await?;
        tx.commit().await?;

        tracing::warn!(booking_id = %booking_id, "confirm arrived after hold expiry");
        return Err(CoreError::Expired(format!(
            "booking {booking_id} hold lapsed before confirmation"
        )));
    }

    booking_repo::mark_confirmed(&mut tx, booking_id).await?;
    let event = NewEvent::new(
        EventType::BookingConfirmed,
        transaction_id.as_str(),
        Some(booking_id),
        serde_json::json!({ "confirmed_at": now }),
    );
    event_repo::append(&mut tx, &event).await?;
    tx.commit().await?;

    tracing::info!(booking_id = %booking_id, "booking confirmed");
    Ok(ConfirmOutcome::Confirmed)
}

/// Cancel a HOLD booking; the pending payment is closed out in the same
/// transaction. Already-cancelled is an idempotent success.
pub async fn cancel_booking(pool: &PgPool, booking_id: Uuid) -> Result<CancelOutcome, CoreError> {
    let mut tx = pool.begin().await?;
    set_lock_timeout(&mut tx).await?;

    let booking = lock_pair_by_booking(&mut tx, booking_id).await?;
    let transaction_id = booking.transaction_id.clone();

    match booking.status {
        BookingStatus::Cancelled => {
            tx.commit().await?;
            return Ok(CancelOutcome::AlreadyCancelled);
        }
        BookingStatus::Hold => {}
        other => {
            return Err(CoreError::InvalidState(format!(
                "booking {booking_id} is {other}, not hold"
            )));
        }
    }

    booking_repo::set_status(&mut tx, booking_id, BookingStatus::Cancelled).await?;
    expire_pending_payment(&mut tx, &transaction_id).await?;
    let event = NewEvent::new(
        EventType::BookingCancelled,
        transaction_id.as_str(),
        Some(booking_id),
        serde_json::json!({ "cancelled_at": Utc::now() }),
    );
    event_repo::append(&mut tx, &event).await?;
    tx.commit().await?;

    tracing::info!(booking_id = %booking_id, "booking cancelled");
    Ok(CancelOutcome::Cancelled)
}

/// Take the row locks for an operation keyed by booking id: an unlocked
/// peek learns the transaction id, then the payment row and the booking
/// row are locked in that order. Every code path that may touch both rows
/// uses this order, so no two of them wait on each other in a cycle.
/// Returns the booking as read under its lock.
async fn lock_pair_by_booking(
    tx: &mut Transaction<'_, Postgres>,
    booking_id: Uuid,
) -> Result<crate::domain::booking::Booking, CoreError> {
    let Some(peek) = booking_repo::get_by_id(tx, booking_id).await? else {
        return Err(CoreError::NotFound(format!("booking {booking_id}")));
    };

    let _payment = payment_repo::lock_by_transaction(tx, &peek.transaction_id).await?;

    let Some(locked) = booking_repo::get_for_update(tx, booking_id).await? else {
        return Err(CoreError::NotFound(format!("booking {booking_id}")));
    };
    locked.into_domain()
}

/// Close out the PENDING payment of a lapsing or cancelled booking. No-op
/// when the payment is absent or already terminal.
async fn expire_pending_payment(
    tx: &mut Transaction<'_, Postgres>,
    transaction_id: &str,
) -> Result<(), CoreError> {
    let Some(payment) = payment_repo::lock_by_transaction(tx, transaction_id).await? else {
        return Ok(());
    };
    let payment = payment.into_domain()?;
    if payment.status == PaymentStatus::Pending {
        payment_repo::set_status(
            tx,
            payment.id,
            PaymentStatus::Expired,
            None,
            &serde_json::Value::Null,
        )
        .await?;
    }
    Ok(())
}

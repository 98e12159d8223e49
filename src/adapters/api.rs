use {
    crate::{
        AppState,
        adapters::api_errors::ApiError,
        domain::booking::BookingStatusView,
        domain::error::CoreError,
        domain::id::{IdempotencyKey, TransactionId},
        domain::money::{Currency, Money, MoneyAmount},
        domain::routing::Candidate,
        services::{booking, capture, reconciliation, routing},
    },
    axum::{
        Json,
        extract::{Path, Query, State},
    },
    chrono::{DateTime, Duration, Utc},
    serde::Deserialize,
    uuid::Uuid,
};

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct CandidateQuery {
    pub location: String,
    pub procedure_id: String,
    #[serde(default = "default_true")]
    pub accepts_international: bool,
}

pub async fn find_candidates(
    State(state): State<AppState>,
    Query(query): Query<CandidateQuery>,
) -> Result<Json<Vec<Candidate>>, ApiError> {
    let candidates = routing::find_candidates(
        &state.pool,
        &query.location,
        &query.procedure_id,
        query.accepts_international,
    )
    .await?;
    Ok(Json(candidates))
}

#[derive(Debug, Deserialize)]
pub struct CreateReservationRequest {
    pub transaction_id: String,
    pub node_id: String,
    pub procedure_id: String,
    pub slot: DateTime<Utc>,
    pub hold_ttl_minutes: i64,
    pub amount_cents: i64,
    pub currency: String,
    pub gateway: String,
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

pub async fn create_reservation(
    State(state): State<AppState>,
    Json(req): Json<CreateReservationRequest>,
) -> Result<Json<booking::ReservationAck>, ApiError> {
    let request = booking::ReservationRequest {
        transaction_id: TransactionId::new(req.transaction_id)?,
        node_id: req.node_id,
        procedure_id: req.procedure_id,
        scheduled_slot: req.slot,
        hold_ttl_minutes: req.hold_ttl_minutes,
        money: Money::new(
            MoneyAmount::new(req.amount_cents)?,
            Currency::try_from(req.currency.as_str())?,
        ),
        gateway: req.gateway,
        idempotency_key: req.idempotency_key.map(IdempotencyKey::new).transpose()?,
    };

    let ack = booking::create_hold(&state.pool, &request).await?;
    Ok(Json(ack))
}

pub async fn confirm_booking(
    State(state): State<AppState>,
    Path(booking_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let outcome = booking::confirm_booking(&state.pool, booking_id).await?;
    Ok(Json(serde_json::json!({
        "ok": true,
        "booking_status": "confirmed",
        "idempotent": matches!(outcome, crate::domain::booking::ConfirmOutcome::AlreadyConfirmed),
    })))
}

pub async fn cancel_booking(
    State(state): State<AppState>,
    Path(booking_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let outcome = booking::cancel_booking(&state.pool, booking_id).await?;
    Ok(Json(serde_json::json!({
        "ok": true,
        "booking_status": "cancelled",
        "idempotent": matches!(outcome, crate::domain::booking::CancelOutcome::AlreadyCancelled),
    })))
}

#[derive(Debug, Deserialize)]
pub struct ConfirmPaymentRequest {
    pub transaction_id: String,
    #[serde(default)]
    pub gateway_reference: Option<String>,
    #[serde(default)]
    pub gateway_response: Option<serde_json::Value>,
}

/// Internal idempotent confirmation used by pay-init flows. Business
/// failures come back as `ok: false` with the current statuses so the
/// caller can re-route instead of treating them as transport errors.
pub async fn confirm_payment(
    State(state): State<AppState>,
    Json(req): Json<ConfirmPaymentRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let transaction_id = TransactionId::new(req.transaction_id)?;
    let response = req.gateway_response.unwrap_or(serde_json::Value::Null);

    match capture::capture(
        &state.pool,
        &transaction_id,
        req.gateway_reference.as_deref(),
        &response,
    )
    .await
    {
        Ok(outcome) => Ok(Json(serde_json::json!({
            "ok": true,
            "payment_status": "captured",
            "booking_status": outcome.booking_status().as_str(),
        }))),
        Err(err) => {
            let code = match &err {
                CoreError::NotFound(_) => "PAYMENT_NOT_FOUND",
                CoreError::InvalidState(_) => "INVALID_PAYMENT_STATUS",
                CoreError::Expired(_) => "HOLD_EXPIRED",
                _ => return Err(err.into()),
            };

            let payment_status = crate::infra::postgres::payment_repo::get_by_transaction(
                &state.pool,
                transaction_id.as_str(),
            )
            .await?
            .map(|p| p.status);
            let booking_status = match crate::infra::postgres::booking_repo::get_by_transaction(
                &state.pool,
                transaction_id.as_str(),
            )
            .await?
            {
                Some(b) => BookingStatusView::Present(b.status.as_str().try_into()?),
                None => BookingStatusView::Missing,
            };

            Ok(Json(serde_json::json!({
                "ok": false,
                "error": code,
                "payment_status": payment_status,
                "booking_status": booking_status.as_str(),
            })))
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct RunReconciliationRequest {
    pub period_start: Option<DateTime<Utc>>,
    pub period_end: Option<DateTime<Utc>>,
}

pub async fn run_reconciliation(
    State(state): State<AppState>,
    body: Option<Json<RunReconciliationRequest>>,
) -> Result<Json<crate::domain::recon::ReconSummary>, ApiError> {
    let req = body.map(|Json(r)| r).unwrap_or_default();
    let period_end = req.period_end.unwrap_or_else(Utc::now);
    let period_start = req
        .period_start
        .unwrap_or_else(|| period_end - Duration::hours(24));

    let summary = reconciliation::run_reconciliation(
        &state.pool,
        &state.report_signing_secret,
        period_start,
        period_end,
    )
    .await?;
    Ok(Json(summary))
}

pub async fn latest_report(
    State(state): State<AppState>,
) -> Result<Json<crate::infra::postgres::recon_repo::ReportRow>, ApiError> {
    let report = crate::infra::postgres::recon_repo::latest_report(&state.pool)
        .await?
        .ok_or_else(|| CoreError::NotFound("no reconciliation report yet".into()))?;
    Ok(Json(report))
}

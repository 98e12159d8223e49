use {
    crate::{
        AppState,
        adapters::{api_errors::ApiError, signature},
        domain::error::CoreError,
        domain::id::TransactionId,
        domain::payment::SettleOutcome,
        services::capture,
    },
    axum::{Json, extract::State, http::HeaderMap},
    chrono::Utc,
    serde::Deserialize,
};

/// Gateway webhook envelope. Parsed only after the signature gate has
/// accepted the raw payload.
#[derive(Debug, Deserialize)]
pub struct GatewayEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub transaction_id: String,
    #[serde(default)]
    pub gateway_reference: Option<String>,
    #[serde(default)]
    pub data: serde_json::Value,
}

#[tracing::instrument(
    name = "webhook",
    skip_all,
    fields(event_id = tracing::field::Empty, event_type = tracing::field::Empty)
)]
pub async fn gateway_webhook_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<serde_json::Value>, ApiError> {
    // Authentication first: nothing below runs on an unsigned payload.
    let sig = headers
        .get(signature::SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| CoreError::Auth("missing Gateway-Signature header".into()))?;
    signature::verify_signature(
        &state.gateway_webhook_secret,
        sig,
        body.as_bytes(),
        Utc::now().timestamp(),
    )?;

    let event: GatewayEvent = serde_json::from_str(&body).map_err(CoreError::from)?;
    tracing::Span::current()
        .record("event_id", tracing::field::display(&event.id))
        .record("event_type", tracing::field::display(&event.event_type));

    let transaction_id = TransactionId::new(event.transaction_id.clone())?;
    let gateway_reference = event.gateway_reference.as_deref();

    match event.event_type.as_str() {
        "payment.captured" => {
            let outcome =
                capture::capture(&state.pool, &transaction_id, gateway_reference, &event.data)
                    .await?;
            Ok(Json(serde_json::json!({
                "status": "captured",
                "booking_status": outcome.booking_status().as_str(),
            })))
        }
        "payment.failed" => {
            let outcome = capture::fail_payment(
                &state.pool,
                &transaction_id,
                gateway_reference,
                &event.data,
            )
            .await?;
            Ok(Json(serde_json::json!({
                "status": settle_status(outcome, "failed"),
            })))
        }
        "payment.refunded" => {
            let outcome = capture::refund_payment(
                &state.pool,
                &transaction_id,
                gateway_reference,
                &event.data,
            )
            .await?;
            Ok(Json(serde_json::json!({
                "status": settle_status(outcome, "refunded"),
            })))
        }
        other => {
            tracing::info!(event_type = %other, "unhandled gateway event type, ignoring");
            Ok(Json(serde_json::json!({ "status": "ignored" })))
        }
    }
}

fn settle_status(outcome: SettleOutcome, applied: &'static str) -> &'static str {
    match outcome {
        SettleOutcome::Applied => applied,
        SettleOutcome::AlreadyApplied => "duplicate",
    }
}

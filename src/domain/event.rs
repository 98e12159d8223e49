use {
    super::error::CoreError,
    serde::Serialize,
    std::fmt,
    uuid::Uuid,
};

/// Ledger event types. One row is appended per state transition, inside
/// the same transaction as the transition itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EventType {
    BookingCreated,
    BookingConfirmed,
    BookingCancelled,
    HoldExpired,
    PaymentSuccess,
    PaymentFailed,
    PaymentRefunded,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BookingCreated => "BOOKING_CREATED",
            Self::BookingConfirmed => "BOOKING_CONFIRMED",
            Self::BookingCancelled => "BOOKING_CANCELLED",
            Self::HoldExpired => "HOLD_EXPIRED",
            Self::PaymentSuccess => "PAYMENT_SUCCESS",
            Self::PaymentFailed => "PAYMENT_FAILED",
            Self::PaymentRefunded => "PAYMENT_REFUNDED",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for EventType {
    type Error = CoreError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "BOOKING_CREATED" => Ok(Self::BookingCreated),
            "BOOKING_CONFIRMED" => Ok(Self::BookingConfirmed),
            "BOOKING_CANCELLED" => Ok(Self::BookingCancelled),
            "HOLD_EXPIRED" => Ok(Self::HoldExpired),
            "PAYMENT_SUCCESS" => Ok(Self::PaymentSuccess),
            "PAYMENT_FAILED" => Ok(Self::PaymentFailed),
            "PAYMENT_REFUNDED" => Ok(Self::PaymentRefunded),
            other => Err(CoreError::Validation(format!("unknown event type: {other}"))),
        }
    }
}

/// For INSERT into the append-only ledger.
pub struct NewEvent {
    pub id: Uuid,
    pub event_type: EventType,
    pub transaction_id: String,
    pub booking_id: Option<Uuid>,
    pub payload: serde_json::Value,
}

impl NewEvent {
    pub fn new(
        event_type: EventType,
        transaction_id: impl Into<String>,
        booking_id: Option<Uuid>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            event_type,
            transaction_id: transaction_id.into(),
            booking_id,
            payload,
        }
    }
}

use {
    super::booking::BookingStatusView,
    super::error::CoreError,
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
    std::fmt,
    uuid::Uuid,
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Captured,
    Failed,
    Refunded,
    Expired,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Captured => "captured",
            Self::Failed => "failed",
            Self::Refunded => "refunded",
            Self::Expired => "expired",
        }
    }

    pub fn can_transition_to(&self, new: &PaymentStatus) -> bool {
        matches!(
            (self, new),
            (Self::Pending, Self::Captured)
                | (Self::Pending, Self::Failed)
                | (Self::Pending, Self::Expired)
                | (Self::Captured, Self::Refunded)
        )
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for PaymentStatus {
    type Error = CoreError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "pending" => Ok(Self::Pending),
            "captured" => Ok(Self::Captured),
            "failed" => Ok(Self::Failed),
            "refunded" => Ok(Self::Refunded),
            "expired" => Ok(Self::Expired),
            other => Err(CoreError::Validation(format!(
                "unknown payment status: {other}"
            ))),
        }
    }
}

/// Full payment record from the store.
#[derive(Debug, Clone, Serialize)]
pub struct Payment {
    pub id: Uuid,
    pub transaction_id: String,
    pub booking_id: Option<Uuid>,
    pub amount: i64,
    pub currency: String,
    pub gateway: String,
    pub status: PaymentStatus,
    pub idempotency_key: String,
    pub gateway_reference: Option<String>,
    pub captured_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Outcome of the capture protocol. Both variants are success-shaped for
/// the gateway: a retried delivery lands on `AlreadyCaptured` and gets the
/// same answer as the first delivery, without a second mutation or event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureOutcome {
    Captured { booking_status: BookingStatusView },
    AlreadyCaptured { booking_status: BookingStatusView },
}

impl CaptureOutcome {
    pub fn booking_status(&self) -> BookingStatusView {
        match self {
            Self::Captured { booking_status } | Self::AlreadyCaptured { booking_status } => {
                *booking_status
            }
        }
    }
}

/// Outcome of a terminal-failure or refund gateway event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleOutcome {
    Applied,
    AlreadyApplied,
}

use {
    super::error::CoreError,
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
    std::fmt,
    uuid::Uuid,
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Hold,
    Confirmed,
    Expired,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hold => "hold",
            Self::Confirmed => "confirmed",
            Self::Expired => "expired",
            Self::Cancelled => "cancelled",
        }
    }

    /// Confirmed and the terminal states are absorbing.
    pub fn can_transition_to(&self, new: &BookingStatus) -> bool {
        matches!(
            (self, new),
            (Self::Hold, Self::Confirmed)
                | (Self::Hold, Self::Expired)
                | (Self::Hold, Self::Cancelled)
        )
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for BookingStatus {
    type Error = CoreError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "hold" => Ok(Self::Hold),
            "confirmed" => Ok(Self::Confirmed),
            "expired" => Ok(Self::Expired),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(CoreError::Validation(format!(
                "unknown booking status: {other}"
            ))),
        }
    }
}

/// Booking status as reported back from capture: the booking row may
/// legitimately be absent, and callers get an explicit sentinel rather
/// than a bare null.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingStatusView {
    Present(BookingStatus),
    Missing,
}

impl BookingStatusView {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Present(status) => status.as_str(),
            Self::Missing => "missing",
        }
    }
}

impl fmt::Display for BookingStatusView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Serialize for BookingStatusView {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Full booking record from the store.
#[derive(Debug, Clone, Serialize)]
pub struct Booking {
    pub id: Uuid,
    pub transaction_id: String,
    pub node_id: String,
    pub procedure_id: String,
    pub status: BookingStatus,
    pub hold_expires_at: Option<DateTime<Utc>>,
    pub scheduled_slot: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Booking {
    pub fn hold_has_lapsed(&self, now: DateTime<Utc>) -> bool {
        matches!(self.hold_expires_at, Some(deadline) if deadline <= now)
    }
}

/// Outcome of a confirm call. Errors (not found, invalid state, lapsed
/// hold) travel as `CoreError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmOutcome {
    /// HOLD transitioned to CONFIRMED; one event appended.
    Confirmed,
    /// Booking was already CONFIRMED; nothing mutated, no event.
    AlreadyConfirmed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    Cancelled,
    AlreadyCancelled,
}

use derive_more::Display;
use serde::{Deserialize, Serialize};

use super::error::CoreError;

const MAX_ID_LEN: usize = 128;

/// Caller-supplied transaction identifier correlating a booking with its
/// payment and ledger events.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(String);

impl TransactionId {
    pub fn new(id: impl Into<String>) -> Result<Self, CoreError> {
        let id = id.into();
        if id.is_empty() || id.len() > MAX_ID_LEN {
            return Err(CoreError::Validation(format!(
                "TransactionId must be 1..={MAX_ID_LEN} bytes, got {} bytes",
                id.len()
            )));
        }
        if !id.bytes().all(|b| b.is_ascii_graphic()) {
            return Err(CoreError::Validation(format!(
                "TransactionId must be printable ASCII without spaces, got: {id:?}"
            )));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

/// Identifies one logical payment attempt across retries.
#[derive(Debug, Clone, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    pub fn new(key: impl Into<String>) -> Result<Self, CoreError> {
        let key = key.into();
        if key.is_empty() || key.len() > MAX_ID_LEN {
            return Err(CoreError::Validation(format!(
                "IdempotencyKey must be 1..={MAX_ID_LEN} bytes, got {} bytes",
                key.len()
            )));
        }
        Ok(Self(key))
    }

    /// Default key for the reservation-time PENDING payment.
    pub fn for_reservation(tx_id: &TransactionId) -> Self {
        Self(format!("resv-{}", tx_id.as_str()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

use {
    crate::domain::error::CoreError,
    hmac::{Hmac, Mac},
    sha2::Sha256,
};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "Gateway-Signature";

/// Maximum accepted clock skew between the gateway's timestamp and ours.
pub const TIMESTAMP_TOLERANCE_SECS: i64 = 300;

/// Compute the signature the gateway is expected to send: HMAC-SHA256 over
/// `"{timestamp}.{payload}"`, hex-encoded.
pub fn sign_payload(secret: &str, timestamp: i64, payload: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// The single authentication gate in front of every externally reachable
/// mutation: parses a `t=<unix>,v1=<hex>` header, checks the timestamp
/// tolerance and verifies the MAC in constant time. Runs before any
/// payload parsing; there is no bypass path.
pub fn verify_signature(
    secret: &str,
    header: &str,
    payload: &[u8],
    now: i64,
) -> Result<(), CoreError> {
    let mut timestamp: Option<i64> = None;
    let mut candidates: Vec<&str> = Vec::new();

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", v)) => {
                timestamp = v.parse().ok();
            }
            Some(("v1", v)) => candidates.push(v),
            _ => {}
        }
    }

    let timestamp = timestamp
        .ok_or_else(|| CoreError::Auth("signature header missing timestamp".into()))?;
    if candidates.is_empty() {
        return Err(CoreError::Auth("signature header missing v1 signature".into()));
    }

    if (now - timestamp).abs() > TIMESTAMP_TOLERANCE_SECS {
        return Err(CoreError::Auth(format!(
            "signature timestamp outside tolerance: {timestamp}"
        )));
    }

    let verified = candidates.iter().any(|candidate| {
        let Ok(raw) = hex::decode(candidate) else {
            return false;
        };
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .expect("HMAC accepts any key length");
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        mac.verify_slice(&raw).is_ok()
    });

    if !verified {
        return Err(CoreError::Auth("signature mismatch".into()));
    }

    Ok(())
}

/// Webhook signature verification
///
/// The provider signs each delivery with HMAC-SHA256 over `"<t>.<body>"`
/// and sends `Stripe-Signature: t=<unix>,v1=<hex>[,v1=<hex>...]`. A
/// delivery is accepted when any `v1` entry matches and `t` is within the
/// tolerance of the current time.
///
/// # Example
///
/// ```
/// use tourbook_shared::payments::signature::{sign_payload, verify_signature, DEFAULT_TOLERANCE_SECS};
///
/// let body = br#"{"id":"evt_1"}"#;
/// let header = sign_payload(body, "whsec_test", 1_700_000_000);
///
/// assert!(verify_signature(body, &header, "whsec_test", DEFAULT_TOLERANCE_SECS, 1_700_000_100).is_ok());
/// assert!(verify_signature(body, &header, "whsec_other", DEFAULT_TOLERANCE_SECS, 1_700_000_100).is_err());
/// ```

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Maximum age (and clock skew) of a signed delivery, in seconds
pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

const SCHEME: &str = "v1";

/// Error type for signature verification
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("Unable to extract timestamp and signatures from header")]
    MalformedHeader,

    #[error("No signatures found with expected scheme v1")]
    NoSignatures,

    #[error("Timestamp outside the tolerance zone")]
    TimestampOutOfTolerance,

    #[error("No signatures found matching the expected signature for payload")]
    Mismatch,

    #[error("Invalid signing secret")]
    InvalidSecret,
}

/// Parsed `Stripe-Signature` header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    pub timestamp: i64,
    pub signatures: Vec<String>,
}

/// Parses `t=...,v1=...` pairs; unknown schemes are ignored
pub fn parse_header(header: &str) -> Result<SignatureHeader, SignatureError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for pair in header.split(',') {
        let Some((key, value)) = pair.trim().split_once('=') else {
            continue;
        };

        match key {
            "t" => {
                timestamp = Some(
                    value
                        .parse::<i64>()
                        .map_err(|_| SignatureError::MalformedHeader)?,
                )
            }
            SCHEME => signatures.push(value.to_string()),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(SignatureError::MalformedHeader)?;
    if signatures.is_empty() {
        return Err(SignatureError::NoSignatures);
    }

    Ok(SignatureHeader {
        timestamp,
        signatures,
    })
}

fn mac_for(secret: &str, timestamp: i64, payload: &[u8]) -> Result<HmacSha256, SignatureError> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::InvalidSecret)?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac)
}

/// Hex HMAC-SHA256 of `"<timestamp>.<payload>"`
pub fn compute_signature(secret: &str, timestamp: i64, payload: &[u8]) -> Result<String, SignatureError> {
    let mac = mac_for(secret, timestamp, payload)?;
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Verifies a delivery, returning its signed timestamp
///
/// Signatures are compared in constant time.
pub fn verify_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    tolerance_secs: i64,
    now: i64,
) -> Result<i64, SignatureError> {
    let parsed = parse_header(header)?;

    let matched = parsed.signatures.iter().any(|candidate| {
        let Ok(expected) = hex::decode(candidate) else {
            return false;
        };
        mac_for(secret, parsed.timestamp, payload)
            .map(|mac| mac.verify_slice(&expected).is_ok())
            .unwrap_or(false)
    });

    if !matched {
        return Err(SignatureError::Mismatch);
    }

    if (now - parsed.timestamp).abs() > tolerance_secs {
        return Err(SignatureError::TimestampOutOfTolerance);
    }

    Ok(parsed.timestamp)
}

/// Builds a signature header the way the provider does
///
/// Used by the mock provider and tests to produce valid deliveries.
pub fn sign_payload(payload: &[u8], secret: &str, timestamp: i64) -> String {
    let signature = compute_signature(secret, timestamp, payload).unwrap_or_default();
    format!("t={},{}={}", timestamp, SCHEME, signature)
}

//! Stripe-style webhook signatures: `Stripe-Signature: t=<unix>,v1=<hex hmac>`
//! where the HMAC-SHA256 covers `"<t>.<raw body>"`.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("malformed signature header")]
    Malformed,
    #[error("no matching v1 signature")]
    Mismatch,
    #[error("timestamp outside tolerance")]
    Expired,
}

pub fn compute_signature(secret: &str, timestamp: i64, payload: &[u8]) -> String {
    // HMAC accepts keys of any length.
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac key");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

pub fn signature_header(secret: &str, timestamp: i64, payload: &[u8]) -> String {
    format!(
        "t={},v1={}",
        timestamp,
        compute_signature(secret, timestamp, payload)
    )
}

pub fn verify_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    now_unix: i64,
    tolerance_secs: i64,
) -> Result<(), SignatureError> {
    let mut timestamp: Option<i64> = None;
    let mut candidates: Vec<&str> = Vec::new();
    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => timestamp = value.parse().ok(),
            "v1" => candidates.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(SignatureError::Malformed)?;
    if candidates.is_empty() {
        return Err(SignatureError::Malformed);
    }

    let expected = compute_signature(secret, timestamp, payload);
    let matched = candidates
        .iter()
        .any(|candidate| bool::from(candidate.as_bytes().ct_eq(expected.as_bytes())));
    if !matched {
        return Err(SignatureError::Mismatch);
    }

    if (now_unix - timestamp).abs() > tolerance_secs {
        return Err(SignatureError::Expired);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test_secret";

    #[test]
    fn accepts_a_fresh_valid_signature() {
        let payload = br#"{"id":"evt_1"}"#;
        let header = signature_header(SECRET, 1_700_000_000, payload);
        assert_eq!(
            verify_signature(payload, &header, SECRET, 1_700_000_010, DEFAULT_TOLERANCE_SECS),
            Ok(())
        );
    }

    #[test]
    fn rejects_tampered_payload_and_wrong_secret() {
        let payload = br#"{"id":"evt_1"}"#;
        let header = signature_header(SECRET, 1_700_000_000, payload);
        assert_eq!(
            verify_signature(
                br#"{"id":"evt_2"}"#,
                &header,
                SECRET,
                1_700_000_000,
                DEFAULT_TOLERANCE_SECS
            ),
            Err(SignatureError::Mismatch)
        );
        assert_eq!(
            verify_signature(payload, &header, "whsec_other", 1_700_000_000, DEFAULT_TOLERANCE_SECS),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn rejects_stale_and_malformed_headers() {
        let payload = b"{}";
        let header = signature_header(SECRET, 1_700_000_000, payload);
        assert_eq!(
            verify_signature(payload, &header, SECRET, 1_700_001_000, DEFAULT_TOLERANCE_SECS),
            Err(SignatureError::Expired)
        );
        assert_eq!(
            verify_signature(payload, "t=1,v1=", SECRET, 1, DEFAULT_TOLERANCE_SECS),
            Err(SignatureError::Mismatch)
        );
        assert_eq!(
            verify_signature(payload, "garbage", SECRET, 1, DEFAULT_TOLERANCE_SECS),
            Err(SignatureError::Malformed)
        );
    }
}

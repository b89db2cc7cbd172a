//! Stripe webhook signature verification.
//!
//! HMAC-SHA256 over `"{timestamp}.{payload}"` compared in constant time,
//! plus a timestamp window against replays.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use super::webhook_errors::WebhookError;

type HmacSha256 = Hmac<Sha256>;

/// Maximum allowed age for webhook events (5 minutes).
pub const MAX_EVENT_AGE_SECS: i64 = 300;

/// Maximum allowed clock skew for future events (1 minute).
const MAX_CLOCK_SKEW_SECS: i64 = 60;

/// Parsed components from the Stripe-Signature header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    /// Unix timestamp when the signature was generated.
    pub timestamp: i64,
    /// All v1 signatures; several are sent while a secret is being rolled.
    pub v1_signatures: Vec<Vec<u8>>,
}

impl SignatureHeader {
    /// Parses a Stripe-Signature header string.
    ///
    /// Format: `t=<timestamp>,v1=<signature>[,v1=<signature>][,v0=<legacy>]`
    pub fn parse(header: &str) -> Result<Self, WebhookError> {
        let mut timestamp: Option<i64> = None;
        let mut v1_signatures = Vec::new();

        for part in header.split(',') {
            let (key, value) = part
                .trim()
                .split_once('=')
                .ok_or_else(|| WebhookError::ParseError("invalid header format".to_string()))?;

            match key {
                "t" => {
                    timestamp = Some(value.parse().map_err(|_| {
                        WebhookError::ParseError("invalid timestamp".to_string())
                    })?);
                }
                "v1" => {
                    v1_signatures.push(hex::decode(value).map_err(|_| {
                        WebhookError::ParseError("invalid v1 signature hex".to_string())
                    })?);
                }
                // v0 and unknown schemes are ignored
                _ => {}
            }
        }

        let timestamp =
            timestamp.ok_or_else(|| WebhookError::ParseError("missing timestamp".to_string()))?;
        if v1_signatures.is_empty() {
            return Err(WebhookError::ParseError("missing v1 signature".to_string()));
        }

        Ok(SignatureHeader {
            timestamp,
            v1_signatures,
        })
    }
}

/// Verifier for Stripe webhook signatures.
pub struct WebhookVerifier {
    secret: SecretString,
    tolerance_secs: i64,
}

impl WebhookVerifier {
    /// Creates a verifier with the default 5 minute tolerance.
    pub fn new(secret: SecretString) -> Self {
        Self {
            secret,
            tolerance_secs: MAX_EVENT_AGE_SECS,
        }
    }

    pub fn with_tolerance_secs(mut self, tolerance_secs: i64) -> Self {
        self.tolerance_secs = tolerance_secs;
        self
    }

    /// Verifies the signature of a raw payload against the current clock.
    pub fn verify(&self, payload: &[u8], signature_header: &str) -> Result<(), WebhookError> {
        self.verify_at(payload, signature_header, chrono::Utc::now().timestamp())
    }

    /// Verifies the signature of a raw payload as of `now` (Unix seconds).
    pub fn verify_at(
        &self,
        payload: &[u8],
        signature_header: &str,
        now: i64,
    ) -> Result<(), WebhookError> {
        let header = SignatureHeader::parse(signature_header)?;

        let age = now - header.timestamp;
        if age > self.tolerance_secs {
            tracing::warn!(age_secs = age, "Webhook event too old - possible replay");
            return Err(WebhookError::TimestampOutOfRange);
        }
        if age < -MAX_CLOCK_SKEW_SECS {
            tracing::warn!(age_secs = age, "Webhook event from the future");
            return Err(WebhookError::InvalidTimestamp);
        }

        let expected = compute_signature(self.secret.expose_secret(), header.timestamp, payload);
        let matched = header
            .v1_signatures
            .iter()
            .any(|candidate| constant_time_compare(&expected, candidate));

        if matched {
            Ok(())
        } else {
            Err(WebhookError::InvalidSignature)
        }
    }
}

/// Builds a `Stripe-Signature` header value for a payload.
///
/// Used by local tooling and tests to produce deliveries the verifier accepts.
pub fn sign_payload(secret: &str, timestamp: i64, payload: &[u8]) -> String {
    format!(
        "t={},v1={}",
        timestamp,
        hex::encode(compute_signature(secret, timestamp, payload))
    )
}

fn compute_signature(secret: &str, timestamp: i64, payload: &[u8]) -> Vec<u8> {
    // HMAC accepts keys of any length
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return Vec::new(),
    };
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    mac.finalize().into_bytes().to_vec()
}

/// Performs constant-time comparison of two byte slices.
fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.is_empty() || a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_SECRET: &str = "whsec_test_secret_12345";
    const NOW: i64 = 1_704_067_200;

    fn verifier() -> WebhookVerifier {
        WebhookVerifier::new(SecretString::new(TEST_SECRET.to_string()))
    }

    // ══════════════════════════════════════════════════════════════
    // SignatureHeader Parsing Tests
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn parse_header_with_v1_only() {
        let header = SignatureHeader::parse(&format!("t=1234567890,v1={}", "a".repeat(64))).unwrap();
        assert_eq!(header.timestamp, 1234567890);
        assert_eq!(header.v1_signatures.len(), 1);
        assert_eq!(header.v1_signatures[0].len(), 32);
    }

    #[test]
    fn parse_header_collects_multiple_v1() {
        let header = SignatureHeader::parse(&format!(
            "t=1,v1={},v1={},v0={}",
            "a".repeat(64),
            "b".repeat(64),
            "c".repeat(64)
        ))
        .unwrap();
        assert_eq!(header.v1_signatures.len(), 2);
    }

    #[test]
    fn parse_header_requires_timestamp_and_v1() {
        assert!(SignatureHeader::parse(&format!("v1={}", "a".repeat(64))).is_err());
        assert!(SignatureHeader::parse("t=1").is_err());
        assert!(SignatureHeader::parse("garbage").is_err());
    }

    // ══════════════════════════════════════════════════════════════
    // Verification Tests
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn accepts_valid_signature() {
        let payload = br#"{"id":"evt_1"}"#;
        let header = sign_payload(TEST_SECRET, NOW, payload);
        assert!(verifier().verify_at(payload, &header, NOW + 10).is_ok());
    }

    #[test]
    fn rejects_tampered_payload() {
        let header = sign_payload(TEST_SECRET, NOW, br#"{"id":"evt_1"}"#);
        assert!(matches!(
            verifier().verify_at(br#"{"id":"evt_2"}"#, &header, NOW),
            Err(WebhookError::InvalidSignature)
        ));
    }

    #[test]
    fn rejects_wrong_secret() {
        let payload = b"{}";
        let header = sign_payload("whsec_other", NOW, payload);
        assert!(matches!(
            verifier().verify_at(payload, &header, NOW),
            Err(WebhookError::InvalidSignature)
        ));
    }

    #[test]
    fn rejects_stale_event() {
        let payload = b"{}";
        let header = sign_payload(TEST_SECRET, NOW, payload);
        assert!(matches!(
            verifier().verify_at(payload, &header, NOW + MAX_EVENT_AGE_SECS + 1),
            Err(WebhookError::TimestampOutOfRange)
        ));
    }

    #[test]
    fn tolerates_small_clock_skew_but_not_large() {
        let payload = b"{}";
        let header = sign_payload(TEST_SECRET, NOW, payload);
        assert!(verifier().verify_at(payload, &header, NOW - 30).is_ok());
        assert!(matches!(
            verifier().verify_at(payload, &header, NOW - 120),
            Err(WebhookError::InvalidTimestamp)
        ));
    }

    #[test]
    fn accepts_when_any_v1_matches() {
        let payload = b"{}";
        let good = sign_payload(TEST_SECRET, NOW, payload);
        let good_sig = good.split("v1=").nth(1).unwrap();
        let header = format!("t={},v1={},v1={}", NOW, "0".repeat(64), good_sig);
        assert!(verifier().verify_at(payload, &header, NOW).is_ok());
    }
}

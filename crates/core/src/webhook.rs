//! Signed webhook verification.
//!
//! Providers send `x-webhook-signature: t=<unix seconds>,v1=<hex>` where the
//! hex value is HMAC-SHA256 over `"<t>.<raw body>"` keyed with the shared
//! secret. Several `v1` entries may be present during secret rotation.

use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::config::WebhookConfig;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-webhook-signature";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WebhookError {
    #[error("Missing webhook signature")]
    MissingSignature,
    #[error("Malformed webhook signature header")]
    MalformedHeader,
    #[error("Webhook timestamp outside tolerance")]
    StaleTimestamp,
    #[error("Invalid webhook signature")]
    SignatureMismatch,
    #[error("Webhook secret is unusable")]
    InvalidSecret,
}

/// Stable identity for a delivery that carries no provider event id.
pub fn payload_fingerprint(payload: &[u8]) -> String {
    format!("sha256:{}", hex::encode(Sha256::digest(payload)))
}

pub struct WebhookVerifier {
    secret: String,
    tolerance: Duration,
}

impl WebhookVerifier {
    pub fn new(secret: impl Into<String>, tolerance: Duration) -> Self {
        Self {
            secret: secret.into(),
            tolerance,
        }
    }

    /// `None` when no secret is configured.
    pub fn from_config(config: &WebhookConfig) -> Option<Self> {
        config
            .secret
            .as_deref()
            .filter(|secret| !secret.is_empty())
            .map(|secret| Self::new(secret, config.tolerance))
    }

    fn mac(&self, payload: &[u8], timestamp: i64) -> Result<HmacSha256, WebhookError> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|_| WebhookError::InvalidSecret)?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        Ok(mac)
    }

    /// Hex signature for `payload` at `timestamp`.
    pub fn sign(&self, payload: &[u8], timestamp: i64) -> Result<String, WebhookError> {
        Ok(hex::encode(self.mac(payload, timestamp)?.finalize().into_bytes()))
    }

    /// Full header value, as a provider would send it.
    pub fn header_value(&self, payload: &[u8], timestamp: i64) -> Result<String, WebhookError> {
        Ok(format!("t={},v1={}", timestamp, self.sign(payload, timestamp)?))
    }

    pub fn verify(
        &self,
        payload: &[u8],
        header: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), WebhookError> {
        let header = header.ok_or(WebhookError::MissingSignature)?;

        let mut timestamp = None;
        let mut signatures = Vec::new();
        for part in header.split(',') {
            match part.trim().split_once('=') {
                Some(("t", value)) => {
                    timestamp = Some(
                        value
                            .parse::<i64>()
                            .map_err(|_| WebhookError::MalformedHeader)?,
                    );
                }
                Some(("v1", value)) => signatures.push(value),
                _ => {}
            }
        }

        let timestamp = timestamp.ok_or(WebhookError::MalformedHeader)?;
        if signatures.is_empty() {
            return Err(WebhookError::MalformedHeader);
        }

        if (now.timestamp() - timestamp).abs() > self.tolerance.num_seconds() {
            return Err(WebhookError::StaleTimestamp);
        }

        for candidate in signatures {
            let Ok(bytes) = hex::decode(candidate) else {
                continue;
            };
            if self.mac(payload, timestamp)?.verify_slice(&bytes).is_ok() {
                return Ok(());
            }
        }
        Err(WebhookError::SignatureMismatch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &[u8] = br#"{"type":"checkout.completed","data":{"token":"demo_1"}}"#;

    fn verifier() -> WebhookVerifier {
        WebhookVerifier::new("whsec_test123secret456", Duration::seconds(300))
    }

    #[test]
    fn test_valid_signature() {
        let now = Utc::now();
        let header = verifier().header_value(BODY, now.timestamp()).unwrap();
        assert_eq!(verifier().verify(BODY, Some(&header), now), Ok(()));
    }

    #[test]
    fn test_wrong_secret() {
        let now = Utc::now();
        let other = WebhookVerifier::new("wrong_secret", Duration::seconds(300));
        let header = other.header_value(BODY, now.timestamp()).unwrap();
        assert_eq!(
            verifier().verify(BODY, Some(&header), now),
            Err(WebhookError::SignatureMismatch)
        );
    }

    #[test]
    fn test_modified_payload() {
        let now = Utc::now();
        let header = verifier().header_value(BODY, now.timestamp()).unwrap();
        assert_eq!(
            verifier().verify(b"{\"type\":\"checkout.completed\"}", Some(&header), now),
            Err(WebhookError::SignatureMismatch)
        );
    }

    #[test]
    fn test_old_timestamp() {
        let now = Utc::now();
        let header = verifier().header_value(BODY, now.timestamp() - 600).unwrap();
        assert_eq!(
            verifier().verify(BODY, Some(&header), now),
            Err(WebhookError::StaleTimestamp)
        );
    }

    #[test]
    fn test_malformed_headers() {
        let now = Utc::now();
        let v = verifier();
        assert_eq!(v.verify(BODY, None, now), Err(WebhookError::MissingSignature));
        assert_eq!(v.verify(BODY, Some("garbage"), now), Err(WebhookError::MalformedHeader));
        assert_eq!(v.verify(BODY, Some("v1=abcd"), now), Err(WebhookError::MalformedHeader));
        assert_eq!(v.verify(BODY, Some("t=1234567890"), now), Err(WebhookError::MalformedHeader));
        assert_eq!(v.verify(BODY, Some("t=abc,v1=00"), now), Err(WebhookError::MalformedHeader));
    }

    #[test]
    fn test_any_of_several_signatures() {
        let now = Utc::now();
        let ts = now.timestamp();
        let header = format!("t={},v1=deadbeef,v1={}", ts, verifier().sign(BODY, ts).unwrap());
        assert_eq!(verifier().verify(BODY, Some(&header), now), Ok(()));
    }

    #[test]
    fn test_fingerprint_depends_only_on_payload() {
        assert_eq!(payload_fingerprint(BODY), payload_fingerprint(BODY));
        assert_ne!(
            payload_fingerprint(BODY),
            payload_fingerprint(br#"{"type":"checkout.completed","data":{"token":"demo_2"}}"#)
        );
        assert!(payload_fingerprint(BODY).starts_with("sha256:"));
    }

    #[test]
    fn test_unset_secret_disables() {
        assert!(WebhookVerifier::from_config(&WebhookConfig::default()).is_none());
    }
}

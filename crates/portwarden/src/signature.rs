//! HMAC-SHA256 request signing for `POST /authorize`.
//!
//! The upstream auth server signs `"{timestamp}:{body}"` with the shared
//! secret and sends:
//!
//! - `X-Timestamp`: Unix time in milliseconds
//! - `X-Signature`: lowercase hex HMAC-SHA256 of the signed string
//!
//! Comparison is constant-time via `subtle`. A signature whose timestamp is
//! further than `max_age` from now, in either direction, is stale.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-signature";
pub const TIMESTAMP_HEADER: &str = "x-timestamp";

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("missing signature")]
    Missing,
    #[error("invalid signature")]
    Invalid,
    #[error("stale signature")]
    Stale,
}

/// Verifies signed requests against a shared secret.
#[derive(Clone)]
pub struct SignatureVerifier {
    secret: Vec<u8>,
    max_age: Duration,
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier")
            .field("secret", &"<redacted>")
            .field("max_age", &self.max_age)
            .finish()
    }
}

impl SignatureVerifier {
    /// Default staleness window.
    pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(5 * 60);

    pub fn new(secret: impl AsRef<[u8]>, max_age: Duration) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
            max_age,
        }
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    /// Hex signature for `body` at `timestamp_ms`. Used by callers that
    /// sign requests, and by tests.
    pub fn sign(&self, timestamp_ms: u64, body: &[u8]) -> String {
        hex::encode(self.mac(timestamp_ms.to_string().as_bytes(), body))
    }

    /// Checks the signature headers of a request against its raw body.
    pub fn verify_headers(&self, headers: &HeaderMap, body: &[u8]) -> Result<(), SignatureError> {
        let signature = header_str(headers, SIGNATURE_HEADER);
        let timestamp = header_str(headers, TIMESTAMP_HEADER);
        match (signature, timestamp) {
            (Some(signature), Some(timestamp)) => {
                self.verify(signature, timestamp, body, now_millis())
            }
            _ => Err(SignatureError::Missing),
        }
    }

    /// Checks `signature` over `"{timestamp}:{body}"`, then freshness
    /// against `now_ms`.
    pub fn verify(
        &self,
        signature: &str,
        timestamp: &str,
        body: &[u8],
        now_ms: u64,
    ) -> Result<(), SignatureError> {
        let provided = hex::decode(signature.trim()).map_err(|_| SignatureError::Invalid)?;
        if provided.is_empty() {
            return Err(SignatureError::Invalid);
        }
        let expected = self.mac(timestamp.as_bytes(), body);
        if !bool::from(expected.ct_eq(&provided)) {
            tracing::warn!("request signature mismatch");
            return Err(SignatureError::Invalid);
        }

        let sent_ms: u64 = timestamp.trim().parse().map_err(|_| SignatureError::Invalid)?;
        let skew = Duration::from_millis(now_ms.abs_diff(sent_ms));
        if skew > self.max_age {
            tracing::warn!(skew = ?skew, max_age = ?self.max_age, "stale request signature");
            return Err(SignatureError::Stale);
        }
        Ok(())
    }

    fn mac(&self, timestamp: &[u8], body: &[u8]) -> Vec<u8> {
        // HMAC accepts keys of any length, so this never takes the error arm.
        let mut mac = match HmacSha256::new_from_slice(&self.secret) {
            Ok(mac) => mac,
            Err(_) => return Vec::new(),
        };
        mac.update(timestamp);
        mac.update(b":");
        mac.update(body);
        mac.finalize().into_bytes().to_vec()
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.trim().is_empty())
}

/// Current Unix time in milliseconds.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

//! SVIX webhook signature verification.
//!
//! Clerk delivers webhooks through SVIX. Each delivery carries three headers:
//!
//! - `svix-id`: unique message id (stable across redeliveries)
//! - `svix-timestamp`: Unix seconds when the message was signed
//! - `svix-signature`: space-separated `v1,<base64>` signatures
//!
//! The signature is `base64(HMAC-SHA256(secret, "{id}.{timestamp}.{body}"))`
//! where `secret` is the base64 payload of the `whsec_...` signing secret.
//! Several signatures may be present while a secret is being rotated; any
//! match is accepted.

use axum::http::HeaderMap;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::AppError;

type HmacSha256 = Hmac<Sha256>;

pub const HEADER_ID: &str = "svix-id";
pub const HEADER_TIMESTAMP: &str = "svix-timestamp";
pub const HEADER_SIGNATURE: &str = "svix-signature";

const SECRET_PREFIX: &str = "whsec_";
const SIGNATURE_VERSION: &str = "v1";

/// Headers of a verified delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedDelivery {
    /// Value of `svix-id`, used as the idempotency key
    pub message_id: String,
    pub timestamp: i64,
}

/// Verifies SVIX signatures for a single signing secret.
#[derive(Clone)]
pub struct WebhookVerifier {
    key: Vec<u8>,
    tolerance_secs: u64,
}

impl std::fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookVerifier")
            .field("tolerance_secs", &self.tolerance_secs)
            .finish_non_exhaustive()
    }
}

impl WebhookVerifier {
    /// Build a verifier from a `whsec_<base64>` secret (the prefix is optional).
    ///
    /// # Errors
    ///
    /// Returns `base64::DecodeError` when the secret is not valid base64.
    pub fn new(secret: &str, tolerance_secs: u64) -> Result<Self, base64::DecodeError> {
        let encoded = secret.trim();
        let encoded = encoded.strip_prefix(SECRET_PREFIX).unwrap_or(encoded);
        let key = BASE64.decode(encoded)?;

        Ok(Self {
            key,
            tolerance_secs,
        })
    }

    /// Verify a delivery against the current time.
    pub fn verify(&self, headers: &HeaderMap, body: &[u8]) -> Result<VerifiedDelivery, AppError> {
        self.verify_at(headers, body, Utc::now())
    }

    /// Verify a delivery as if received at `now`.
    ///
    /// # Errors
    ///
    /// `AppError::InvalidSignature` when a header is missing or malformed, the
    /// timestamp is outside the tolerance window, or no `v1` signature matches.
    pub fn verify_at(
        &self,
        headers: &HeaderMap,
        body: &[u8],
        now: DateTime<Utc>,
    ) -> Result<VerifiedDelivery, AppError> {
        let message_id = header_str(headers, HEADER_ID)?;
        let timestamp_raw = header_str(headers, HEADER_TIMESTAMP)?;
        let signatures = header_str(headers, HEADER_SIGNATURE)?;

        let timestamp: i64 = timestamp_raw
            .parse()
            .map_err(|_| AppError::InvalidSignature("malformed svix-timestamp".to_string()))?;

        let now_secs = now.timestamp();
        let skew = now_secs.abs_diff(timestamp);
        if skew > self.tolerance_secs {
            let direction = if timestamp < now_secs { "old" } else { "new" };
            return Err(AppError::InvalidSignature(format!(
                "timestamp too {direction} ({skew}s)"
            )));
        }

        for entry in signatures.split_whitespace() {
            let Some((version, encoded)) = entry.split_once(',') else {
                continue;
            };
            if version != SIGNATURE_VERSION {
                continue;
            }
            let Ok(candidate) = BASE64.decode(encoded) else {
                continue;
            };
            // verify_slice compares in constant time
            if self
                .mac_for(message_id, timestamp, body)
                .verify_slice(&candidate)
                .is_ok()
            {
                return Ok(VerifiedDelivery {
                    message_id: message_id.to_string(),
                    timestamp,
                });
            }
        }

        Err(AppError::InvalidSignature(
            "no matching v1 signature".to_string(),
        ))
    }

    /// Produce the `v1,<base64>` signature SVIX would send for this message.
    pub fn sign(&self, message_id: &str, timestamp: i64, body: &[u8]) -> String {
        let digest = self.mac_for(message_id, timestamp, body).finalize();
        format!(
            "{SIGNATURE_VERSION},{}",
            BASE64.encode(digest.into_bytes())
        )
    }

    fn mac_for(&self, message_id: &str, timestamp: i64, body: &[u8]) -> HmacSha256 {
        let mut mac = HmacSha256::new_from_slice(&self.key).expect("HMAC key length is valid");
        mac.update(message_id.as_bytes());
        mac.update(b".");
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(body);
        mac
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Result<&'a str, AppError> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| AppError::InvalidSignature(format!("missing {name} header")))
}

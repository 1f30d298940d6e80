//! Mercado Pago webhook signature verification.
//!
//! Notifications carry an `x-signature` header of the form
//! `ts=<unix>,v1=<hex hmac>` and an `x-request-id` header. The signed
//! manifest is
//!
//! ```text
//! id:<data.id>;request-id:<x-request-id>;ts:<ts>;
//! ```
//!
//! with any part whose value is absent left out.
//!
//! # Security
//!
//! - HMAC-SHA256 with constant-time comparison
//! - Timestamp window rejects replays older than the tolerance

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::domain::foundation::Timestamp;

type HmacSha256 = Hmac<Sha256>;

/// Clock skew tolerance for future timestamps (60 seconds).
const MAX_FUTURE_TOLERANCE_SECS: i64 = 60;

/// Timestamps above this are taken to be milliseconds.
const MILLIS_THRESHOLD: i64 = 100_000_000_000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("Missing x-signature header")]
    MissingHeader,

    #[error("Malformed x-signature header: {0}")]
    Malformed(&'static str),

    #[error("Notification timestamp outside accepted window ({age_secs}s)")]
    Stale { age_secs: i64 },

    #[error("Signature mismatch")]
    Mismatch,
}

/// Parsed `x-signature` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    /// Raw `ts` value as sent; it is part of the manifest verbatim.
    pub ts: String,
    pub v1: Vec<u8>,
}

impl SignatureHeader {
    pub fn parse(header: &str) -> Result<Self, SignatureError> {
        if header.trim().is_empty() {
            return Err(SignatureError::MissingHeader);
        }

        let mut ts = None;
        let mut v1 = None;
        for part in header.split(',') {
            let Some((key, value)) = part.split_once('=') else {
                return Err(SignatureError::Malformed("expected key=value pairs"));
            };
            match key.trim() {
                "ts" => ts = Some(value.trim().to_string()),
                "v1" => {
                    v1 = Some(
                        hex::decode(value.trim())
                            .map_err(|_| SignatureError::Malformed("v1 is not hex"))?,
                    )
                }
                _ => {}
            }
        }

        Ok(Self {
            ts: ts.ok_or(SignatureError::Malformed("missing ts"))?,
            v1: v1.ok_or(SignatureError::Malformed("missing v1"))?,
        })
    }

    fn unix_secs(&self) -> Result<i64, SignatureError> {
        let raw: i64 = self
            .ts
            .parse()
            .map_err(|_| SignatureError::Malformed("ts is not an integer"))?;
        Ok(if raw > MILLIS_THRESHOLD { raw / 1000 } else { raw })
    }
}

/// What the verifier needs from an inbound notification.
#[derive(Debug, Clone, Copy)]
pub struct SignedNotification<'a> {
    pub signature: Option<&'a str>,
    pub request_id: Option<&'a str>,
    pub data_id: Option<&'a str>,
}

/// Verifies notification signatures with the shared webhook secret.
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: SecretString,
    tolerance_secs: i64,
}

impl WebhookVerifier {
    pub fn new(secret: SecretString, tolerance_secs: i64) -> Self {
        Self {
            secret,
            tolerance_secs,
        }
    }

    /// # Errors
    ///
    /// Returns `SignatureError` if the header is missing or malformed, the
    /// timestamp is outside the window, or the HMAC does not match.
    pub fn verify(
        &self,
        notification: SignedNotification<'_>,
        now: Timestamp,
    ) -> Result<(), SignatureError> {
        let header = SignatureHeader::parse(
            notification.signature.ok_or(SignatureError::MissingHeader)?,
        )?;

        let age_secs = now.as_unix_secs() - header.unix_secs()?;
        if age_secs > self.tolerance_secs || age_secs < -MAX_FUTURE_TOLERANCE_SECS {
            tracing::warn!(age_secs, "Webhook signature timestamp outside window");
            return Err(SignatureError::Stale { age_secs });
        }

        let expected = self.sign(&manifest(
            notification.data_id,
            notification.request_id,
            &header.ts,
        ));

        if expected.as_slice().ct_eq(&header.v1).unwrap_u8() != 1 {
            tracing::warn!("Invalid webhook signature");
            return Err(SignatureError::Mismatch);
        }

        Ok(())
    }

    fn sign(&self, manifest: &str) -> Vec<u8> {
        let mut mac = HmacSha256::new_from_slice(self.secret.expose_secret().as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(manifest.as_bytes());
        mac.finalize().into_bytes().to_vec()
    }
}

/// Builds the signed manifest. Alphanumeric data ids are signed lowercased.
pub fn manifest(data_id: Option<&str>, request_id: Option<&str>, ts: &str) -> String {
    let mut manifest = String::new();
    if let Some(id) = data_id.filter(|id| !id.is_empty()) {
        let id = if id.chars().all(|c| c.is_ascii_alphanumeric()) {
            id.to_ascii_lowercase()
        } else {
            id.to_string()
        };
        manifest.push_str(&format!("id:{};", id));
    }
    if let Some(request_id) = request_id.filter(|r| !r.is_empty()) {
        manifest.push_str(&format!("request-id:{};", request_id));
    }
    manifest.push_str(&format!("ts:{};", ts));
    manifest
}

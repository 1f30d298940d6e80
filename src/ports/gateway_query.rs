//! GatewayQueryPort - Authoritative payment and subscription lookups.
//!
//! Webhook bodies are never trusted for financial truth. The reconciler
//! re-fetches the subject from the gateway through this port.
//!
//! # Design
//!
//! - **Injected**: a missing gateway is a construction-time error, never a
//!   runtime `None`
//! - **Bounded**: implementations apply their own request timeout; callers
//!   may additionally race the call against a deadline

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::foundation::{DomainError, ErrorCode, Timestamp};

/// Gateway-reported status, normalized across payments and subscriptions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GatewayStatus {
    /// One-time payment captured.
    Approved,
    /// Subscription authorized by the payer.
    Authorized,
    Rejected,
    Cancelled,
    /// Anything without a license consequence (pending, in_process, paused, ...).
    Other(String),
}

impl GatewayStatus {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "approved" => GatewayStatus::Approved,
            "authorized" => GatewayStatus::Authorized,
            "rejected" => GatewayStatus::Rejected,
            "cancelled" | "canceled" => GatewayStatus::Cancelled,
            other => GatewayStatus::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            GatewayStatus::Approved => "approved",
            GatewayStatus::Authorized => "authorized",
            GatewayStatus::Rejected => "rejected",
            GatewayStatus::Cancelled => "cancelled",
            GatewayStatus::Other(raw) => raw,
        }
    }
}

/// Authoritative view of a one-time payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentSnapshot {
    pub id: String,
    pub status: GatewayStatus,
    pub external_reference: Option<String>,
    pub amount_cents: Option<u64>,
}

/// Authoritative view of a recurring subscription (preapproval).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionSnapshot {
    pub id: String,
    pub status: GatewayStatus,
    pub external_reference: Option<String>,
    pub next_payment_at: Option<Timestamp>,
}

/// Errors from gateway calls.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("Gateway request timed out")]
    Timeout,

    /// 5xx, 429 or a transport failure.
    #[error("Gateway unavailable (status {status:?}): {message}")]
    Unavailable { status: Option<u16>, message: String },

    #[error("Gateway object not found")]
    NotFound,

    /// The gateway refused the request (bad credentials, invalid payload).
    #[error("Gateway rejected request: {0}")]
    Rejected(String),

    /// The response could not be parsed.
    #[error("Failed to decode gateway response: {0}")]
    Decode(String),
}

impl GatewayError {
    /// Whether a later attempt can succeed without anyone intervening.
    pub fn is_retryable(&self) -> bool {
        matches!(self, GatewayError::Timeout | GatewayError::Unavailable { .. })
    }
}

impl From<GatewayError> for DomainError {
    fn from(err: GatewayError) -> Self {
        DomainError::new(ErrorCode::GatewayError, err.to_string())
    }
}

#[async_trait]
pub trait GatewayQueryPort: Send + Sync {
    async fn get_payment(&self, payment_id: &str) -> Result<PaymentSnapshot, GatewayError>;

    async fn get_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<SubscriptionSnapshot, GatewayError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[allow(dead_code)]
    fn assert_object_safe(_: &dyn GatewayQueryPort) {}

    #[test]
    fn parses_both_cancel_spellings() {
        assert_eq!(GatewayStatus::parse("cancelled"), GatewayStatus::Cancelled);
        assert_eq!(GatewayStatus::parse("canceled"), GatewayStatus::Cancelled);
    }

    #[test]
    fn unknown_status_keeps_raw_value() {
        let status = GatewayStatus::parse("in_process");
        assert_eq!(status, GatewayStatus::Other("in_process".to_string()));
        assert_eq!(status.as_str(), "in_process");
    }

    #[test]
    fn only_timeouts_and_unavailability_are_retryable() {
        assert!(GatewayError::Timeout.is_retryable());
        assert!(GatewayError::Unavailable {
            status: Some(502),
            message: "bad gateway".into()
        }
        .is_retryable());
        assert!(!GatewayError::NotFound.is_retryable());
        assert!(!GatewayError::Rejected("401".into()).is_retryable());
    }
}

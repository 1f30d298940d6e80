//! Data Transfer Objects for licensing HTTP endpoints.
//!
//! These types define the JSON request/response shapes for the API.

use serde::{Deserialize, Serialize};

use crate::application::handlers::licensing::CreateCheckoutResult;
use crate::domain::licensing::{
    DaysRemaining, Entitlement, License, Offer, ReconcileOutcome, TransactionKind,
};

// ════════════════════════════════════════════════════════════════════════════════
// Request DTOs
// ════════════════════════════════════════════════════════════════════════════════

/// Request to start a checkout.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateCheckoutRequest {
    pub offer_id: String,
    #[serde(default = "default_kind")]
    pub kind: TransactionKind,
    pub payer_email: String,
    pub payer_name: Option<String>,
}

fn default_kind() -> TransactionKind {
    TransactionKind::OneTimePayment
}

/// Administrator reactivation of a user's license.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReactivateRequest {
    /// `monthly` or `annual`.
    pub plan: String,
}

/// Query parameters some gateway deliveries carry instead of a JSON body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotificationQuery {
    #[serde(rename = "type")]
    pub topic: Option<String>,
    #[serde(rename = "data.id")]
    pub data_id: Option<String>,
}

// ════════════════════════════════════════════════════════════════════════════════
// Response DTOs
// ════════════════════════════════════════════════════════════════════════════════

/// Current entitlement of the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntitlementResponse {
    pub active: bool,
    pub plan: String,
    pub status: String,
    pub expires_at: Option<String>,
    /// `None` for lifetime grants.
    pub days_remaining: Option<u32>,
}

impl From<Entitlement> for EntitlementResponse {
    fn from(entitlement: Entitlement) -> Self {
        Self {
            active: entitlement.active,
            plan: entitlement.plan.to_string(),
            status: entitlement.status.to_string(),
            expires_at: entitlement
                .expires_at
                .map(|t| t.as_datetime().to_rfc3339()),
            days_remaining: match entitlement.days_remaining {
                DaysRemaining::Finite(days) => Some(days),
                DaysRemaining::Unlimited => None,
            },
        }
    }
}

/// Access check result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessResponse {
    pub has_access: bool,
}

/// One row of license history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LicenseHistoryEntry {
    pub id: String,
    pub plan: String,
    pub status: String,
    pub starts_at: String,
    pub expires_at: Option<String>,
    pub source: Option<String>,
}

impl From<License> for LicenseHistoryEntry {
    fn from(license: License) -> Self {
        Self {
            id: license.id.to_string(),
            plan: license.plan.to_string(),
            status: license.status.to_string(),
            starts_at: license.starts_at.as_datetime().to_rfc3339(),
            expires_at: license.expires_at.map(|t| t.as_datetime().to_rfc3339()),
            source: license.source_correlation,
        }
    }
}

/// A purchasable offer as shown on the pricing page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfferResponse {
    pub id: String,
    pub plan: String,
    pub title: String,
    pub description: String,
    pub amount: String,
    pub currency: String,
    pub installments: u8,
}

impl From<&Offer> for OfferResponse {
    fn from(offer: &Offer) -> Self {
        Self {
            id: offer.id.to_string(),
            plan: offer.plan.to_string(),
            title: offer.title.to_string(),
            description: offer.description.to_string(),
            amount: offer.amount_decimal(),
            currency: offer.currency.to_string(),
            installments: offer.installments,
        }
    }
}

/// Checkout created at the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutResponse {
    pub checkout_id: String,
    pub offer_id: String,
    pub plan: String,
    pub redirect_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sandbox_redirect_url: Option<String>,
}

impl From<CreateCheckoutResult> for CheckoutResponse {
    fn from(result: CreateCheckoutResult) -> Self {
        Self {
            checkout_id: result.session.id,
            offer_id: result.offer_id,
            plan: result.plan.to_string(),
            redirect_url: result.session.redirect_url,
            sandbox_redirect_url: result.session.sandbox_redirect_url,
        }
    }
}

/// Acknowledgement returned to the gateway for every handled notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookAck {
    pub status: String,
    pub outcome: String,
}

impl From<&ReconcileOutcome> for WebhookAck {
    fn from(outcome: &ReconcileOutcome) -> Self {
        Self {
            status: "ok".to_string(),
            outcome: outcome.label().to_string(),
        }
    }
}

/// Liveness check body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub gateway_configured: bool,
}

/// Standard error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub error_code: String,
    /// Human-readable error message.
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error_code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_code: error_code.into(),
            message: message.into(),
        }
    }
}

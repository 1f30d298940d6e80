//! Mercado Pago REST payloads.
//!
//! Only the fields the engine reads are modelled; everything else in the
//! gateway's responses is ignored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::domain::foundation::Timestamp;
use crate::ports::{GatewayError, GatewayStatus, PaymentSnapshot, SubscriptionSnapshot};

// ════════════════════════════════════════════════════════════════════════════════
// Responses
// ════════════════════════════════════════════════════════════════════════════════

/// `GET /v1/payments/{id}`
#[derive(Debug, Deserialize)]
pub struct MpPayment {
    #[serde(deserialize_with = "id_as_string")]
    pub id: String,
    pub status: String,
    pub external_reference: Option<String>,
    pub transaction_amount: Option<f64>,
}

impl From<MpPayment> for PaymentSnapshot {
    fn from(payment: MpPayment) -> Self {
        PaymentSnapshot {
            id: payment.id,
            status: GatewayStatus::parse(&payment.status),
            external_reference: non_empty(payment.external_reference),
            amount_cents: payment
                .transaction_amount
                .filter(|amount| amount.is_finite() && *amount >= 0.0)
                .map(|amount| (amount * 100.0).round() as u64),
        }
    }
}

/// `GET /preapproval/{id}`
#[derive(Debug, Deserialize)]
pub struct MpPreapproval {
    #[serde(deserialize_with = "id_as_string")]
    pub id: String,
    pub status: String,
    pub external_reference: Option<String>,
    pub next_payment_date: Option<String>,
}

impl TryFrom<MpPreapproval> for SubscriptionSnapshot {
    type Error = GatewayError;

    fn try_from(preapproval: MpPreapproval) -> Result<Self, Self::Error> {
        let next_payment_at = preapproval
            .next_payment_date
            .as_deref()
            .map(|raw| {
                DateTime::parse_from_rfc3339(raw)
                    .map(|dt| Timestamp::from_datetime(dt.with_timezone(&Utc)))
                    .map_err(|e| {
                        GatewayError::Decode(format!("next_payment_date {:?}: {}", raw, e))
                    })
            })
            .transpose()?;

        Ok(SubscriptionSnapshot {
            id: preapproval.id,
            status: GatewayStatus::parse(&preapproval.status),
            external_reference: non_empty(preapproval.external_reference),
            next_payment_at,
        })
    }
}

/// Response of both checkout creation endpoints.
#[derive(Debug, Deserialize)]
pub struct MpCheckoutCreated {
    #[serde(deserialize_with = "id_as_string")]
    pub id: String,
    pub init_point: String,
    pub sandbox_init_point: Option<String>,
}

/// Error body returned on non-2xx responses.
#[derive(Debug, Default, Deserialize)]
pub struct MpErrorBody {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub error: String,
}

// ════════════════════════════════════════════════════════════════════════════════
// Requests
// ════════════════════════════════════════════════════════════════════════════════

/// `POST /checkout/preferences`
#[derive(Debug, Serialize)]
pub struct MpPreferenceRequest {
    pub items: Vec<MpItem>,
    pub payer: MpPayer,
    pub back_urls: MpBackUrls,
    pub payment_methods: MpPaymentMethods,
    pub external_reference: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification_url: Option<String>,
    pub statement_descriptor: &'static str,
}

#[derive(Debug, Serialize)]
pub struct MpItem {
    pub title: String,
    pub description: String,
    pub unit_price: f64,
    pub quantity: u32,
    pub currency_id: String,
}

#[derive(Debug, Serialize)]
pub struct MpPayer {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct MpBackUrls {
    pub success: String,
    pub failure: String,
    pub pending: String,
}

#[derive(Debug, Serialize)]
pub struct MpPaymentMethods {
    pub installments: u8,
}

/// `POST /preapproval`
#[derive(Debug, Serialize)]
pub struct MpPreapprovalRequest {
    pub reason: String,
    pub external_reference: String,
    pub payer_email: String,
    pub back_url: String,
    pub auto_recurring: MpAutoRecurring,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification_url: Option<String>,
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct MpAutoRecurring {
    pub frequency: u32,
    pub frequency_type: &'static str,
    pub transaction_amount: f64,
    pub currency_id: String,
}

/// Converts integer cents to the decimal amount the REST API expects.
pub fn cents_to_amount(cents: u64) -> f64 {
    cents as f64 / 100.0
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Payment ids are numbers, preapproval ids strings.
fn id_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Number(u64),
        Text(String),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Number(n) => n.to_string(),
        RawId::Text(s) => s,
    })
}

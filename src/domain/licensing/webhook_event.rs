//! Inbound gateway notification shape.
//!
//! Only the fields the reconciler acts on are captured. Everything else in
//! the payload is ignored; financial truth is always re-fetched from the
//! gateway, never read from the notification body.

use serde::{Deserialize, Deserializer, Serialize};

use crate::domain::foundation::{GatewayEventId, Timestamp};

/// Gateway webhook notification (simplified).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct WebhookEvent {
    /// Notification id. Not every gateway topic carries one.
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: Option<String>,

    /// Topic, e.g. `payment` or `subscription_preapproval`.
    #[serde(rename = "type", default)]
    pub event_type: String,

    #[serde(default)]
    pub action: Option<String>,

    #[serde(default)]
    pub data: Option<WebhookData>,
}

/// Subject of the notification.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct WebhookData {
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: Option<String>,
}

/// Topics the reconciler knows how to act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WebhookEventKind {
    /// One-time payment changed state.
    Payment,
    /// Subscription (preapproval) was authorized by the payer.
    SubscriptionAuthorized,
    /// A recurring charge of a subscription was processed.
    SubscriptionPayment,
    /// Subscription (preapproval) object changed.
    SubscriptionPreapproval,
    /// Anything else; acknowledged and dropped.
    Unknown,
}

/// Which gateway object the notification's subject id refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubjectFamily {
    Payment,
    Subscription,
}

impl WebhookEventKind {
    pub fn from_type(event_type: &str) -> Self {
        match event_type {
            "payment" => Self::Payment,
            "subscription_authorized" => Self::SubscriptionAuthorized,
            "subscription_payment" | "subscription_authorized_payment" => {
                Self::SubscriptionPayment
            }
            "subscription_preapproval" => Self::SubscriptionPreapproval,
            _ => Self::Unknown,
        }
    }

    pub fn family(&self) -> Option<SubjectFamily> {
        match self {
            Self::Payment => Some(SubjectFamily::Payment),
            Self::SubscriptionAuthorized
            | Self::SubscriptionPayment
            | Self::SubscriptionPreapproval => Some(SubjectFamily::Subscription),
            Self::Unknown => None,
        }
    }
}

impl WebhookEvent {
    pub fn parse(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }

    pub fn kind(&self) -> WebhookEventKind {
        WebhookEventKind::from_type(&self.event_type)
    }

    /// Gateway id of the payment or subscription this notification is about.
    pub fn subject_id(&self) -> Option<&str> {
        self.data
            .as_ref()
            .and_then(|data| data.id.as_deref())
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }

    /// Notification id, the ledger key when the gateway sends one.
    pub fn notification_id(&self) -> Option<GatewayEventId> {
        self.id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .and_then(|id| GatewayEventId::new(id).ok())
    }

    /// Ledger key for a notification without an id.
    ///
    /// Built from the gateway-confirmed state, so each distinct state change
    /// of a subject gets its own key: `<type>:<subject id>:<status>`, plus
    /// the next charge date (unix seconds) when the subscription reports one.
    pub fn state_key(
        &self,
        status: &str,
        next_payment_at: Option<Timestamp>,
    ) -> Option<GatewayEventId> {
        let subject = self.subject_id()?;
        let key = match next_payment_at {
            Some(next) => format!(
                "{}:{}:{}:{}",
                self.event_type,
                subject,
                status,
                next.as_unix_secs()
            ),
            None => format!("{}:{}:{}", self.event_type, subject, status),
        };
        GatewayEventId::new(key).ok()
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

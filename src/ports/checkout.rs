//! CheckoutPort - Outbound checkout creation at the gateway.
//!
//! The request already carries an encoded correlation token; adapters pass
//! it through as `external_reference` and never build or parse it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::licensing::Offer;

use super::GatewayError;

/// Request to start a checkout for one offer.
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub offer: Offer,
    pub external_reference: String,
    pub payer_email: String,
    pub payer_name: Option<String>,
}

/// Checkout created at the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSession {
    /// Gateway preference or preapproval id.
    pub id: String,
    /// Where the payer is sent to complete the purchase.
    pub redirect_url: String,
    pub sandbox_redirect_url: Option<String>,
}

#[async_trait]
pub trait CheckoutPort: Send + Sync {
    /// One-time payment checkout (preference).
    async fn create_preference(
        &self,
        request: CheckoutRequest,
    ) -> Result<CheckoutSession, GatewayError>;

    /// Recurring subscription checkout (preapproval).
    async fn create_subscription(
        &self,
        request: CheckoutRequest,
    ) -> Result<CheckoutSession, GatewayError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[allow(dead_code)]
    fn assert_object_safe(_: &dyn CheckoutPort) {}
}

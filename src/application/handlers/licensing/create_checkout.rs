//! CreateCheckoutHandler - Starts a gateway checkout for an offer.
//!
//! This is where correlation tokens are born. The token is built once here
//! and comes back untouched in every notification for the transaction.

use std::sync::Arc;

use serde::Serialize;

use crate::domain::foundation::{DomainError, UserId};
use crate::domain::licensing::{
    CorrelationToken, OfferCatalog, Plan, ReferenceCodec, TransactionKind,
};
use crate::ports::{CheckoutPort, CheckoutRequest, CheckoutSession};

#[derive(Debug, Clone)]
pub struct CreateCheckoutCommand {
    pub user_id: UserId,
    pub offer_id: String,
    pub kind: TransactionKind,
    pub payer_email: String,
    pub payer_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateCheckoutResult {
    pub offer_id: String,
    pub plan: Plan,
    pub session: CheckoutSession,
}

pub struct CreateCheckoutHandler {
    checkout: Arc<dyn CheckoutPort>,
    catalog: OfferCatalog,
    codec: ReferenceCodec,
}

impl CreateCheckoutHandler {
    pub fn new(checkout: Arc<dyn CheckoutPort>) -> Self {
        Self {
            checkout,
            catalog: OfferCatalog,
            codec: ReferenceCodec,
        }
    }

    pub async fn handle(
        &self,
        cmd: CreateCheckoutCommand,
    ) -> Result<CreateCheckoutResult, DomainError> {
        let email = cmd.payer_email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(DomainError::validation("payer_email", "A valid payer email is required"));
        }
        let offer = self.catalog.get(&cmd.offer_id)?;

        let token = CorrelationToken::new(cmd.user_id.clone(), offer.plan, cmd.kind);
        let request = CheckoutRequest {
            offer: offer.clone(),
            external_reference: self.codec.encode(&token),
            payer_email: email.to_string(),
            payer_name: cmd.payer_name,
        };

        let session = match cmd.kind {
            TransactionKind::OneTimePayment => self.checkout.create_preference(request).await,
            TransactionKind::Subscription => self.checkout.create_subscription(request).await,
        }
        .map_err(|err| {
            tracing::error!(user_id = %cmd.user_id, offer_id = offer.id, error = %err, "Checkout creation failed");
            DomainError::from(err)
        })?;

        tracing::info!(
            user_id = %cmd.user_id,
            offer_id = offer.id,
            kind = %cmd.kind,
            checkout_id = %session.id,
            "Checkout created"
        );
        Ok(CreateCheckoutResult {
            offer_id: offer.id.to_string(),
            plan: offer.plan,
            session,
        })
    }
}

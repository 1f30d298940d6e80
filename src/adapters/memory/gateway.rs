//! Scripted in-memory gateway.
//!
//! Stands in for the payment gateway in tests and local runs. Supports:
//! - Pre-configured payments and subscriptions
//! - Error injection
//! - Artificial latency (for deadline tests)
//! - Call tracking

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use crate::ports::{
    CheckoutPort, CheckoutRequest, CheckoutSession, GatewayError, GatewayQueryPort,
    PaymentSnapshot, SubscriptionSnapshot,
};

#[derive(Default)]
struct GatewayState {
    payments: HashMap<String, PaymentSnapshot>,
    subscriptions: HashMap<String, SubscriptionSnapshot>,
    next_error: Option<GatewayError>,
    latency: Option<Duration>,
    query_calls: u32,
    checkouts: Vec<(String, CheckoutRequest)>,
}

/// Gateway double answering from configured snapshots.
#[derive(Default)]
pub struct InMemoryGateway {
    state: Mutex<GatewayState>,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut GatewayState) -> T) -> T {
        let mut guard = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard)
    }

    pub fn set_payment(&self, payment: PaymentSnapshot) {
        self.with_state(|s| s.payments.insert(payment.id.clone(), payment));
    }

    pub fn set_subscription(&self, subscription: SubscriptionSnapshot) {
        self.with_state(|s| s.subscriptions.insert(subscription.id.clone(), subscription));
    }

    /// The next query or checkout call fails with `error`.
    pub fn fail_next(&self, error: GatewayError) {
        self.with_state(|s| s.next_error = Some(error));
    }

    pub fn set_latency(&self, latency: Duration) {
        self.with_state(|s| s.latency = Some(latency));
    }

    pub fn query_calls(&self) -> u32 {
        self.with_state(|s| s.query_calls)
    }

    /// Checkouts created so far as `(kind, request)`; kind is `preference` or `subscription`.
    pub fn checkouts(&self) -> Vec<(String, CheckoutRequest)> {
        self.with_state(|s| s.checkouts.clone())
    }

    async fn begin_call(&self) -> Result<(), GatewayError> {
        let (latency, error) = self.with_state(|s| {
            s.query_calls += 1;
            (s.latency, s.next_error.take())
        });
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        error.map_or(Ok(()), Err)
    }

    fn record_checkout(&self, kind: &str, request: CheckoutRequest) -> CheckoutSession {
        self.with_state(|s| {
            let id = format!("{}-{}", kind, s.checkouts.len() + 1);
            s.checkouts.push((kind.to_string(), request));
            CheckoutSession {
                redirect_url: format!("https://gateway.test/checkout/{}", id),
                sandbox_redirect_url: None,
                id,
            }
        })
    }
}

#[async_trait]
impl GatewayQueryPort for InMemoryGateway {
    async fn get_payment(&self, payment_id: &str) -> Result<PaymentSnapshot, GatewayError> {
        self.begin_call().await?;
        self.with_state(|s| s.payments.get(payment_id).cloned())
            .ok_or(GatewayError::NotFound)
    }

    async fn get_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<SubscriptionSnapshot, GatewayError> {
        self.begin_call().await?;
        self.with_state(|s| s.subscriptions.get(subscription_id).cloned())
            .ok_or(GatewayError::NotFound)
    }
}

#[async_trait]
impl CheckoutPort for InMemoryGateway {
    async fn create_preference(
        &self,
        request: CheckoutRequest,
    ) -> Result<CheckoutSession, GatewayError> {
        if let Some(error) = self.with_state(|s| s.next_error.take()) {
            return Err(error);
        }
        Ok(self.record_checkout("preference", request))
    }

    async fn create_subscription(
        &self,
        request: CheckoutRequest,
    ) -> Result<CheckoutSession, GatewayError> {
        if let Some(error) = self.with_state(|s| s.next_error.take()) {
            return Err(error);
        }
        Ok(self.record_checkout("subscription", request))
    }
}

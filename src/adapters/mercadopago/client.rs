//! Mercado Pago REST client.
//!
//! Implements [`GatewayQueryPort`] (payment and preapproval lookups) and
//! [`CheckoutPort`] (preference and preapproval creation).
//!
//! # Error mapping
//!
//! | Response                 | GatewayError            |
//! |--------------------------|-------------------------|
//! | transport timeout        | `Timeout`               |
//! | connection failure       | `Unavailable{None}`     |
//! | 404                      | `NotFound`              |
//! | 429, 5xx                 | `Unavailable{status}`   |
//! | other 4xx                | `Rejected`              |
//! | unparseable 2xx body     | `Decode`                |

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;

use crate::config::{BackUrls, GatewayConfig};
use crate::domain::licensing::Plan;
use crate::ports::{
    CheckoutPort, CheckoutRequest, CheckoutSession, GatewayError, GatewayQueryPort,
    PaymentSnapshot, SubscriptionSnapshot,
};

use super::api_types::{
    cents_to_amount, MpAutoRecurring, MpBackUrls, MpCheckoutCreated, MpErrorBody, MpItem,
    MpPayer, MpPayment, MpPaymentMethods, MpPreapproval, MpPreapprovalRequest,
    MpPreferenceRequest,
};

const STATEMENT_DESCRIPTOR: &str = "ANOTA&GANHA";

/// Connection settings for the Mercado Pago API.
#[derive(Debug, Clone)]
pub struct MercadoPagoConfig {
    access_token: SecretString,
    api_base_url: String,
    timeout: Duration,
    notification_url: Option<String>,
    back_urls: BackUrls,
}

impl MercadoPagoConfig {
    pub fn new(access_token: impl Into<String>, back_urls: BackUrls) -> Self {
        Self {
            access_token: SecretString::new(access_token.into()),
            api_base_url: "https://api.mercadopago.com".to_string(),
            timeout: Duration::from_secs(10),
            notification_url: None,
            back_urls,
        }
    }

    pub fn from_gateway_config(config: &GatewayConfig) -> Self {
        Self {
            access_token: config.access_token.clone(),
            api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
            timeout: config.timeout(),
            notification_url: config.notification_url.clone(),
            back_urls: config.back_urls(),
        }
    }

    /// Set a custom API base URL (for testing).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_notification_url(mut self, url: impl Into<String>) -> Self {
        self.notification_url = Some(url.into());
        self
    }
}

/// Mercado Pago gateway adapter.
pub struct MercadoPagoClient {
    config: MercadoPagoConfig,
    http_client: reqwest::Client,
}

impl MercadoPagoClient {
    /// # Errors
    ///
    /// Returns `Unavailable` if the HTTP client cannot be built.
    pub fn new(config: MercadoPagoConfig) -> Result<Self, GatewayError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GatewayError::Unavailable {
                status: None,
                message: format!("Failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            config,
            http_client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base_url, path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request.bearer_auth(self.config.access_token.expose_secret())
    }

    async fn send<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<T, GatewayError> {
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|e| transport_error(operation, e))?;

        let response = check_status(operation, response).await?;

        response.json::<T>().await.map_err(|e| {
            tracing::warn!(operation, error = %e, "Unparseable Mercado Pago response");
            GatewayError::Decode(format!("{}: {}", operation, e))
        })
    }
}

fn transport_error(operation: &'static str, err: reqwest::Error) -> GatewayError {
    if err.is_timeout() {
        tracing::warn!(operation, "Mercado Pago request timed out");
        GatewayError::Timeout
    } else {
        tracing::warn!(operation, error = %err, "Mercado Pago request failed");
        GatewayError::Unavailable {
            status: None,
            message: err.to_string(),
        }
    }
}

async fn check_status(
    operation: &'static str,
    response: Response,
) -> Result<Response, GatewayError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body: MpErrorBody = response.json().await.unwrap_or_default();
    let message = if body.message.is_empty() {
        body.error
    } else {
        body.message
    };
    tracing::warn!(operation, status = status.as_u16(), error = %message, "Mercado Pago API error");

    Err(classify_status(status, message))
}

fn classify_status(status: StatusCode, message: String) -> GatewayError {
    if status == StatusCode::NOT_FOUND {
        GatewayError::NotFound
    } else if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        GatewayError::Unavailable {
            status: Some(status.as_u16()),
            message,
        }
    } else {
        GatewayError::Rejected(format!("{}: {}", status.as_u16(), message))
    }
}

/// Billing cadence of a recurring plan, as `(frequency, frequency_type)`.
fn recurrence(plan: Plan) -> Result<(u32, &'static str), GatewayError> {
    match plan {
        Plan::Monthly => Ok((1, "months")),
        Plan::Annual => Ok((12, "months")),
        Plan::Trial | Plan::Lifetime => Err(GatewayError::Rejected(format!(
            "{} plan cannot be sold as a subscription",
            plan
        ))),
    }
}

#[async_trait]
impl GatewayQueryPort for MercadoPagoClient {
    async fn get_payment(&self, payment_id: &str) -> Result<PaymentSnapshot, GatewayError> {
        let request = self
            .http_client
            .get(self.url(&format!("/v1/payments/{}", payment_id)));
        let payment: MpPayment = self.send("get_payment", request).await?;

        Ok(payment.into())
    }

    async fn get_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<SubscriptionSnapshot, GatewayError> {
        let request = self
            .http_client
            .get(self.url(&format!("/preapproval/{}", subscription_id)));
        let preapproval: MpPreapproval = self.send("get_subscription", request).await?;

        preapproval.try_into()
    }
}

#[async_trait]
impl CheckoutPort for MercadoPagoClient {
    async fn create_preference(
        &self,
        request: CheckoutRequest,
    ) -> Result<CheckoutSession, GatewayError> {
        let offer = &request.offer;
        let back_urls = &self.config.back_urls;
        let body = MpPreferenceRequest {
            items: vec![MpItem {
                title: offer.title.to_string(),
                description: offer.description.to_string(),
                unit_price: cents_to_amount(offer.amount_cents),
                quantity: 1,
                currency_id: offer.currency.to_string(),
            }],
            payer: MpPayer {
                name: request
                    .payer_name
                    .clone()
                    .unwrap_or_else(|| request.payer_email.clone()),
                email: request.payer_email.clone(),
            },
            back_urls: MpBackUrls {
                success: back_urls.success.clone(),
                failure: back_urls.failure.clone(),
                pending: back_urls.pending.clone(),
            },
            payment_methods: MpPaymentMethods {
                installments: offer.installments,
            },
            external_reference: request.external_reference.clone(),
            notification_url: self.config.notification_url.clone(),
            statement_descriptor: STATEMENT_DESCRIPTOR,
        };

        let created: MpCheckoutCreated = self
            .send(
                "create_preference",
                self.http_client
                    .post(self.url("/checkout/preferences"))
                    .json(&body),
            )
            .await?;

        tracing::info!(
            preference_id = %created.id,
            offer_id = offer.id,
            "Checkout preference created"
        );

        Ok(CheckoutSession {
            id: created.id,
            redirect_url: created.init_point,
            sandbox_redirect_url: created.sandbox_init_point,
        })
    }

    async fn create_subscription(
        &self,
        request: CheckoutRequest,
    ) -> Result<CheckoutSession, GatewayError> {
        let offer = &request.offer;
        let (frequency, frequency_type) = recurrence(offer.plan)?;
        let body = MpPreapprovalRequest {
            reason: offer.title.to_string(),
            external_reference: request.external_reference.clone(),
            payer_email: request.payer_email.clone(),
            back_url: self.config.back_urls.success.clone(),
            auto_recurring: MpAutoRecurring {
                frequency,
                frequency_type,
                transaction_amount: cents_to_amount(offer.amount_cents),
                currency_id: offer.currency.to_string(),
            },
            notification_url: self.config.notification_url.clone(),
            status: "pending",
        };

        let created: MpCheckoutCreated = self
            .send(
                "create_subscription",
                self.http_client.post(self.url("/preapproval")).json(&body),
            )
            .await?;

        tracing::info!(
            preapproval_id = %created.id,
            offer_id = offer.id,
            "Subscription checkout created"
        );

        Ok(CheckoutSession {
            id: created.id,
            redirect_url: created.init_point,
            sandbox_redirect_url: created.sandbox_init_point,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn back_urls() -> BackUrls {
        BackUrls {
            success: "https://app.example.com/checkout/success".to_string(),
            failure: "https://app.example.com/checkout/failure".to_string(),
            pending: "https://app.example.com/checkout/pending".to_string(),
        }
    }

    #[test]
    fn not_found_is_terminal() {
        let err = classify_status(StatusCode::NOT_FOUND, String::new());
        assert!(matches!(err, GatewayError::NotFound));
        assert!(!err.is_retryable());
    }

    #[test]
    fn server_errors_and_throttling_are_retryable() {
        for status in [
            StatusCode::INTERNAL_SERVER_ERROR,
            StatusCode::BAD_GATEWAY,
            StatusCode::TOO_MANY_REQUESTS,
        ] {
            let err = classify_status(status, "busy".to_string());
            assert!(err.is_retryable(), "{} should be retryable", status);
        }
    }

    #[test]
    fn auth_failure_is_rejected() {
        let err = classify_status(StatusCode::UNAUTHORIZED, "invalid token".to_string());
        assert!(matches!(err, GatewayError::Rejected(ref m) if m.contains("invalid token")));
    }

    #[test]
    fn recurrence_follows_plan() {
        assert_eq!(recurrence(Plan::Monthly).unwrap(), (1, "months"));
        assert_eq!(recurrence(Plan::Annual).unwrap(), (12, "months"));
        assert!(recurrence(Plan::Lifetime).is_err());
    }

    #[test]
    fn config_builders_override_defaults() {
        let config = MercadoPagoConfig::new("APP_USR-1", back_urls())
            .with_base_url("http://localhost:9999")
            .with_timeout(Duration::from_secs(2))
            .with_notification_url("https://app.example.com/webhooks/payments");

        let client = MercadoPagoClient::new(config).unwrap();
        assert_eq!(
            client.url("/v1/payments/1"),
            "http://localhost:9999/v1/payments/1"
        );
        assert!(client.config.notification_url.is_some());
    }

    #[tokio::test]
    async fn unreachable_gateway_is_unavailable() {
        let config = MercadoPagoConfig::new("APP_USR-1", back_urls())
            .with_base_url("http://127.0.0.1:1")
            .with_timeout(Duration::from_secs(2));
        let client = MercadoPagoClient::new(config).unwrap();

        let err = client.get_payment("123").await.unwrap_err();
        assert!(err.is_retryable());
    }
}

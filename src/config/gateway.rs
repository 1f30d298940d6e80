//! Payment gateway configuration (Mercado Pago)

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

/// Gateway credentials and endpoints.
///
/// Both secrets are required: the service refuses to start rather than run
/// without a way to confirm notifications.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Bearer token for the gateway REST API
    pub access_token: SecretString,

    /// Shared secret used to sign webhook notifications
    pub webhook_secret: SecretString,

    /// Base URL of the gateway REST API
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Public URL the gateway posts notifications to
    pub notification_url: Option<String>,

    /// Base URL for checkout success/failure/pending redirects
    #[serde(default = "default_back_url_base")]
    pub back_url_base: String,

    /// Accepted age of a signed notification, in seconds
    #[serde(default = "default_signature_tolerance_secs")]
    pub signature_tolerance_secs: i64,
}

/// Redirect targets handed to the hosted checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackUrls {
    pub success: String,
    pub failure: String,
    pub pending: String,
}

impl GatewayConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Check that both secrets are present.
    pub fn is_configured(&self) -> bool {
        !self.access_token.expose_secret().is_empty()
            && !self.webhook_secret.expose_secret().is_empty()
    }

    pub fn back_urls(&self) -> BackUrls {
        let base = self.back_url_base.trim_end_matches('/');
        BackUrls {
            success: format!("{}/checkout/success", base),
            failure: format!("{}/checkout/failure", base),
            pending: format!("{}/checkout/pending", base),
        }
    }

    /// Validate gateway configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.access_token.expose_secret().is_empty() {
            return Err(ValidationError::MissingRequired("GATEWAY__ACCESS_TOKEN"));
        }
        if self.webhook_secret.expose_secret().is_empty() {
            return Err(ValidationError::MissingRequired("GATEWAY__WEBHOOK_SECRET"));
        }
        if !is_http_url(&self.api_base_url) {
            return Err(ValidationError::InvalidGatewayUrl("api_base_url"));
        }
        if !is_http_url(&self.back_url_base) {
            return Err(ValidationError::InvalidGatewayUrl("back_url_base"));
        }
        if let Some(url) = &self.notification_url {
            if !is_http_url(url) {
                return Err(ValidationError::InvalidGatewayUrl("notification_url"));
            }
        }
        if self.timeout_secs == 0 || self.timeout_secs > 120 {
            return Err(ValidationError::InvalidGatewayTimeout);
        }
        Ok(())
    }
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("https://") || url.starts_with("http://")
}

fn default_api_base_url() -> String {
    "https://api.mercadopago.com".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_back_url_base() -> String {
    "http://localhost:5173".to_string()
}

fn default_signature_tolerance_secs() -> i64 {
    300
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> GatewayConfig {
        GatewayConfig {
            access_token: SecretString::new("APP_USR-123".to_string()),
            webhook_secret: SecretString::new("whsec".to_string()),
            api_base_url: default_api_base_url(),
            timeout_secs: default_timeout_secs(),
            notification_url: Some("https://app.example.com/webhooks/payments".to_string()),
            back_url_base: "https://app.example.com/".to_string(),
            signature_tolerance_secs: default_signature_tolerance_secs(),
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(config().validate().is_ok());
        assert!(config().is_configured());
    }

    #[test]
    fn test_missing_access_token() {
        let mut cfg = config();
        cfg.access_token = SecretString::new(String::new());
        assert_eq!(
            cfg.validate(),
            Err(ValidationError::MissingRequired("GATEWAY__ACCESS_TOKEN"))
        );
        assert!(!cfg.is_configured());
    }

    #[test]
    fn test_missing_webhook_secret() {
        let mut cfg = config();
        cfg.webhook_secret = SecretString::new(String::new());
        assert_eq!(
            cfg.validate(),
            Err(ValidationError::MissingRequired("GATEWAY__WEBHOOK_SECRET"))
        );
    }

    #[test]
    fn test_back_urls_trim_trailing_slash() {
        let urls = config().back_urls();
        assert_eq!(urls.success, "https://app.example.com/checkout/success");
        assert_eq!(urls.pending, "https://app.example.com/checkout/pending");
    }

    #[test]
    fn test_timeout_bounds() {
        let mut cfg = config();
        cfg.timeout_secs = 0;
        assert_eq!(cfg.validate(), Err(ValidationError::InvalidGatewayTimeout));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let rendered = format!("{:?}", config());
        assert!(!rendered.contains("APP_USR-123"));
    }
}

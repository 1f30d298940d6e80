//! Mercado Pago gateway adapter.
//!
//! - `MercadoPagoClient` - REST lookups and checkout creation over `reqwest`
//! - `WebhookVerifier` - `x-signature` HMAC verification for inbound notifications

mod api_types;
mod client;
mod webhook_verifier;

pub use client::{MercadoPagoClient, MercadoPagoConfig};
pub use webhook_verifier::{SignatureError, SignatureHeader, SignedNotification, WebhookVerifier};

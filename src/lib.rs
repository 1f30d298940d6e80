//! Entitlement Engine - License state machine and payment webhook reconciliation
//!
//! Decides whether a user may use the product right now. A user holds a trial,
//! a paid monthly/annual license or a lifetime grant; paid licenses are driven
//! by at-least-once, possibly out-of-order notifications from the payment
//! gateway, which this crate reconciles into monotonic license changes.
//!
//! Layout follows a ports-and-adapters split:
//! - `domain` - Value objects, the `License` aggregate and pure evaluation
//! - `ports` - Traits for storage, gateway, notification and time
//! - `application` - Command/query handlers and the expiry sweeper
//! - `adapters` - PostgreSQL, Mercado Pago, Axum and in-memory implementations
//! - `config` - Typed environment configuration

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;

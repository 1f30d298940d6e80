//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the licensing core to external systems:
//! - `postgres` - Durable license store and user directory
//! - `mercadopago` - Gateway REST client and webhook signature verification
//! - `http` - Axum routes
//! - `memory` - In-memory ports for tests and local runs
//! - `clock`, `notifier` - System clock and log-only notifier

pub mod clock;
pub mod http;
pub mod memory;
pub mod mercadopago;
pub mod notifier;
pub mod postgres;

pub use clock::{FixedClock, SystemClock};
pub use notifier::TracingNotifier;

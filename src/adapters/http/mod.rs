//! HTTP adapters - REST API implementations.

pub mod licensing;

pub use licensing::{licensing_router, LicensingAppState};

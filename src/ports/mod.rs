//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the licensing core and the outside world. Adapters implement these ports.
//!
//! ## Persistence Ports
//!
//! - `LicenseStore` - License rows, the processed-event ledger and notice markers
//! - `UserDirectory` - Registration instants for implicit trials
//!
//! ## Gateway Ports
//!
//! - `GatewayQueryPort` - Authoritative payment/subscription status
//! - `CheckoutPort` - Outbound checkout creation
//!
//! ## Side Effects
//!
//! - `Notifier` - Best-effort user notifications
//! - `Clock` - Current instant

mod checkout;
mod clock;
mod gateway_query;
mod license_store;
mod notifier;
mod user_directory;

pub use checkout::{CheckoutPort, CheckoutRequest, CheckoutSession};
pub use clock::Clock;
pub use gateway_query::{
    GatewayError, GatewayQueryPort, GatewayStatus, PaymentSnapshot, SubscriptionSnapshot,
};
pub use license_store::{
    CommitOutcome, LicenseChange, LicenseStore, LicenseWrite, Precondition, ProcessedEvent,
    StoreError,
};
pub use notifier::{NotifyError, Notifier};
pub use user_directory::UserDirectory;

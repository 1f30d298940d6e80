//! Command and query handlers.

pub mod licensing;

pub use licensing::{
    CreateCheckoutCommand, CreateCheckoutHandler, CreateCheckoutResult, EntitlementError,
    ExpirySweeper, ExpirySweeperConfig, GetEntitlementHandler, GrantLicenseHandler, LedgerPruner,
    ReconcileWebhookCommand, ReconcilerConfig, SweepReport, WebhookReconciler,
};

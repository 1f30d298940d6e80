//! Licensing handlers - Webhook reconciliation, entitlement reads, grants.

mod create_checkout;
mod expiry_sweeper;
mod get_entitlement;
mod grant_license;
mod prune_ledger;
mod reconcile_webhook;

pub use create_checkout::{CreateCheckoutCommand, CreateCheckoutHandler, CreateCheckoutResult};
pub use expiry_sweeper::{ExpirySweeper, ExpirySweeperConfig, SweepReport};
pub use get_entitlement::{EntitlementError, GetEntitlementHandler};
pub use grant_license::GrantLicenseHandler;
pub use prune_ledger::LedgerPruner;
pub use reconcile_webhook::{ReconcileWebhookCommand, ReconcilerConfig, WebhookReconciler};

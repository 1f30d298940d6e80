//! Application layer - Commands, Queries, and Handlers.
//!
//! This layer orchestrates domain operations and coordinates between ports.
//! Writes (reconciliation, grants, checkout) and reads (entitlement) live in
//! separate handlers.

pub mod handlers;

pub use handlers::{
    CreateCheckoutCommand, CreateCheckoutHandler, CreateCheckoutResult, EntitlementError,
    ExpirySweeper, ExpirySweeperConfig, GetEntitlementHandler, GrantLicenseHandler, LedgerPruner,
    ReconcileWebhookCommand, ReconcilerConfig, SweepReport, WebhookReconciler,
};

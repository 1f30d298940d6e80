//! Licensing domain - Entitlement state machine and gateway reconciliation.
//!
//! # Module Organization
//!
//! - `plan`, `status`, `license` - the License aggregate and its state machine
//! - `reference` - correlation tokens round-tripped through the gateway
//! - `entitlement` - pure evaluation of access at an instant
//! - `catalog` - purchasable offers
//! - `webhook_event` - inbound notification shape
//! - `notice` - expiry notice thresholds
//! - `errors` - reconciliation outcomes and errors

mod catalog;
mod entitlement;
mod errors;
mod license;
mod notice;
mod plan;
mod reference;
mod status;
mod webhook_event;

pub use catalog::{Offer, OfferCatalog};
pub use entitlement::{DaysRemaining, Entitlement, EntitlementEvaluator, EntitlementPolicy};
pub use errors::{IgnoreReason, ReconcileError, ReconcileOutcome};
pub use license::License;
pub use notice::{NoticeSchedule, NoticeThreshold};
pub use plan::{Plan, UnknownPlan};
pub use reference::{CorrelationToken, DecodeError, ReferenceCodec, TransactionKind};
pub use status::LicenseStatus;
pub use webhook_event::{SubjectFamily, WebhookData, WebhookEvent, WebhookEventKind};

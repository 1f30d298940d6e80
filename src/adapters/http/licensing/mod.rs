//! HTTP adapter for licensing endpoints.
//!
//! - `GET /health` - Liveness and gateway configuration
//! - `GET /licensing/offers` - Purchasable offers
//! - `GET /licensing/entitlement` - Caller's current entitlement
//! - `GET /licensing/access` - Fail-closed access check
//! - `GET /licensing/history` - License history
//! - `POST /licensing/checkout` - Start checkout
//! - `POST /licensing/trial` - Persist the registration trial
//! - `POST /admin/licenses/:user_id/lifetime` - Lifetime grant
//! - `POST /admin/licenses/:user_id/reactivate` - Reactivate with a paid plan
//! - `POST /webhooks/payments` - Gateway notifications

pub mod dto;
mod handlers;
mod routes;

pub use handlers::{AdminUser, AuthenticatedUser, LicensingApiError, LicensingAppState};
pub use routes::{admin_routes, licensing_router, licensing_routes, webhook_routes};

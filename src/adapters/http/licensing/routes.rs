//! Axum router configuration for licensing endpoints.

use std::time::Duration;

use axum::{
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use super::handlers::{
    check_access, create_checkout, get_entitlement, get_history, grant_lifetime,
    handle_payment_webhook, health, list_offers, reactivate_license, start_trial,
    LicensingAppState,
};

/// Upper bound on any request, above the webhook reconciliation budget.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// User-facing licensing routes (require `X-User-Id`).
///
/// # Routes
/// - `GET /offers` - Purchasable offers
/// - `GET /entitlement` - Current entitlement
/// - `GET /access` - Fail-closed access check
/// - `GET /history` - Every license ever held, newest first
/// - `POST /checkout` - Start a gateway checkout
/// - `POST /trial` - Persist the registration trial
pub fn licensing_routes() -> Router<LicensingAppState> {
    Router::new()
        .route("/offers", get(list_offers))
        .route("/entitlement", get(get_entitlement))
        .route("/access", get(check_access))
        .route("/history", get(get_history))
        .route("/checkout", post(create_checkout))
        .route("/trial", post(start_trial))
}

/// Operator routes (require `X-User-Role: admin`).
///
/// # Routes
/// - `POST /licenses/:user_id/lifetime` - Grant a lifetime license
/// - `POST /licenses/:user_id/reactivate` - Fresh period of a paid plan
pub fn admin_routes() -> Router<LicensingAppState> {
    Router::new()
        .route("/licenses/:user_id/lifetime", post(grant_lifetime))
        .route("/licenses/:user_id/reactivate", post(reactivate_license))
}

/// Gateway notification routes (no user auth; signature verified).
///
/// # Routes
/// - `POST /payments` - Payment and subscription notifications
pub fn webhook_routes() -> Router<LicensingAppState> {
    Router::new().route("/payments", post(handle_payment_webhook))
}

/// Complete router with tracing and timeout layers applied.
pub fn licensing_router(state: LicensingAppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/licensing", licensing_routes())
        .nest("/admin", admin_routes())
        .nest("/webhooks", webhook_routes())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(REQUEST_TIMEOUT)),
        )
        .with_state(state)
}

//! HTTP handlers for licensing endpoints.
//!
//! These handlers connect Axum routes to the licensing application handlers.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::{FromRequestParts, Json, Path, Query, State};
use axum::http::request::Parts;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use thiserror::Error;

use crate::adapters::mercadopago::{SignatureError, SignedNotification, WebhookVerifier};
use crate::application::handlers::licensing::{
    CreateCheckoutCommand, CreateCheckoutHandler, EntitlementError, GetEntitlementHandler,
    GrantLicenseHandler, ReconcileWebhookCommand, WebhookReconciler,
};
use crate::domain::foundation::{DomainError, ErrorCode, Timestamp, UserId};
use crate::domain::licensing::{
    OfferCatalog, Plan, ReconcileError, UnknownPlan, WebhookData, WebhookEvent,
};
use crate::ports::{Clock, UserDirectory};

use super::dto::{
    AccessResponse, CheckoutResponse, CreateCheckoutRequest, EntitlementResponse, ErrorResponse,
    HealthResponse, LicenseHistoryEntry, NotificationQuery, OfferResponse, ReactivateRequest,
    WebhookAck,
};

/// Time the reconciler may spend on one delivery before the gateway gives up
/// on the request and schedules a redelivery anyway.
const WEBHOOK_BUDGET: Duration = Duration::from_secs(20);

// ════════════════════════════════════════════════════════════════════════════════
// Application State
// ════════════════════════════════════════════════════════════════════════════════

/// Shared application state; cloned per request.
#[derive(Clone)]
pub struct LicensingAppState {
    pub reconciler: Arc<WebhookReconciler>,
    pub entitlements: Arc<GetEntitlementHandler>,
    pub checkout: Arc<CreateCheckoutHandler>,
    pub grants: Arc<GrantLicenseHandler>,
    pub directory: Arc<dyn UserDirectory>,
    pub verifier: Arc<WebhookVerifier>,
    pub clock: Arc<dyn Clock>,
    pub gateway_configured: bool,
}

// ════════════════════════════════════════════════════════════════════════════════
// User Context
// ════════════════════════════════════════════════════════════════════════════════

/// Caller identity, set by the fronting auth proxy in the `X-User-Id` header.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: UserId,
}

/// Rejection type for AuthenticatedUser extraction.
pub struct AuthenticationRequired;

impl IntoResponse for AuthenticationRequired {
    fn into_response(self) -> axum::response::Response {
        let error = ErrorResponse::new("AUTHENTICATION_REQUIRED", "Authentication is required");
        (StatusCode::UNAUTHORIZED, Json(error)).into_response()
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = AuthenticationRequired;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get("X-User-Id")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| UserId::new(s).ok())
            .ok_or(AuthenticationRequired)?;

        Ok(AuthenticatedUser { user_id })
    }
}

/// Operator identity: the auth proxy sets `X-User-Role: admin` alongside
/// `X-User-Id` for staff accounts.
#[derive(Debug, Clone)]
pub struct AdminUser {
    pub user_id: UserId,
}

/// Rejection type for AdminUser extraction.
pub enum AdminRejection {
    Unauthenticated,
    Forbidden,
}

impl IntoResponse for AdminRejection {
    fn into_response(self) -> axum::response::Response {
        match self {
            Self::Unauthenticated => AuthenticationRequired.into_response(),
            Self::Forbidden => {
                let error = ErrorResponse::new("FORBIDDEN", "Administrator role required");
                (StatusCode::FORBIDDEN, Json(error)).into_response()
            }
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
{
    type Rejection = AdminRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = AuthenticatedUser::from_request_parts(parts, state)
            .await
            .map_err(|_| AdminRejection::Unauthenticated)?;
        let is_admin = parts
            .headers
            .get("X-User-Role")
            .and_then(|v| v.to_str().ok())
            .map_or(false, |role| role.eq_ignore_ascii_case("admin"));
        if !is_admin {
            return Err(AdminRejection::Forbidden);
        }

        Ok(AdminUser {
            user_id: user.user_id,
        })
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Query Handlers (GET endpoints)
// ════════════════════════════════════════════════════════════════════════════════

/// GET /health
pub async fn health(State(state): State<LicensingAppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        gateway_configured: state.gateway_configured,
    })
}

/// GET /licensing/offers
pub async fn list_offers() -> impl IntoResponse {
    let offers: Vec<OfferResponse> = OfferCatalog.all().iter().map(OfferResponse::from).collect();
    Json(offers)
}

/// GET /licensing/entitlement
pub async fn get_entitlement(
    State(state): State<LicensingAppState>,
    user: AuthenticatedUser,
) -> Result<impl IntoResponse, LicensingApiError> {
    let entitlement = state.entitlements.handle(&user.user_id).await?;
    Ok(Json(EntitlementResponse::from(entitlement)))
}

/// GET /licensing/access - fails closed on any error
pub async fn check_access(
    State(state): State<LicensingAppState>,
    user: AuthenticatedUser,
) -> impl IntoResponse {
    let has_access = state.entitlements.check_access(&user.user_id).await;
    Json(AccessResponse { has_access })
}

/// GET /licensing/history
pub async fn get_history(
    State(state): State<LicensingAppState>,
    user: AuthenticatedUser,
) -> Result<impl IntoResponse, LicensingApiError> {
    let history: Vec<LicenseHistoryEntry> = state
        .entitlements
        .history(&user.user_id)
        .await?
        .into_iter()
        .map(LicenseHistoryEntry::from)
        .collect();
    Ok(Json(history))
}

// ════════════════════════════════════════════════════════════════════════════════
// Command Handlers (POST endpoints)
// ════════════════════════════════════════════════════════════════════════════════

/// POST /licensing/checkout
pub async fn create_checkout(
    State(state): State<LicensingAppState>,
    user: AuthenticatedUser,
    Json(request): Json<CreateCheckoutRequest>,
) -> Result<impl IntoResponse, LicensingApiError> {
    let cmd = CreateCheckoutCommand {
        user_id: user.user_id,
        offer_id: request.offer_id,
        kind: request.kind,
        payer_email: request.payer_email,
        payer_name: request.payer_name,
    };

    let result = state.checkout.handle(cmd).await?;
    Ok((StatusCode::CREATED, Json(CheckoutResponse::from(result))))
}

/// POST /licensing/trial - persist the caller's registration trial
///
/// Called by the registration flow. Idempotent: a caller who already holds a
/// license gets it back unchanged.
pub async fn start_trial(
    State(state): State<LicensingAppState>,
    user: AuthenticatedUser,
) -> Result<impl IntoResponse, LicensingApiError> {
    let registered_at = registered_at(&state, &user.user_id).await?;
    let license = state.grants.start_trial(&user.user_id, registered_at).await?;
    Ok(Json(LicenseHistoryEntry::from(license)))
}

/// POST /admin/licenses/:user_id/lifetime
pub async fn grant_lifetime(
    State(state): State<LicensingAppState>,
    admin: AdminUser,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, LicensingApiError> {
    let user_id = UserId::new(user_id).map_err(DomainError::from)?;
    registered_at(&state, &user_id).await?;

    let license = state.grants.grant_lifetime(&user_id).await?;
    tracing::info!(admin = %admin.user_id, user_id = %user_id, "Lifetime license granted");
    Ok((StatusCode::CREATED, Json(LicenseHistoryEntry::from(license))))
}

/// POST /admin/licenses/:user_id/reactivate
pub async fn reactivate_license(
    State(state): State<LicensingAppState>,
    admin: AdminUser,
    Path(user_id): Path<String>,
    Json(request): Json<ReactivateRequest>,
) -> Result<impl IntoResponse, LicensingApiError> {
    let user_id = UserId::new(user_id).map_err(DomainError::from)?;
    let plan: Plan = request
        .plan
        .parse()
        .map_err(|e: UnknownPlan| DomainError::validation("plan", e.to_string()))?;
    registered_at(&state, &user_id).await?;

    let license = state.grants.reactivate(&user_id, plan).await?;
    tracing::info!(admin = %admin.user_id, user_id = %user_id, plan = %plan, "License reactivated");
    Ok((StatusCode::CREATED, Json(LicenseHistoryEntry::from(license))))
}

async fn registered_at(
    state: &LicensingAppState,
    user_id: &UserId,
) -> Result<Timestamp, LicensingApiError> {
    state
        .directory
        .registered_at(user_id)
        .await
        .map_err(EntitlementError::from)?
        .ok_or_else(|| EntitlementError::UnknownUser(user_id.clone()).into())
}

/// POST /webhooks/payments - gateway notifications (signature verified)
///
/// Terminal outcomes (applied, duplicate, ignored) are acknowledged with 200;
/// retryable failures answer 5xx so the gateway redelivers.
pub async fn handle_payment_webhook(
    State(state): State<LicensingAppState>,
    Query(query): Query<NotificationQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, LicensingApiError> {
    let mut event = if body.iter().all(u8::is_ascii_whitespace) {
        WebhookEvent::default()
    } else {
        WebhookEvent::parse(&body)
            .map_err(|e| LicensingApiError::MalformedNotification(e.to_string()))?
    };
    merge_query(&mut event, query);

    state.verifier.verify(
        SignedNotification {
            signature: header_str(&headers, "x-signature"),
            request_id: header_str(&headers, "x-request-id"),
            data_id: event.subject_id(),
        },
        state.clock.now(),
    )?;

    let cmd = ReconcileWebhookCommand::new(event)
        .with_deadline(tokio::time::Instant::now() + WEBHOOK_BUDGET);
    let outcome = state.reconciler.handle(cmd).await?;

    Ok((StatusCode::OK, Json(WebhookAck::from(&outcome))))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Fills topic and subject from the query string when the body lacks them.
fn merge_query(event: &mut WebhookEvent, query: NotificationQuery) {
    if event.event_type.is_empty() {
        if let Some(topic) = query.topic {
            event.event_type = topic;
        }
    }
    if event.subject_id().is_none() {
        if let Some(data_id) = query.data_id {
            event.data = Some(WebhookData { id: Some(data_id) });
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Error Handling
// ════════════════════════════════════════════════════════════════════════════════

/// API error type that converts layer errors to HTTP responses.
#[derive(Debug, Error)]
pub enum LicensingApiError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Entitlement(#[from] EntitlementError),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    #[error(transparent)]
    Signature(#[from] SignatureError),

    #[error("Malformed notification: {0}")]
    MalformedNotification(String),
}

impl LicensingApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::Domain(err) => match err.code {
                ErrorCode::ValidationFailed | ErrorCode::UnknownOffer => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_FAILED")
                }
                ErrorCode::GatewayError => (StatusCode::BAD_GATEWAY, "GATEWAY_ERROR"),
                ErrorCode::InvalidStateTransition | ErrorCode::ConcurrentUpdate => {
                    (StatusCode::CONFLICT, err.code.as_str())
                }
                ErrorCode::DatabaseError => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            },
            Self::Entitlement(EntitlementError::UnknownUser(_)) => {
                (StatusCode::NOT_FOUND, "USER_NOT_FOUND")
            }
            Self::Entitlement(EntitlementError::Store(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
            }
            Self::Reconcile(err) => (err.status_code(), "RECONCILE_FAILED"),
            Self::Signature(_) => (StatusCode::UNAUTHORIZED, "INVALID_WEBHOOK_SIGNATURE"),
            Self::MalformedNotification(_) => (StatusCode::BAD_REQUEST, "MALFORMED_NOTIFICATION"),
        }
    }
}

impl IntoResponse for LicensingApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, error_code) = self.status_and_code();
        if status.is_server_error() {
            tracing::error!(error = %self, status = status.as_u16(), "Request failed");
        }

        // Internal details stay in the logs.
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            "Internal error".to_string()
        } else {
            self.to_string()
        };
        (status, Json(ErrorResponse::new(error_code, message))).into_response()
    }
}

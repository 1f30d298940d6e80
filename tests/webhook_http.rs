//! HTTP-level tests for the licensing router.
//!
//! Drives the full Axum router with `tower::ServiceExt::oneshot`, signing
//! webhook requests the way the gateway does.

use std::sync::Arc;

use chrono::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use hmac::{Hmac, Mac};
use secrecy::SecretString;
use serde_json::{json, Value};
use sha2::Sha256;
use tower::ServiceExt;

use entitlement_engine::adapters::http::{licensing_router, LicensingAppState};
use entitlement_engine::adapters::memory::{
    InMemoryGateway, InMemoryLicenseStore, InMemoryUserDirectory, RecordingNotifier,
};
use entitlement_engine::adapters::mercadopago::WebhookVerifier;
use entitlement_engine::adapters::FixedClock;
use entitlement_engine::application::{
    CreateCheckoutHandler, GetEntitlementHandler, GrantLicenseHandler, ReconcilerConfig,
    WebhookReconciler,
};
use entitlement_engine::domain::foundation::{Timestamp, UserId};
use entitlement_engine::domain::licensing::{
    CorrelationToken, EntitlementEvaluator, EntitlementPolicy, Plan, ReferenceCodec,
    TransactionKind,
};
use entitlement_engine::ports::{GatewayStatus, PaymentSnapshot};

const SECRET: &str = "integration-webhook-secret";
const TS: i64 = 1_760_000_000;

struct Harness {
    app: Router,
    gateway: Arc<InMemoryGateway>,
    directory: Arc<InMemoryUserDirectory>,
    clock: Arc<FixedClock>,
}

fn harness() -> Harness {
    let store = Arc::new(InMemoryLicenseStore::new());
    let gateway = Arc::new(InMemoryGateway::new());
    let directory = Arc::new(InMemoryUserDirectory::new());
    let clock = Arc::new(FixedClock::new(Timestamp::from_unix_secs(TS).unwrap()));

    let state = LicensingAppState {
        reconciler: Arc::new(WebhookReconciler::new(
            store.clone(),
            gateway.clone(),
            Arc::new(RecordingNotifier::new()),
            clock.clone(),
            ReconcilerConfig::default(),
        )),
        entitlements: Arc::new(GetEntitlementHandler::new(
            store.clone(),
            directory.clone(),
            clock.clone(),
            EntitlementEvaluator::new(EntitlementPolicy::default()),
        )),
        checkout: Arc::new(CreateCheckoutHandler::new(gateway.clone())),
        grants: Arc::new(GrantLicenseHandler::new(
            store,
            clock.clone(),
            EntitlementPolicy::default(),
            3,
        )),
        directory: directory.clone(),
        verifier: Arc::new(WebhookVerifier::new(
            SecretString::new(SECRET.to_string()),
            300,
        )),
        clock: clock.clone(),
        gateway_configured: true,
    };

    Harness {
        app: licensing_router(state),
        gateway,
        directory,
        clock,
    }
}

fn router() -> (Router, Arc<InMemoryGateway>) {
    let harness = harness();
    (harness.app, harness.gateway)
}

fn get_as(uri: &str, user_id: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("X-User-Id", user_id)
        .body(Body::empty())
        .unwrap()
}

fn signature(data_id: &str, request_id: &str) -> String {
    let manifest = format!("id:{};request-id:{};ts:{};", data_id, request_id, TS);
    let mut mac = Hmac::<Sha256>::new_from_slice(SECRET.as_bytes()).unwrap();
    mac.update(manifest.as_bytes());
    format!("ts={},v1={}", TS, hex::encode(mac.finalize().into_bytes()))
}

fn webhook(body: Value, signature: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/webhooks/payments")
        .header("content-type", "application/json")
        .header("x-signature", signature)
        .header("x-request-id", "req-1")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn approved_payment() -> PaymentSnapshot {
    let user = UserId::new("user-9").unwrap();
    PaymentSnapshot {
        id: "123456".to_string(),
        status: GatewayStatus::Approved,
        external_reference: Some(ReferenceCodec.encode(&CorrelationToken::new(
            user,
            Plan::Monthly,
            TransactionKind::OneTimePayment,
        ))),
        amount_cents: Some(3_990),
    }
}

#[tokio::test]
async fn signed_payment_webhook_grants_access() {
    let (app, gateway) = router();
    gateway.set_payment(approved_payment());
    let body = json!({"id": "evt-1", "type": "payment", "data": {"id": "123456"}});

    let response = app
        .clone()
        .oneshot(webhook(body.clone(), &signature("123456", "req-1")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["outcome"], "applied");

    let entitlement = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/licensing/entitlement")
                .header("X-User-Id", "user-9")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(entitlement.status(), StatusCode::OK);
    let entitlement = json_body(entitlement).await;
    assert_eq!(entitlement["active"], true);
    assert_eq!(entitlement["plan"], "monthly");
    assert_eq!(entitlement["days_remaining"], 30);

    let replay = app
        .oneshot(webhook(body, &signature("123456", "req-1")))
        .await
        .unwrap();
    assert_eq!(replay.status(), StatusCode::OK);
    assert_eq!(json_body(replay).await["outcome"], "duplicate");
}

#[tokio::test]
async fn tampered_subject_is_rejected_before_reconciling() {
    let (app, gateway) = router();
    gateway.set_payment(approved_payment());
    let body = json!({"id": "evt-1", "type": "payment", "data": {"id": "123456"}});

    let response = app
        .oneshot(webhook(body, &signature("654321", "req-1")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(gateway.query_calls(), 0);
}

#[tokio::test]
async fn query_string_notification_is_accepted() {
    let (app, gateway) = router();
    gateway.set_payment(approved_payment());

    let request = Request::builder()
        .method("POST")
        .uri("/webhooks/payments?type=payment&data.id=123456")
        .header("x-signature", signature("123456", "req-1"))
        .header("x-request-id", "req-1")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["outcome"], "applied");
}

#[tokio::test]
async fn gateway_outage_asks_for_redelivery() {
    let (app, gateway) = router();
    gateway.fail_next(entitlement_engine::ports::GatewayError::Timeout);
    let body = json!({"id": "evt-1", "type": "payment", "data": {"id": "123456"}});

    let response = app
        .oneshot(webhook(body, &signature("123456", "req-1")))
        .await
        .unwrap();

    assert!(response.status().is_server_error());
}

#[tokio::test]
async fn access_check_denies_unknown_user() {
    let (app, _) = router();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/licensing/access")
                .header("X-User-Id", "nobody")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["has_access"], false);
}

#[tokio::test]
async fn admin_reactivation_supersedes_expired_license() {
    let harness = harness();
    let user = UserId::new("user-9").unwrap();
    harness
        .directory
        .register(user, Timestamp::from_unix_secs(TS).unwrap().minus_days(1))
        .await;
    harness.gateway.set_payment(approved_payment());
    let body = json!({"id": "evt-1", "type": "payment", "data": {"id": "123456"}});
    let paid = harness
        .app
        .clone()
        .oneshot(webhook(body, &signature("123456", "req-1")))
        .await
        .unwrap();
    assert_eq!(json_body(paid).await["outcome"], "applied");

    harness.clock.advance(Duration::days(31));
    let lapsed = harness
        .app
        .clone()
        .oneshot(get_as("/licensing/entitlement", "user-9"))
        .await
        .unwrap();
    assert_eq!(json_body(lapsed).await["active"], false);

    let reactivated = harness
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/admin/licenses/user-9/reactivate")
                .header("content-type", "application/json")
                .header("X-User-Id", "ops-1")
                .header("X-User-Role", "admin")
                .body(Body::from(json!({"plan": "monthly"}).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(reactivated.status(), StatusCode::CREATED);

    let history = harness
        .app
        .oneshot(get_as("/licensing/history", "user-9"))
        .await
        .unwrap();
    let history = json_body(history).await;
    let rows = history.as_array().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["plan"], "monthly");
    assert_eq!(rows[0]["status"], "active");
    assert_eq!(rows[1]["status"], "expired");
}

#[tokio::test]
async fn admin_routes_forbid_ordinary_users() {
    let harness = harness();
    harness
        .directory
        .register(UserId::new("user-9").unwrap(), Timestamp::from_unix_secs(TS).unwrap())
        .await;

    let response = harness
        .app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/admin/licenses/user-9/lifetime")
                .header("X-User-Id", "user-9")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

//! Entitlement Engine server
//!
//! Serves the licensing HTTP API and runs the expiry sweeper until Ctrl+C.

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use entitlement_engine::adapters::http::{licensing_router, LicensingAppState};
use entitlement_engine::adapters::mercadopago::{
    MercadoPagoClient, MercadoPagoConfig, WebhookVerifier,
};
use entitlement_engine::adapters::postgres::{PostgresLicenseStore, PostgresUserDirectory};
use entitlement_engine::adapters::{SystemClock, TracingNotifier};
use entitlement_engine::application::handlers::licensing::{
    CreateCheckoutHandler, ExpirySweeper, GetEntitlementHandler, GrantLicenseHandler,
    WebhookReconciler,
};
use entitlement_engine::config::{AppConfig, ServerConfig};
use entitlement_engine::domain::licensing::EntitlementEvaluator;
use entitlement_engine::ports::{Clock, LicenseStore, Notifier, UserDirectory};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

fn init_tracing(server: &ServerConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&server.log_level));
    let registry = tracing_subscriber::registry().with(filter);

    if server.json_logs {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let config = AppConfig::load()?;
    init_tracing(&config.server);
    config.validate()?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = ?config.server.environment,
        "Starting entitlement engine"
    );

    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .acquire_timeout(config.database.acquire_timeout())
        .connect(&config.database.url)
        .await?;
    if config.database.run_migrations {
        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::info!("Database migrations applied");
    }

    let store: Arc<dyn LicenseStore> = Arc::new(PostgresLicenseStore::new(pool.clone()));
    let directory: Arc<dyn UserDirectory> = Arc::new(PostgresUserDirectory::new(pool));
    let gateway = Arc::new(MercadoPagoClient::new(
        MercadoPagoConfig::from_gateway_config(&config.gateway),
    )?);
    let notifier: Arc<dyn Notifier> = Arc::new(TracingNotifier::new());
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let evaluator = EntitlementEvaluator::new(config.entitlement.policy());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = ExpirySweeper::new(
        store.clone(),
        directory.clone(),
        notifier.clone(),
        clock.clone(),
        evaluator,
        config.entitlement.sweeper_config(),
    );
    let sweeper_task = tokio::spawn(async move { sweeper.run(shutdown_rx).await });

    let state = LicensingAppState {
        reconciler: Arc::new(WebhookReconciler::new(
            store.clone(),
            gateway.clone(),
            notifier,
            clock.clone(),
            config
                .entitlement
                .reconciler_config(config.gateway.timeout()),
        )),
        entitlements: Arc::new(GetEntitlementHandler::new(
            store.clone(),
            directory.clone(),
            clock.clone(),
            evaluator,
        )),
        checkout: Arc::new(CreateCheckoutHandler::new(gateway)),
        grants: Arc::new(GrantLicenseHandler::new(
            store,
            clock.clone(),
            config.entitlement.policy(),
            config.entitlement.max_conflict_retries,
        )),
        directory,
        verifier: Arc::new(WebhookVerifier::new(
            config.gateway.webhook_secret.clone(),
            config.gateway.signature_tolerance_secs,
        )),
        clock,
        gateway_configured: config.gateway.is_configured(),
    };

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Listening");

    axum::serve(listener, licensing_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);
    if let Err(err) = sweeper_task.await {
        tracing::warn!(error = %err, "Expiry sweeper task ended abnormally");
    }
    tracing::info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "Failed to listen for Ctrl+C");
    }
    tracing::info!("Shutdown signal received, stopping server...");
}

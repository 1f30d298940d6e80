//! Application configuration module
//!
//! Type-safe configuration loaded from environment variables using the
//! `config` and `dotenvy` crates. Variables carry the `ENTITLEMENT` prefix
//! and nested values use double underscores as separators.
//!
//! # Example
//!
//! ```no_run
//! use entitlement_engine::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//! ```

mod database;
mod entitlement;
mod error;
mod gateway;
mod server;

pub use database::DatabaseConfig;
pub use entitlement::EntitlementConfig;
pub use error::{ConfigError, ValidationError};
pub use gateway::{BackUrls, GatewayConfig};
pub use server::{Environment, ServerConfig};

use serde::Deserialize;

/// Root application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server configuration (host, port, environment, log format)
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration (PostgreSQL connection)
    pub database: DatabaseConfig,

    /// Payment gateway credentials and endpoints
    pub gateway: GatewayConfig,

    /// Plan durations, notice thresholds and sweeper cadence
    #[serde(default)]
    pub entitlement: EntitlementConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// 1. Loads `.env` file if present (for development)
    /// 2. Reads environment variables with the `ENTITLEMENT` prefix
    /// 3. Uses `__` (double underscore) to separate nested values
    ///
    /// # Environment Variable Format
    ///
    /// - `ENTITLEMENT__SERVER__PORT=8080` -> `server.port = 8080`
    /// - `ENTITLEMENT__GATEWAY__ACCESS_TOKEN=...` -> `gateway.access_token = ...`
    /// - `ENTITLEMENT__ENTITLEMENT__NOTICE_THRESHOLDS=5,1,0` -> list
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or values
    /// cannot be parsed into expected types.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("ENTITLEMENT")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("entitlement.notice_thresholds"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Validate all configuration values
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` for the first invalid section.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.server.validate()?;
        self.database.validate()?;
        self.gateway.validate()?;
        self.entitlement.validate()?;
        Ok(())
    }

    /// Check if running in production environment
    pub fn is_production(&self) -> bool {
        self.server.is_production()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Env vars are process-global
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const VARS: &[&str] = &[
        "ENTITLEMENT__DATABASE__URL",
        "ENTITLEMENT__GATEWAY__ACCESS_TOKEN",
        "ENTITLEMENT__GATEWAY__WEBHOOK_SECRET",
        "ENTITLEMENT__SERVER__PORT",
        "ENTITLEMENT__SERVER__JSON_LOGS",
        "ENTITLEMENT__ENTITLEMENT__NOTICE_THRESHOLDS",
        "ENTITLEMENT__ENTITLEMENT__TRIAL_DAYS",
    ];

    fn set_minimal_env() {
        env::set_var("ENTITLEMENT__DATABASE__URL", "postgresql://test@localhost/test");
        env::set_var("ENTITLEMENT__GATEWAY__ACCESS_TOKEN", "APP_USR-test");
        env::set_var("ENTITLEMENT__GATEWAY__WEBHOOK_SECRET", "secret");
    }

    fn clear_env() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    #[test]
    fn test_load_from_environment() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        let result = AppConfig::load();
        clear_env();

        let config = result.expect("config should load");
        assert_eq!(config.database.url, "postgresql://test@localhost/test");
        assert_eq!(config.gateway.api_base_url, "https://api.mercadopago.com");
        assert_eq!(config.entitlement.trial_days, 15);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_nested_overrides() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        env::set_var("ENTITLEMENT__SERVER__PORT", "9000");
        env::set_var("ENTITLEMENT__SERVER__JSON_LOGS", "true");
        env::set_var("ENTITLEMENT__ENTITLEMENT__TRIAL_DAYS", "7");
        env::set_var("ENTITLEMENT__ENTITLEMENT__NOTICE_THRESHOLDS", "3,1");
        let result = AppConfig::load();
        clear_env();

        let config = result.expect("config should load");
        assert_eq!(config.server.port, 9000);
        assert!(config.server.json_logs);
        assert_eq!(config.entitlement.trial_days, 7);
        assert_eq!(config.entitlement.notice_thresholds, vec![3, 1]);
    }

    #[test]
    fn test_missing_gateway_credentials_fail_to_load() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        env::set_var("ENTITLEMENT__DATABASE__URL", "postgresql://test@localhost/test");
        let result = AppConfig::load();
        clear_env();

        assert!(result.is_err());
    }
}

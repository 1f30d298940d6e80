//! Configuration error types

use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),
}

/// Errors that can occur during configuration validation
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required configuration missing: {0}")]
    MissingRequired(&'static str),

    #[error("Invalid port number")]
    InvalidPort,

    #[error("Invalid socket address: {0}")]
    InvalidSocketAddr(String),

    #[error("Invalid database URL format")]
    InvalidDatabaseUrl,

    #[error("Pool size must be between 1 and 100")]
    InvalidPoolSize,

    #[error("Invalid gateway URL for {0}")]
    InvalidGatewayUrl(&'static str),

    #[error("Gateway timeout must be between 1 and 120 seconds")]
    InvalidGatewayTimeout,

    #[error("Invalid entitlement period: {0}")]
    InvalidPeriod(&'static str),

    #[error("Notice thresholds must not be empty")]
    EmptyNoticeThresholds,

    #[error("Sweep interval must be at least one second")]
    InvalidSweepInterval,
}

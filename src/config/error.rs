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
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Required configuration missing: {0}")]
    MissingRequired(&'static str),

    #[error("Invalid timeout: {0}")]
    InvalidTimeout(&'static str),

    #[error("Invalid database URL format")]
    InvalidDatabaseUrl,

    #[error("Pool min_connections exceeds max_connections")]
    InvalidPoolSize,

    #[error("Pool size exceeds maximum allowed (100)")]
    PoolSizeTooLarge,

    #[error("Billing API URL must use HTTPS in production")]
    BillingUrlMustBeHttps,

    #[error("Invalid billing API URL")]
    InvalidBillingUrl,

    #[error("Static access tokens are not allowed in production")]
    StaticTokenInProduction,

    #[error("Worker batch size must be between 1 and 1000")]
    InvalidBatchSize,

    #[error("Worker max_attempts must be at least 1")]
    InvalidMaxAttempts,

    #[error("Invalid log filter: {0}")]
    InvalidLogLevel(String),
}

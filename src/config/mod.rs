//! Application configuration module
//!
//! Type-safe configuration loaded from environment variables using the
//! `config` and `dotenvy` crates. Variables carry the `PURCHASE_RECONCILER`
//! prefix and nested values are separated by double underscores.
//!
//! # Example
//!
//! ```no_run
//! use purchase_reconciler::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//! ```

mod billing;
mod database;
mod error;
mod worker;

pub use billing::{BillingConfig, TokenSourceKind};
pub use database::DatabaseConfig;
pub use error::{ConfigError, ValidationError};
pub use worker::{Environment, LogFormat, WorkerConfig};

use serde::Deserialize;

/// Root configuration of the reconciliation worker.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// PostgreSQL connection
    pub database: DatabaseConfig,

    /// Billing provider API and reconciliation settings
    #[serde(default)]
    pub billing: BillingConfig,

    /// Dispatcher, logging and environment
    #[serde(default)]
    pub worker: WorkerConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// 1. Loads `.env` if present (development)
    /// 2. Reads variables with the `PURCHASE_RECONCILER` prefix
    /// 3. Uses `__` to separate nested values
    ///
    /// - `PURCHASE_RECONCILER__DATABASE__URL=...` -> `database.url`
    /// - `PURCHASE_RECONCILER__WORKER__BATCH_SIZE=20` -> `worker.batch_size`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or values
    /// cannot be parsed.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("PURCHASE_RECONCILER")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.database.validate()?;
        self.billing.validate(&self.worker.environment)?;
        self.worker.validate()?;
        Ok(())
    }

    pub fn is_production(&self) -> bool {
        self.worker.is_production()
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
        "PURCHASE_RECONCILER__DATABASE__URL",
        "PURCHASE_RECONCILER__WORKER__ENVIRONMENT",
        "PURCHASE_RECONCILER__WORKER__BATCH_SIZE",
        "PURCHASE_RECONCILER__BILLING__TOKEN_SOURCE",
        "PURCHASE_RECONCILER__BILLING__ACCESS_TOKEN",
    ];

    fn set_minimal_env() {
        env::set_var(
            "PURCHASE_RECONCILER__DATABASE__URL",
            "postgresql://test@localhost/ledger",
        );
    }

    fn clear_env() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    #[test]
    fn loads_from_environment() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        let result = AppConfig::load();
        clear_env();

        let config = result.expect("config should load");
        assert_eq!(config.database.url, "postgresql://test@localhost/ledger");
        assert_eq!(config.billing.token_source, TokenSourceKind::Metadata);
        assert_eq!(config.worker.batch_size, 50);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn nested_overrides_are_applied() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        env::set_var("PURCHASE_RECONCILER__WORKER__BATCH_SIZE", "20");
        env::set_var("PURCHASE_RECONCILER__BILLING__TOKEN_SOURCE", "static");
        env::set_var("PURCHASE_RECONCILER__BILLING__ACCESS_TOKEN", "ya29.local");
        let result = AppConfig::load();
        clear_env();

        let config = result.expect("config should load");
        assert_eq!(config.worker.batch_size, 20);
        assert_eq!(config.billing.token_source, TokenSourceKind::Static);
        assert!(config.billing.access_token.is_some());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn production_is_detected_and_validated() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        env::set_var("PURCHASE_RECONCILER__WORKER__ENVIRONMENT", "production");
        env::set_var("PURCHASE_RECONCILER__BILLING__TOKEN_SOURCE", "static");
        env::set_var("PURCHASE_RECONCILER__BILLING__ACCESS_TOKEN", "ya29.local");
        let result = AppConfig::load();
        clear_env();

        let config = result.expect("config should load");
        assert!(config.is_production());
        assert!(matches!(
            config.validate(),
            Err(ValidationError::StaticTokenInProduction)
        ));
    }

    #[test]
    fn missing_database_url_fails_to_load() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        assert!(AppConfig::load().is_err());
    }
}

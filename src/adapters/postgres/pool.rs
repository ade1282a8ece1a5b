//! Connection pool and schema migrations.

use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use std::str::FromStr;

use crate::config::DatabaseConfig;
use crate::domain::foundation::{DomainError, ErrorCode};

/// Opens the connection pool described by `config`.
pub async fn connect(config: &DatabaseConfig) -> Result<PgPool, DomainError> {
    tracing::info!(
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        application_name = %config.application_name,
        "Connecting to PostgreSQL"
    );

    let options = PgConnectOptions::from_str(&config.url)
        .map_err(|e| DomainError::new(ErrorCode::DatabaseError, format!("Invalid URL: {}", e)))?
        .application_name(&config.application_name)
        .options([("statement_timeout", format!("{}s", config.statement_timeout_secs))]);

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.acquire_timeout())
        .idle_timeout(config.idle_timeout())
        .max_lifetime(config.max_lifetime())
        .connect_with(options)
        .await
        .map_err(|e| {
            DomainError::new(ErrorCode::DatabaseError, format!("Failed to connect: {}", e))
        })?;

    tracing::info!("PostgreSQL connection pool established");
    Ok(pool)
}

/// Applies the migrations under `migrations/`.
pub async fn run_migrations(pool: &PgPool) -> Result<(), DomainError> {
    tracing::info!("Running database migrations");
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| {
            DomainError::new(ErrorCode::DatabaseError, format!("Migration failed: {}", e))
        })?;
    tracing::info!("Database migrations completed");
    Ok(())
}

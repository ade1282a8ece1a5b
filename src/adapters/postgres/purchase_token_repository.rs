//! PostgreSQL implementation of PurchaseTokenRepository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::domain::foundation::{DomainError, Timestamp};
use crate::domain::purchase::PurchaseToken;
use crate::ports::PurchaseTokenRepository;

use super::db_error;

pub struct PostgresPurchaseTokenRepository {
    pool: PgPool,
}

impl PostgresPurchaseTokenRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PurchaseTokenRow {
    token: String,
    package_name: String,
    product_id: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<PurchaseTokenRow> for PurchaseToken {
    fn from(row: PurchaseTokenRow) -> Self {
        PurchaseToken {
            token: row.token,
            package_name: row.package_name,
            product_id: row.product_id,
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
        }
    }
}

#[async_trait]
impl PurchaseTokenRepository for PostgresPurchaseTokenRepository {
    async fn upsert(
        &self,
        token: &str,
        package_name: &str,
        product_id: &str,
    ) -> Result<PurchaseToken, DomainError> {
        let row: PurchaseTokenRow = sqlx::query_as(
            r#"
            INSERT INTO purchase_tokens (token, package_name, product_id, created_at, updated_at)
            VALUES ($1, $2, $3, NOW(), NOW())
            ON CONFLICT (token) DO UPDATE SET
                package_name = EXCLUDED.package_name,
                product_id = EXCLUDED.product_id,
                updated_at = NOW()
            RETURNING token, package_name, product_id, created_at, updated_at
            "#,
        )
        .bind(token)
        .bind(package_name)
        .bind(product_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("Failed to upsert purchase token", e))?;

        Ok(row.into())
    }

    async fn find(&self, token: &str) -> Result<Option<PurchaseToken>, DomainError> {
        let row: Option<PurchaseTokenRow> = sqlx::query_as(
            r#"
            SELECT token, package_name, product_id, created_at, updated_at
            FROM purchase_tokens
            WHERE token = $1
            "#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to find purchase token", e))?;

        Ok(row.map(PurchaseToken::from))
    }

    async fn list_updated_before(
        &self,
        as_of: &Timestamp,
    ) -> Result<Vec<PurchaseToken>, DomainError> {
        let rows: Vec<PurchaseTokenRow> = sqlx::query_as(
            r#"
            SELECT token, package_name, product_id, created_at, updated_at
            FROM purchase_tokens
            WHERE updated_at <= $1
            ORDER BY updated_at ASC
            "#,
        )
        .bind(as_of.as_datetime())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to list purchase tokens", e))?;

        Ok(rows.into_iter().map(PurchaseToken::from).collect())
    }
}

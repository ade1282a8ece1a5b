//! PostgreSQL implementation of SubscriptionTypeRepository.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::domain::foundation::{DomainError, ErrorCode};
use crate::domain::purchase::{SubscriptionType, SubscriptionTypeMapping};
use crate::ports::SubscriptionTypeRepository;

use super::db_error;

pub struct PostgresSubscriptionTypeRepository {
    pool: PgPool,
}

impl PostgresSubscriptionTypeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SubscriptionTypeRow {
    product_id: String,
    subscription_type: String,
    offer_periods: Option<i32>,
    next_subscription_type: Option<String>,
}

impl TryFrom<SubscriptionTypeRow> for SubscriptionTypeMapping {
    type Error = DomainError;

    fn try_from(row: SubscriptionTypeRow) -> Result<Self, Self::Error> {
        let invalid = |e: crate::domain::foundation::ValidationError| {
            DomainError::new(
                ErrorCode::DatabaseError,
                format!("Invalid subscription type for {}: {}", row.product_id, e),
            )
        };
        let subscription_type = SubscriptionType::new(row.subscription_type.clone()).map_err(invalid)?;
        let next = row
            .next_subscription_type
            .clone()
            .map(SubscriptionType::new)
            .transpose()
            .map_err(invalid)?;
        let offer_periods = row
            .offer_periods
            .map(|n| u32::try_from(n).unwrap_or(0));

        Ok(SubscriptionTypeMapping {
            product_id: row.product_id.clone(),
            subscription_type,
            offer_periods,
            next_subscription_type: next,
        })
    }
}

#[async_trait]
impl SubscriptionTypeRepository for PostgresSubscriptionTypeRepository {
    async fn find_by_product_id(
        &self,
        product_id: &str,
    ) -> Result<Option<SubscriptionTypeMapping>, DomainError> {
        let row: Option<SubscriptionTypeRow> = sqlx::query_as(
            r#"
            SELECT product_id, subscription_type, offer_periods, next_subscription_type
            FROM subscription_types
            WHERE product_id = $1
            "#,
        )
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to find subscription type", e))?;

        row.map(SubscriptionTypeMapping::try_from).transpose()
    }
}

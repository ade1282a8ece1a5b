//! PostgreSQL implementation of SubscriptionRepository.
//!
//! Subscriptions reach their purchase token either through their own
//! metadata (grace periods, trials) or through their payment.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::foundation::{
    DomainError, ErrorCode, PaymentId, SubscriptionId, Timestamp, UserId,
};
use crate::domain::ledger::Subscription;
use crate::domain::purchase::{OrderId, SubscriptionType};
use crate::ports::SubscriptionRepository;

use super::{db_error, metadata_from_json, metadata_to_json};

pub struct PostgresSubscriptionRepository {
    pool: PgPool,
}

impl PostgresSubscriptionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SubscriptionRow {
    id: Uuid,
    user_id: String,
    subscription_type: String,
    start_at: DateTime<Utc>,
    end_at: DateTime<Utc>,
    payment_id: Option<Uuid>,
    next_subscription_id: Option<Uuid>,
    metadata: serde_json::Value,
    notes: Vec<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<SubscriptionRow> for Subscription {
    type Error = DomainError;

    fn try_from(row: SubscriptionRow) -> Result<Self, Self::Error> {
        let invalid = |e: crate::domain::foundation::ValidationError| {
            DomainError::new(
                ErrorCode::DatabaseError,
                format!("Invalid subscription row: {}", e),
            )
        };

        Ok(Subscription {
            id: SubscriptionId::from_uuid(row.id),
            user_id: UserId::new(row.user_id).map_err(invalid)?,
            subscription_type: SubscriptionType::new(row.subscription_type).map_err(invalid)?,
            start: Timestamp::from_datetime(row.start_at),
            end: Timestamp::from_datetime(row.end_at),
            payment_id: row.payment_id.map(PaymentId::from_uuid),
            next_subscription_id: row.next_subscription_id.map(SubscriptionId::from_uuid),
            metadata: metadata_from_json(row.metadata)?,
            notes: row.notes,
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
        })
    }
}

const COLUMNS: &str = "s.id, s.user_id, s.subscription_type, s.start_at, s.end_at, s.payment_id, \
     s.next_subscription_id, s.metadata, s.notes, s.created_at, s.updated_at";

#[async_trait]
impl SubscriptionRepository for PostgresSubscriptionRepository {
    async fn create(&self, subscription: &Subscription) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO subscriptions (
                id, user_id, subscription_type, start_at, end_at, payment_id,
                next_subscription_id, metadata, notes, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(subscription.id.as_uuid())
        .bind(subscription.user_id.as_str())
        .bind(subscription.subscription_type.as_str())
        .bind(subscription.start.as_datetime())
        .bind(subscription.end.as_datetime())
        .bind(subscription.payment_id.map(|id| *id.as_uuid()))
        .bind(subscription.next_subscription_id.map(|id| *id.as_uuid()))
        .bind(metadata_to_json(&subscription.metadata)?)
        .bind(&subscription.notes)
        .bind(subscription.created_at.as_datetime())
        .bind(subscription.updated_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to create subscription", e))?;

        Ok(())
    }

    async fn update(&self, subscription: &Subscription) -> Result<(), DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE subscriptions SET
                subscription_type = $2,
                start_at = $3,
                end_at = $4,
                payment_id = $5,
                next_subscription_id = $6,
                metadata = $7,
                notes = $8,
                updated_at = $9
            WHERE id = $1
            "#,
        )
        .bind(subscription.id.as_uuid())
        .bind(subscription.subscription_type.as_str())
        .bind(subscription.start.as_datetime())
        .bind(subscription.end.as_datetime())
        .bind(subscription.payment_id.map(|id| *id.as_uuid()))
        .bind(subscription.next_subscription_id.map(|id| *id.as_uuid()))
        .bind(metadata_to_json(&subscription.metadata)?)
        .bind(&subscription.notes)
        .bind(subscription.updated_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to update subscription", e))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::new(
                ErrorCode::SubscriptionNotFound,
                "Subscription not found",
            )
            .with_detail("subscription_id", subscription.id.to_string()));
        }

        Ok(())
    }

    async fn delete(&self, id: &SubscriptionId) -> Result<(), DomainError> {
        sqlx::query("DELETE FROM subscriptions WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("Failed to delete subscription", e))?;

        Ok(())
    }

    async fn find_by_id(&self, id: &SubscriptionId) -> Result<Option<Subscription>, DomainError> {
        let row: Option<SubscriptionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM subscriptions s WHERE s.id = $1",
            COLUMNS
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to find subscription", e))?;

        row.map(Subscription::try_from).transpose()
    }

    async fn find_by_order_id(
        &self,
        order_id: &OrderId,
    ) -> Result<Option<Subscription>, DomainError> {
        let row: Option<SubscriptionRow> = sqlx::query_as(&format!(
            r#"
            SELECT {} FROM subscriptions s
            WHERE s.metadata->>'order_id' = $1
            ORDER BY s.end_at DESC
            LIMIT 1
            "#,
            COLUMNS
        ))
        .bind(order_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to find subscription by order", e))?;

        row.map(Subscription::try_from).transpose()
    }

    async fn latest_for_purchase_token(
        &self,
        purchase_token: &str,
    ) -> Result<Option<Subscription>, DomainError> {
        let row: Option<SubscriptionRow> = sqlx::query_as(&format!(
            r#"
            SELECT {} FROM subscriptions s
            LEFT JOIN payments p ON p.id = s.payment_id
            WHERE s.metadata->>'purchase_token' = $1
               OR p.metadata->>'purchase_token' = $1
            ORDER BY s.end_at DESC, s.created_at DESC
            LIMIT 1
            "#,
            COLUMNS
        ))
        .bind(purchase_token)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to find latest subscription", e))?;

        row.map(Subscription::try_from).transpose()
    }
}

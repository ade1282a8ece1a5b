//! PostgreSQL implementation of PaymentRepository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::foundation::{
    DomainError, ErrorCode, PaymentId, SubscriptionId, Timestamp, UserId,
};
use crate::domain::ledger::{Payment, PaymentStatus};
use crate::domain::purchase::{OrderId, SubscriptionType};
use crate::ports::PaymentRepository;

use super::{db_error, metadata_from_json, metadata_to_json};

pub struct PostgresPaymentRepository {
    pool: PgPool,
}

impl PostgresPaymentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PaymentRow {
    id: Uuid,
    user_id: String,
    status: String,
    subscription_type: String,
    subscription_start: DateTime<Utc>,
    subscription_end: DateTime<Utc>,
    subscription_id: Option<Uuid>,
    metadata: serde_json::Value,
    notes: Vec<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = DomainError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        let status = PaymentStatus::parse(&row.status).ok_or_else(|| {
            DomainError::new(
                ErrorCode::DatabaseError,
                format!("Invalid payment status: {}", row.status),
            )
        })?;
        let invalid = |e: crate::domain::foundation::ValidationError| {
            DomainError::new(ErrorCode::DatabaseError, format!("Invalid payment row: {}", e))
        };

        Ok(Payment {
            id: PaymentId::from_uuid(row.id),
            user_id: UserId::new(row.user_id).map_err(invalid)?,
            status,
            subscription_type: SubscriptionType::new(row.subscription_type).map_err(invalid)?,
            subscription_start: Timestamp::from_datetime(row.subscription_start),
            subscription_end: Timestamp::from_datetime(row.subscription_end),
            subscription_id: row.subscription_id.map(SubscriptionId::from_uuid),
            metadata: metadata_from_json(row.metadata)?,
            notes: row.notes,
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
        })
    }
}

const COLUMNS: &str = "id, user_id, status, subscription_type, subscription_start, \
     subscription_end, subscription_id, metadata, notes, created_at, updated_at";

impl PostgresPaymentRepository {
    async fn fetch_one_where(
        &self,
        clause: &str,
        value: &str,
    ) -> Result<Option<Payment>, DomainError> {
        let row: Option<PaymentRow> = sqlx::query_as(&format!(
            "SELECT {} FROM payments WHERE {} ORDER BY subscription_end DESC, created_at DESC LIMIT 1",
            COLUMNS, clause
        ))
        .bind(value)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to find payment", e))?;

        row.map(Payment::try_from).transpose()
    }
}

#[async_trait]
impl PaymentRepository for PostgresPaymentRepository {
    async fn create(&self, payment: &Payment) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO payments (
                id, user_id, status, subscription_type, subscription_start, subscription_end,
                subscription_id, metadata, notes, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(payment.id.as_uuid())
        .bind(payment.user_id.as_str())
        .bind(payment.status.as_str())
        .bind(payment.subscription_type.as_str())
        .bind(payment.subscription_start.as_datetime())
        .bind(payment.subscription_end.as_datetime())
        .bind(payment.subscription_id.map(|id| *id.as_uuid()))
        .bind(metadata_to_json(&payment.metadata)?)
        .bind(&payment.notes)
        .bind(payment.created_at.as_datetime())
        .bind(payment.updated_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(db_err) = &e {
                if db_err.constraint() == Some("idx_payments_order_id") {
                    return DomainError::new(
                        ErrorCode::Conflict,
                        "A payment already exists for this order id",
                    );
                }
            }
            db_error("Failed to create payment", e)
        })?;

        Ok(())
    }

    async fn update(&self, payment: &Payment) -> Result<(), DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE payments SET
                status = $2,
                subscription_type = $3,
                subscription_start = $4,
                subscription_end = $5,
                subscription_id = $6,
                metadata = $7,
                notes = $8,
                updated_at = $9
            WHERE id = $1
            "#,
        )
        .bind(payment.id.as_uuid())
        .bind(payment.status.as_str())
        .bind(payment.subscription_type.as_str())
        .bind(payment.subscription_start.as_datetime())
        .bind(payment.subscription_end.as_datetime())
        .bind(payment.subscription_id.map(|id| *id.as_uuid()))
        .bind(metadata_to_json(&payment.metadata)?)
        .bind(&payment.notes)
        .bind(payment.updated_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to update payment", e))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::new(ErrorCode::PaymentNotFound, "Payment not found")
                .with_detail("payment_id", payment.id.to_string()));
        }

        Ok(())
    }

    async fn find_by_id(&self, id: &PaymentId) -> Result<Option<Payment>, DomainError> {
        let row: Option<PaymentRow> =
            sqlx::query_as(&format!("SELECT {} FROM payments WHERE id = $1", COLUMNS))
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| db_error("Failed to find payment", e))?;

        row.map(Payment::try_from).transpose()
    }

    async fn find_by_order_id(&self, order_id: &OrderId) -> Result<Option<Payment>, DomainError> {
        self.fetch_one_where("metadata->>'order_id' = $1", order_id.as_str())
            .await
    }

    async fn list_by_purchase_token(
        &self,
        purchase_token: &str,
    ) -> Result<Vec<Payment>, DomainError> {
        let rows: Vec<PaymentRow> = sqlx::query_as(&format!(
            r#"
            SELECT {} FROM payments
            WHERE metadata->>'purchase_token' = $1
            ORDER BY subscription_end DESC, created_at DESC
            "#,
            COLUMNS
        ))
        .bind(purchase_token)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to list payments", e))?;

        rows.into_iter().map(Payment::try_from).collect()
    }

    async fn latest_by_purchase_token(
        &self,
        purchase_token: &str,
    ) -> Result<Option<Payment>, DomainError> {
        self.fetch_one_where("metadata->>'purchase_token' = $1", purchase_token)
            .await
    }

    async fn latest_by_purchase_token_starting_from(
        &self,
        purchase_token: &str,
        start: &Timestamp,
    ) -> Result<Option<Payment>, DomainError> {
        let row: Option<PaymentRow> = sqlx::query_as(&format!(
            r#"
            SELECT {} FROM payments
            WHERE metadata->>'purchase_token' = $1 AND subscription_start >= $2
            ORDER BY subscription_end DESC, created_at DESC
            LIMIT 1
            "#,
            COLUMNS
        ))
        .bind(purchase_token)
        .bind(start.as_datetime())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to find payment", e))?;

        row.map(Payment::try_from).transpose()
    }
}

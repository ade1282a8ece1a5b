//! PostgreSQL implementation of the developer and voided-purchase logs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::domain::foundation::{
    DeveloperNotificationId, DomainError, ErrorCode, Timestamp, VoidedPurchaseNotificationId,
};
use crate::domain::purchase::{
    DeveloperNotification, NewDeveloperNotification, NewVoidedPurchaseNotification,
    NotificationStatus, ProductType, RefundType, VoidedPurchaseNotification,
};
use crate::ports::{DeveloperNotificationRepository, VoidedPurchaseRepository};

use super::db_error;

/// Both notification logs; they share the pool and the append-only shape.
pub struct PostgresNotificationLog {
    pool: PgPool,
}

impl PostgresNotificationLog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct DeveloperNotificationRow {
    id: i64,
    purchase_token: String,
    package_name: String,
    product_id: String,
    event_time: DateTime<Utc>,
    notification_type: i32,
    status: String,
    subscription_snapshot: Option<serde_json::Value>,
    created_at: DateTime<Utc>,
    modified_at: DateTime<Utc>,
}

impl TryFrom<DeveloperNotificationRow> for DeveloperNotification {
    type Error = DomainError;

    fn try_from(row: DeveloperNotificationRow) -> Result<Self, Self::Error> {
        let status = NotificationStatus::parse(&row.status).ok_or_else(|| {
            DomainError::new(
                ErrorCode::DatabaseError,
                format!("Invalid notification status: {}", row.status),
            )
        })?;

        Ok(DeveloperNotification {
            id: DeveloperNotificationId::new(row.id),
            purchase_token: row.purchase_token,
            package_name: row.package_name,
            product_id: row.product_id,
            event_time: Timestamp::from_datetime(row.event_time),
            notification_type: row.notification_type,
            status,
            subscription_snapshot: row.subscription_snapshot,
            created_at: Timestamp::from_datetime(row.created_at),
            modified_at: Timestamp::from_datetime(row.modified_at),
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct VoidedPurchaseRow {
    id: i64,
    purchase_token: String,
    order_id: String,
    product_type: i32,
    refund_type: i32,
    event_time: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl From<VoidedPurchaseRow> for VoidedPurchaseNotification {
    fn from(row: VoidedPurchaseRow) -> Self {
        VoidedPurchaseNotification {
            id: VoidedPurchaseNotificationId::new(row.id),
            purchase_token: row.purchase_token,
            order_id: row.order_id,
            product_type: ProductType::from_code(row.product_type),
            refund_type: RefundType::from_code(row.refund_type),
            event_time: Timestamp::from_datetime(row.event_time),
            created_at: Timestamp::from_datetime(row.created_at),
        }
    }
}

const DEVELOPER_COLUMNS: &str = "id, purchase_token, package_name, product_id, event_time, \
     notification_type, status, subscription_snapshot, created_at, modified_at";

#[async_trait]
impl DeveloperNotificationRepository for PostgresNotificationLog {
    async fn append(
        &self,
        notification: NewDeveloperNotification,
    ) -> Result<DeveloperNotification, DomainError> {
        let row: DeveloperNotificationRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO developer_notifications (
                purchase_token, package_name, product_id, event_time, notification_type, status
            ) VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {}
            "#,
            DEVELOPER_COLUMNS
        ))
        .bind(&notification.purchase_token)
        .bind(&notification.package_name)
        .bind(&notification.product_id)
        .bind(notification.event_time.as_datetime())
        .bind(notification.notification_type)
        .bind(NotificationStatus::New.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("Failed to append developer notification", e))?;

        row.try_into()
    }

    async fn find_by_id(
        &self,
        id: DeveloperNotificationId,
    ) -> Result<Option<DeveloperNotification>, DomainError> {
        let row: Option<DeveloperNotificationRow> = sqlx::query_as(&format!(
            "SELECT {} FROM developer_notifications WHERE id = $1",
            DEVELOPER_COLUMNS
        ))
        .bind(id.value())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to find developer notification", e))?;

        row.map(DeveloperNotification::try_from).transpose()
    }

    async fn update(&self, notification: &DeveloperNotification) -> Result<(), DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE developer_notifications SET
                status = $2,
                subscription_snapshot = $3,
                modified_at = $4
            WHERE id = $1
            "#,
        )
        .bind(notification.id.value())
        .bind(notification.status.as_str())
        .bind(&notification.subscription_snapshot)
        .bind(notification.modified_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to update developer notification", e))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::new(
                ErrorCode::NotificationNotFound,
                "Developer notification not found",
            )
            .with_detail("developer_notification_id", notification.id.to_string()));
        }

        Ok(())
    }

    async fn find_latest_for_token(
        &self,
        purchase_token: &str,
    ) -> Result<Option<DeveloperNotification>, DomainError> {
        let row: Option<DeveloperNotificationRow> = sqlx::query_as(&format!(
            r#"
            SELECT {} FROM developer_notifications
            WHERE purchase_token = $1
            ORDER BY id DESC
            LIMIT 1
            "#,
            DEVELOPER_COLUMNS
        ))
        .bind(purchase_token)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to find latest developer notification", e))?;

        row.map(DeveloperNotification::try_from).transpose()
    }
}

#[async_trait]
impl VoidedPurchaseRepository for PostgresNotificationLog {
    async fn append(
        &self,
        notification: NewVoidedPurchaseNotification,
    ) -> Result<VoidedPurchaseNotification, DomainError> {
        let row: VoidedPurchaseRow = sqlx::query_as(
            r#"
            INSERT INTO voided_purchase_notifications (
                purchase_token, order_id, product_type, refund_type, event_time
            ) VALUES ($1, $2, $3, $4, $5)
            RETURNING id, purchase_token, order_id, product_type, refund_type, event_time, created_at
            "#,
        )
        .bind(&notification.purchase_token)
        .bind(&notification.order_id)
        .bind(notification.product_type.code())
        .bind(notification.refund_type.code())
        .bind(notification.event_time.as_datetime())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("Failed to append voided purchase notification", e))?;

        Ok(row.into())
    }

    async fn find_by_id(
        &self,
        id: VoidedPurchaseNotificationId,
    ) -> Result<Option<VoidedPurchaseNotification>, DomainError> {
        let row: Option<VoidedPurchaseRow> = sqlx::query_as(
            r#"
            SELECT id, purchase_token, order_id, product_type, refund_type, event_time, created_at
            FROM voided_purchase_notifications
            WHERE id = $1
            "#,
        )
        .bind(id.value())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to find voided purchase notification", e))?;

        Ok(row.map(VoidedPurchaseNotification::from))
    }
}

//! IngestNotificationHandler - Logs received events and queues their processing.
//!
//! Append and publish are two explicit steps. A crash between them leaves a
//! `new` notification without a job; an operator can re-queue it by id.

use chrono::{Duration, Utc};
use std::sync::Arc;

use crate::domain::foundation::{
    DeveloperNotificationId, DomainError, Timestamp, ValidationError,
    VoidedPurchaseNotificationId,
};
use crate::domain::purchase::{
    redact, NewDeveloperNotification, NewVoidedPurchaseNotification, ProductType, RefundType,
};
use crate::ports::{
    DeveloperNotificationRepository, JobMessage, OutboxWriter, PurchaseTokenRepository,
    VoidedPurchaseRepository,
};

/// A decoded and authenticated subscription notification.
#[derive(Debug, Clone)]
pub struct ReceivedNotification {
    pub package_name: String,
    pub product_id: String,
    pub purchase_token: String,
    /// Provider event time in epoch milliseconds.
    pub event_time_millis: i64,
    pub notification_type: i32,
}

/// A decoded and authenticated void/refund event.
#[derive(Debug, Clone)]
pub struct ReceivedVoidedPurchase {
    pub purchase_token: String,
    pub order_id: String,
    pub product_type: i32,
    pub refund_type: i32,
    pub event_time_millis: i64,
}

#[derive(Debug, Clone)]
pub struct IngestResult<Id> {
    pub notification_id: Id,
    pub job_id: uuid::Uuid,
}

pub struct IngestNotificationHandler {
    purchase_tokens: Arc<dyn PurchaseTokenRepository>,
    notifications: Arc<dyn DeveloperNotificationRepository>,
    voided: Arc<dyn VoidedPurchaseRepository>,
    outbox: Arc<dyn OutboxWriter>,
    /// Head start given to the synchronous verification path.
    ingest_delay: Duration,
}

impl IngestNotificationHandler {
    pub fn new(
        purchase_tokens: Arc<dyn PurchaseTokenRepository>,
        notifications: Arc<dyn DeveloperNotificationRepository>,
        voided: Arc<dyn VoidedPurchaseRepository>,
        outbox: Arc<dyn OutboxWriter>,
        ingest_delay: Duration,
    ) -> Self {
        Self {
            purchase_tokens,
            notifications,
            voided,
            outbox,
            ingest_delay,
        }
    }

    pub async fn ingest(
        &self,
        received: ReceivedNotification,
    ) -> Result<IngestResult<DeveloperNotificationId>, DomainError> {
        require("purchase_token", &received.purchase_token)?;
        require("package_name", &received.package_name)?;
        require("product_id", &received.product_id)?;
        let event_time = event_time(received.event_time_millis)?;

        self.purchase_tokens
            .upsert(
                &received.purchase_token,
                &received.package_name,
                &received.product_id,
            )
            .await?;

        let notification = self
            .notifications
            .append(NewDeveloperNotification {
                purchase_token: received.purchase_token,
                package_name: received.package_name,
                product_id: received.product_id,
                event_time,
                notification_type: received.notification_type,
            })
            .await?;

        let job = self
            .outbox
            .write(
                &JobMessage::DeveloperNotification {
                    developer_notification_id: notification.id,
                },
                Utc::now() + self.ingest_delay,
            )
            .await?;

        tracing::info!(
            notification_id = %notification.id,
            purchase_token = redact(&notification.purchase_token),
            notification_type = notification.notification_type,
            available_at = %job.available_at,
            "Ingested developer notification"
        );

        Ok(IngestResult {
            notification_id: notification.id,
            job_id: job.id,
        })
    }

    pub async fn ingest_voided(
        &self,
        received: ReceivedVoidedPurchase,
    ) -> Result<IngestResult<VoidedPurchaseNotificationId>, DomainError> {
        require("purchase_token", &received.purchase_token)?;
        require("order_id", &received.order_id)?;
        let event_time = event_time(received.event_time_millis)?;

        let notification = self
            .voided
            .append(NewVoidedPurchaseNotification {
                purchase_token: received.purchase_token,
                order_id: received.order_id,
                product_type: ProductType::from_code(received.product_type),
                refund_type: RefundType::from_code(received.refund_type),
                event_time,
            })
            .await?;

        let job = self
            .outbox
            .write(
                &JobMessage::VoidedPurchase {
                    voided_purchase_notification_id: notification.id,
                },
                Utc::now(),
            )
            .await?;

        tracing::info!(
            voided_notification_id = %notification.id,
            purchase_token = redact(&notification.purchase_token),
            order_id = %notification.order_id,
            "Ingested voided purchase"
        );

        Ok(IngestResult {
            notification_id: notification.id,
            job_id: job.id,
        })
    }
}

fn require(field: &str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::empty_field(field));
    }
    Ok(())
}

fn event_time(millis: i64) -> Result<Timestamp, ValidationError> {
    Timestamp::from_millis(millis)
        .ok_or_else(|| ValidationError::invalid_format("event_time", "out of range"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{InMemoryNotificationLog, InMemoryOutbox, InMemoryPurchaseTokens};
    use crate::domain::foundation::ErrorCode;
    use crate::domain::purchase::NotificationStatus;

    struct Fixture {
        tokens: Arc<InMemoryPurchaseTokens>,
        log: Arc<InMemoryNotificationLog>,
        outbox: Arc<InMemoryOutbox>,
        handler: IngestNotificationHandler,
    }

    fn fixture(delay_secs: i64) -> Fixture {
        let tokens = Arc::new(InMemoryPurchaseTokens::new());
        let log = Arc::new(InMemoryNotificationLog::new());
        let outbox = Arc::new(InMemoryOutbox::new());
        let handler = IngestNotificationHandler::new(
            tokens.clone(),
            log.clone(),
            log.clone(),
            outbox.clone(),
            Duration::seconds(delay_secs),
        );
        Fixture {
            tokens,
            log,
            outbox,
            handler,
        }
    }

    fn received(kind: i32) -> ReceivedNotification {
        ReceivedNotification {
            package_name: "com.example.app".to_string(),
            product_id: "monthly".to_string(),
            purchase_token: "token-abcdefghijklmnop".to_string(),
            event_time_millis: 1_903_548_057_000,
            notification_type: kind,
        }
    }

    #[tokio::test]
    async fn ingest_logs_new_notification_and_delays_job() {
        let f = fixture(30);

        let result = f.handler.ingest(received(4)).await.unwrap();

        let logged = f.log.developer_notifications().await;
        assert_eq!(logged.len(), 1);
        assert_eq!(logged[0].status, NotificationStatus::New);
        assert_eq!(f.tokens.count().await, 1);

        let entries = f.outbox.entries().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, result.job_id);
        assert!(!entries[0].is_due(Utc::now()));
        assert_eq!(
            entries[0].message,
            JobMessage::DeveloperNotification {
                developer_notification_id: result.notification_id
            }
        );
    }

    #[tokio::test]
    async fn unknown_types_are_still_logged() {
        let f = fixture(0);
        f.handler.ingest(received(99)).await.unwrap();
        assert_eq!(f.log.developer_notifications().await[0].notification_type, 99);
    }

    #[tokio::test]
    async fn duplicate_events_get_separate_rows() {
        let f = fixture(0);
        f.handler.ingest(received(4)).await.unwrap();
        f.handler.ingest(received(4)).await.unwrap();

        assert_eq!(f.log.developer_notifications().await.len(), 2);
        assert_eq!(f.tokens.count().await, 1);
    }

    #[tokio::test]
    async fn missing_token_is_rejected() {
        let f = fixture(0);
        let mut bad = received(4);
        bad.purchase_token = " ".to_string();

        let err = f.handler.ingest(bad).await.unwrap_err();

        assert_eq!(err.code, ErrorCode::ValidationFailed);
        assert!(f.outbox.entries().await.is_empty());
    }

    #[tokio::test]
    async fn voided_purchase_is_queued_without_delay() {
        let f = fixture(300);

        f.handler
            .ingest_voided(ReceivedVoidedPurchase {
                purchase_token: "tok".to_string(),
                order_id: "GPA.1".to_string(),
                product_type: 1,
                refund_type: 1,
                event_time_millis: 1_903_548_057_000,
            })
            .await
            .unwrap();

        let voided = f.log.voided_notifications().await;
        assert_eq!(voided.len(), 1);
        assert_eq!(voided[0].refund_type, RefundType::FullRefund);
        assert!(f.outbox.entries().await[0].is_due(Utc::now()));
    }
}

//! JobRouter - Routes outbox jobs to their handlers.

use async_trait::async_trait;
use std::sync::Arc;

use crate::ports::{JobHandler, JobMessage, Outcome};

use super::reconciliation::ReconciliationHandler;
use super::voided_purchase::VoidedPurchaseHandler;

pub struct JobRouter {
    notifications: Arc<ReconciliationHandler>,
    voided: Arc<VoidedPurchaseHandler>,
}

impl JobRouter {
    pub fn new(notifications: Arc<ReconciliationHandler>, voided: Arc<VoidedPurchaseHandler>) -> Self {
        Self {
            notifications,
            voided,
        }
    }
}

#[async_trait]
impl JobHandler for JobRouter {
    async fn handle(&self, message: &JobMessage) -> Outcome {
        tracing::debug!(job = message.kind(), "Routing job");
        match message {
            JobMessage::DeveloperNotification {
                developer_notification_id,
            } => self.notifications.handle(*developer_notification_id).await,
            JobMessage::VoidedPurchase {
                voided_purchase_notification_id,
            } => self.voided.handle(*voided_purchase_notification_id).await,
        }
    }
}

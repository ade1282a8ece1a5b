//! OutboxWriter port - Durable job queue for reconciliation work.
//!
//! Ingestion appends a notification to its log and then writes a job here,
//! as two explicit steps. The `JobDispatcher` polls due entries and hands
//! them to a `JobHandler`.
//!
//! ## Delivery
//!
//! 1. Ingestion writes a pending entry, optionally delayed via `available_at`
//! 2. The dispatcher reads entries whose `available_at` has passed
//! 3. Finished jobs are marked published; retryable failures are rescheduled
//! 4. Jobs out of attempts are marked failed and never delivered again

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::foundation::{
    DeveloperNotificationId, DomainError, VoidedPurchaseNotificationId,
};

/// Queue message contract consumed by the reconciliation handlers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "job", rename_all = "snake_case")]
pub enum JobMessage {
    DeveloperNotification {
        developer_notification_id: DeveloperNotificationId,
    },
    VoidedPurchase {
        voided_purchase_notification_id: VoidedPurchaseNotificationId,
    },
}

impl JobMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            JobMessage::DeveloperNotification { .. } => "developer_notification",
            JobMessage::VoidedPurchase { .. } => "voided_purchase",
        }
    }
}

/// Status of an outbox entry in the delivery pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboxStatus {
    /// Waiting for delivery (first attempt or rescheduled retry)
    Pending,
    /// Handled; no further delivery
    Published,
    /// Out of attempts; dead-lettered
    Failed,
}

impl OutboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxStatus::Pending => "pending",
            OutboxStatus::Published => "published",
            OutboxStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(OutboxStatus::Pending),
            "published" => Some(OutboxStatus::Published),
            "failed" => Some(OutboxStatus::Failed),
            _ => None,
        }
    }
}

/// An entry in the job outbox table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxEntry {
    pub id: Uuid,

    pub message: JobMessage,

    pub status: OutboxStatus,

    pub created_at: DateTime<Utc>,

    /// Earliest time the job may be delivered
    pub available_at: DateTime<Utc>,

    /// When the job was last handled (published, rescheduled or failed)
    pub processed_at: Option<DateTime<Utc>>,

    /// Number of delivery attempts
    pub attempts: u32,

    pub last_error: Option<String>,
}

impl OutboxEntry {
    /// Create a new pending entry, deliverable from `available_at`.
    pub fn new(message: JobMessage, available_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            message,
            status: OutboxStatus::Pending,
            created_at: Utc::now(),
            available_at,
            processed_at: None,
            attempts: 0,
            last_error: None,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == OutboxStatus::Pending && self.available_at <= now
    }

    /// Mark the job as handled.
    pub fn mark_published(&mut self) {
        self.status = OutboxStatus::Published;
        self.processed_at = Some(Utc::now());
        self.attempts += 1;
    }

    /// Record a failed attempt and deliver again at `retry_at`.
    pub fn schedule_retry(&mut self, error: impl Into<String>, retry_at: DateTime<Utc>) {
        self.status = OutboxStatus::Pending;
        self.processed_at = Some(Utc::now());
        self.available_at = retry_at;
        self.attempts += 1;
        self.last_error = Some(error.into());
    }

    /// Dead-letter the job.
    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = OutboxStatus::Failed;
        self.processed_at = Some(Utc::now());
        self.attempts += 1;
        self.last_error = Some(error.into());
    }
}

/// Port for the job outbox.
#[async_trait]
pub trait OutboxWriter: Send + Sync {
    /// Write a job, deliverable from `available_at`.
    async fn write(
        &self,
        message: &JobMessage,
        available_at: DateTime<Utc>,
    ) -> Result<OutboxEntry, DomainError>;

    /// Pending jobs whose `available_at` is at or before `now`, oldest first.
    async fn get_due(&self, now: DateTime<Utc>, limit: u32)
        -> Result<Vec<OutboxEntry>, DomainError>;

    async fn mark_published(&self, id: Uuid) -> Result<(), DomainError>;

    /// Record a failed attempt and make the job due again at `retry_at`.
    async fn schedule_retry(
        &self,
        id: Uuid,
        error: &str,
        retry_at: DateTime<Utc>,
    ) -> Result<(), DomainError>;

    /// Dead-letter the job.
    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<(), DomainError>;

    /// Deletes jobs published more than `older_than_hours` ago.
    async fn cleanup_old(&self, older_than_hours: u32) -> Result<u64, DomainError>;
}

//! In-memory job outbox.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::foundation::{DomainError, ErrorCode};
use crate::ports::{JobMessage, OutboxEntry, OutboxStatus, OutboxWriter};

#[derive(Default)]
pub struct InMemoryOutbox {
    entries: RwLock<Vec<OutboxEntry>>,
}

impl InMemoryOutbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn entries(&self) -> Vec<OutboxEntry> {
        self.entries.read().await.clone()
    }

    pub async fn count_with_status(&self, status: OutboxStatus) -> usize {
        self.entries
            .read()
            .await
            .iter()
            .filter(|e| e.status == status)
            .count()
    }

    async fn modify(
        &self,
        id: Uuid,
        apply: impl FnOnce(&mut OutboxEntry) + Send,
    ) -> Result<(), DomainError> {
        let mut entries = self.entries.write().await;
        match entries.iter_mut().find(|e| e.id == id) {
            Some(entry) => {
                apply(entry);
                Ok(())
            }
            None => Err(DomainError::new(ErrorCode::InternalError, "Outbox entry not found")
                .with_detail("outbox_id", id.to_string())),
        }
    }
}

#[async_trait]
impl OutboxWriter for InMemoryOutbox {
    async fn write(
        &self,
        message: &JobMessage,
        available_at: DateTime<Utc>,
    ) -> Result<OutboxEntry, DomainError> {
        let entry = OutboxEntry::new(message.clone(), available_at);
        self.entries.write().await.push(entry.clone());
        Ok(entry)
    }

    async fn get_due(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<OutboxEntry>, DomainError> {
        let entries = self.entries.read().await;
        let mut due: Vec<_> = entries.iter().filter(|e| e.is_due(now)).cloned().collect();
        due.sort_by_key(|e| (e.available_at, e.created_at));
        due.truncate(limit as usize);
        Ok(due)
    }

    async fn mark_published(&self, id: Uuid) -> Result<(), DomainError> {
        self.modify(id, |e| e.mark_published()).await
    }

    async fn schedule_retry(
        &self,
        id: Uuid,
        error: &str,
        retry_at: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        let error = error.to_string();
        self.modify(id, move |e| e.schedule_retry(error, retry_at)).await
    }

    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<(), DomainError> {
        let error = error.to_string();
        self.modify(id, move |e| e.mark_failed(error)).await
    }

    async fn cleanup_old(&self, older_than_hours: u32) -> Result<u64, DomainError> {
        let cutoff = Utc::now() - Duration::hours(older_than_hours as i64);
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|e| {
            !(e.status == OutboxStatus::Published
                && e.processed_at.map(|at| at < cutoff).unwrap_or(false))
        });
        Ok((before - entries.len()) as u64)
    }
}

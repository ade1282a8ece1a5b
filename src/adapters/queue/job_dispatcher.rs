//! JobDispatcher - Background service delivering outbox jobs to a handler.
//!
//! Second half of the transactional outbox: ingestion writes jobs, the
//! dispatcher polls the due ones and hands each to a `JobHandler`.
//!
//! ## Configuration
//!
//! | Setting | Default | Description |
//! |---------|---------|-------------|
//! | `poll_interval` | 500ms | How often to check for due jobs |
//! | `batch_size` | 50 | Max jobs handled per poll cycle |
//! | `retry_backoff` | 30s | Base delay before redelivering a failed job |
//! | `max_attempts` | 10 | Deliveries before a job is dead-lettered |
//! | `retention_hours` | 72 | Age after which published jobs are deleted |
//!
//! ## Graceful Shutdown
//!
//! The service listens for a shutdown signal and handles one final batch
//! before stopping.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time;

use crate::domain::foundation::DomainError;
use crate::ports::{JobHandler, OutboxEntry, OutboxWriter, Outcome};

const CLEANUP_INTERVAL: Duration = Duration::from_secs(3600);

/// Configuration for the JobDispatcher service.
#[derive(Debug, Clone)]
pub struct JobDispatcherConfig {
    pub poll_interval: Duration,

    pub batch_size: u32,

    /// Delay before the first redelivery; doubles with every attempt.
    pub retry_backoff: Duration,

    pub max_attempts: u32,

    /// Published jobs older than this are deleted hourly.
    pub retention_hours: u32,
}

impl Default for JobDispatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            batch_size: 50,
            retry_backoff: Duration::from_secs(30),
            max_attempts: 10,
            retention_hours: 72,
        }
    }
}

impl JobDispatcherConfig {
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_batch_size(mut self, size: u32) -> Self {
        self.batch_size = size;
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_retention_hours(mut self, hours: u32) -> Self {
        self.retention_hours = hours;
        self
    }

    /// Delay before the next delivery of a job that failed `attempts` times.
    pub fn backoff_for(&self, attempts: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempts.min(16));
        self.retry_backoff.saturating_mul(factor)
    }
}

/// Background service that delivers due jobs from the outbox.
pub struct JobDispatcher {
    outbox: Arc<dyn OutboxWriter>,
    handler: Arc<dyn JobHandler>,
    config: JobDispatcherConfig,
}

impl JobDispatcher {
    pub fn new(outbox: Arc<dyn OutboxWriter>, handler: Arc<dyn JobHandler>) -> Self {
        Self::with_config(outbox, handler, JobDispatcherConfig::default())
    }

    pub fn with_config(
        outbox: Arc<dyn OutboxWriter>,
        handler: Arc<dyn JobHandler>,
        config: JobDispatcherConfig,
    ) -> Self {
        Self {
            outbox,
            handler,
            config,
        }
    }

    /// Run the dispatch loop until the shutdown signal is received.
    ///
    /// Outbox errors are logged and the batch is retried on the next tick.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = time::interval(self.config.poll_interval);
        let mut cleanup = time::interval(CLEANUP_INTERVAL);
        tracing::info!(
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            batch_size = self.config.batch_size,
            "Job dispatcher started"
        );

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        self.tick().await;
                        tracing::info!("Job dispatcher stopped");
                        return;
                    }
                }

                _ = interval.tick() => {
                    self.tick().await;
                }

                _ = cleanup.tick() => {
                    self.cleanup().await;
                }
            }
        }
    }

    async fn tick(&self) {
        if let Err(e) = self.process_batch().await {
            tracing::warn!(error = %e, "Job batch failed, retrying next poll");
        }
    }

    /// Handles one batch of due jobs. Returns how many jobs finished.
    pub async fn process_batch(&self) -> Result<usize, DomainError> {
        let entries = self
            .outbox
            .get_due(Utc::now(), self.config.batch_size)
            .await?;
        let mut finished = 0;

        for entry in entries {
            let outcome = self.handler.handle(&entry.message).await;
            match outcome {
                Outcome::Processed => {
                    self.outbox.mark_published(entry.id).await?;
                    finished += 1;
                }
                Outcome::Terminal(reason) => {
                    tracing::warn!(
                        job_id = %entry.id,
                        job = entry.message.kind(),
                        reason = %reason,
                        "Job finished with terminal failure"
                    );
                    self.outbox.mark_published(entry.id).await?;
                    finished += 1;
                }
                Outcome::Retry(reason) => self.retry_later(&entry, &reason).await?,
            }
        }

        Ok(finished)
    }

    /// Deletes old published jobs. Failures are logged and retried next hour.
    pub async fn cleanup(&self) {
        match self.outbox.cleanup_old(self.config.retention_hours).await {
            Ok(0) => {}
            Ok(deleted) => tracing::info!(deleted, "Deleted old published jobs"),
            Err(e) => tracing::warn!(error = %e, "Outbox cleanup failed"),
        }
    }

    /// Run exactly one poll cycle (for testing).
    pub async fn poll_once(&self) -> Result<usize, DomainError> {
        self.process_batch().await
    }

    async fn retry_later(&self, entry: &OutboxEntry, reason: &str) -> Result<(), DomainError> {
        if entry.attempts + 1 >= self.config.max_attempts {
            tracing::error!(
                job_id = %entry.id,
                job = entry.message.kind(),
                attempts = entry.attempts + 1,
                reason = %reason,
                "Job exhausted its attempts, dead-lettering"
            );
            return self.outbox.mark_failed(entry.id, reason).await;
        }

        let backoff = self.config.backoff_for(entry.attempts);
        let retry_at = Utc::now()
            + chrono::Duration::from_std(backoff).unwrap_or_else(|_| chrono::Duration::hours(1));
        tracing::warn!(
            job_id = %entry.id,
            job = entry.message.kind(),
            attempts = entry.attempts + 1,
            retry_at = %retry_at,
            reason = %reason,
            "Job failed, scheduled for redelivery"
        );
        self.outbox.schedule_retry(entry.id, reason, retry_at).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryOutbox;
    use crate::domain::foundation::{DeveloperNotificationId, VoidedPurchaseNotificationId};
    use crate::ports::{JobMessage, OutboxStatus};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use uuid::Uuid;

    /// Handler returning a fixed outcome and counting deliveries.
    struct FixedHandler {
        outcome: Outcome,
        calls: AtomicUsize,
    }

    impl FixedHandler {
        fn new(outcome: Outcome) -> Self {
            Self {
                outcome,
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl JobHandler for FixedHandler {
        async fn handle(&self, _message: &JobMessage) -> Outcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcome.clone()
        }
    }

    fn notification_job(id: i64) -> JobMessage {
        JobMessage::DeveloperNotification {
            developer_notification_id: DeveloperNotificationId::new(id),
        }
    }

    async fn enqueue(outbox: &InMemoryOutbox, message: JobMessage) {
        outbox.write(&message, Utc::now()).await.unwrap();
    }

    #[tokio::test]
    async fn poll_once_handles_due_jobs() {
        let outbox = Arc::new(InMemoryOutbox::new());
        let handler = Arc::new(FixedHandler::new(Outcome::Processed));
        enqueue(&outbox, notification_job(1)).await;
        enqueue(
            &outbox,
            JobMessage::VoidedPurchase {
                voided_purchase_notification_id: VoidedPurchaseNotificationId::new(1),
            },
        )
        .await;

        let dispatcher = JobDispatcher::new(outbox.clone(), handler.clone());
        let count = dispatcher.poll_once().await.unwrap();

        assert_eq!(count, 2);
        assert_eq!(handler.calls(), 2);
        assert_eq!(outbox.count_with_status(OutboxStatus::Published).await, 2);
    }

    #[tokio::test]
    async fn delayed_jobs_wait_until_available() {
        let outbox = Arc::new(InMemoryOutbox::new());
        let handler = Arc::new(FixedHandler::new(Outcome::Processed));
        outbox
            .write(&notification_job(1), Utc::now() + chrono::Duration::minutes(5))
            .await
            .unwrap();

        let dispatcher = JobDispatcher::new(outbox.clone(), handler.clone());

        assert_eq!(dispatcher.poll_once().await.unwrap(), 0);
        assert_eq!(handler.calls(), 0);
    }

    #[tokio::test]
    async fn poll_once_respects_batch_size() {
        let outbox = Arc::new(InMemoryOutbox::new());
        let handler = Arc::new(FixedHandler::new(Outcome::Processed));
        for i in 0..5 {
            enqueue(&outbox, notification_job(i)).await;
        }

        let config = JobDispatcherConfig::default().with_batch_size(2);
        let dispatcher = JobDispatcher::with_config(outbox.clone(), handler, config);

        assert_eq!(dispatcher.poll_once().await.unwrap(), 2);
        assert_eq!(dispatcher.poll_once().await.unwrap(), 2);
        assert_eq!(dispatcher.poll_once().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn terminal_outcome_is_not_redelivered() {
        let outbox = Arc::new(InMemoryOutbox::new());
        let handler = Arc::new(FixedHandler::new(Outcome::Terminal("duplicate".to_string())));
        enqueue(&outbox, notification_job(1)).await;

        let dispatcher = JobDispatcher::new(outbox.clone(), handler.clone());
        dispatcher.poll_once().await.unwrap();
        dispatcher.poll_once().await.unwrap();

        assert_eq!(handler.calls(), 1);
        assert_eq!(outbox.count_with_status(OutboxStatus::Published).await, 1);
    }

    #[tokio::test]
    async fn retry_outcome_backs_off() {
        let outbox = Arc::new(InMemoryOutbox::new());
        let handler = Arc::new(FixedHandler::new(Outcome::Retry("unavailable".to_string())));
        enqueue(&outbox, notification_job(1)).await;

        let dispatcher = JobDispatcher::new(outbox.clone(), handler.clone());
        let count = dispatcher.poll_once().await.unwrap();

        assert_eq!(count, 0);
        let entry = &outbox.entries().await[0];
        assert_eq!(entry.status, OutboxStatus::Pending);
        assert_eq!(entry.attempts, 1);
        assert_eq!(entry.last_error.as_deref(), Some("unavailable"));
        assert!(entry.available_at > Utc::now());

        dispatcher.poll_once().await.unwrap();
        assert_eq!(handler.calls(), 1);
    }

    #[tokio::test]
    async fn exhausted_job_is_dead_lettered() {
        let outbox = Arc::new(InMemoryOutbox::new());
        let handler = Arc::new(FixedHandler::new(Outcome::Retry("unavailable".to_string())));
        enqueue(&outbox, notification_job(1)).await;

        let config = JobDispatcherConfig::default()
            .with_retry_backoff(Duration::ZERO)
            .with_max_attempts(2);
        let dispatcher = JobDispatcher::with_config(outbox.clone(), handler.clone(), config);

        dispatcher.poll_once().await.unwrap();
        dispatcher.poll_once().await.unwrap();
        dispatcher.poll_once().await.unwrap();

        assert_eq!(handler.calls(), 2);
        assert_eq!(outbox.count_with_status(OutboxStatus::Failed).await, 1);
    }

    #[tokio::test]
    async fn run_stops_on_shutdown_signal() {
        let outbox = Arc::new(InMemoryOutbox::new());
        let handler = Arc::new(FixedHandler::new(Outcome::Processed));
        enqueue(&outbox, notification_job(1)).await;

        let config = JobDispatcherConfig::default().with_poll_interval(Duration::from_millis(10));
        let dispatcher = JobDispatcher::with_config(outbox.clone(), handler.clone(), config);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(async move { dispatcher.run(shutdown_rx).await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown_tx.send(true).unwrap();

        handle.await.unwrap();
        assert_eq!(handler.calls(), 1);
    }

    /// Outbox whose first `get_due` fails, like a dropped database connection.
    struct FlakyOutbox {
        inner: InMemoryOutbox,
        failed: AtomicBool,
    }

    #[async_trait]
    impl OutboxWriter for FlakyOutbox {
        async fn write(
            &self,
            message: &JobMessage,
            available_at: chrono::DateTime<Utc>,
        ) -> Result<OutboxEntry, DomainError> {
            self.inner.write(message, available_at).await
        }

        async fn get_due(
            &self,
            now: chrono::DateTime<Utc>,
            limit: u32,
        ) -> Result<Vec<OutboxEntry>, DomainError> {
            if !self.failed.swap(true, Ordering::SeqCst) {
                return Err(DomainError::database("connection reset"));
            }
            self.inner.get_due(now, limit).await
        }

        async fn mark_published(&self, id: Uuid) -> Result<(), DomainError> {
            self.inner.mark_published(id).await
        }

        async fn schedule_retry(
            &self,
            id: Uuid,
            error: &str,
            retry_at: chrono::DateTime<Utc>,
        ) -> Result<(), DomainError> {
            self.inner.schedule_retry(id, error, retry_at).await
        }

        async fn mark_failed(&self, id: Uuid, error: &str) -> Result<(), DomainError> {
            self.inner.mark_failed(id, error).await
        }

        async fn cleanup_old(&self, older_than_hours: u32) -> Result<u64, DomainError> {
            self.inner.cleanup_old(older_than_hours).await
        }
    }

    #[tokio::test]
    async fn run_survives_outbox_errors() {
        let outbox = Arc::new(FlakyOutbox {
            inner: InMemoryOutbox::new(),
            failed: AtomicBool::new(false),
        });
        let handler = Arc::new(FixedHandler::new(Outcome::Processed));
        enqueue(&outbox.inner, notification_job(1)).await;

        let config = JobDispatcherConfig::default().with_poll_interval(Duration::from_millis(10));
        let dispatcher = JobDispatcher::with_config(outbox.clone(), handler.clone(), config);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(async move { dispatcher.run(shutdown_rx).await });

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!handle.is_finished());
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();

        assert_eq!(handler.calls(), 1);
        assert_eq!(outbox.inner.count_with_status(OutboxStatus::Published).await, 1);
    }

    #[tokio::test]
    async fn cleanup_deletes_published_jobs_past_retention() {
        let outbox = Arc::new(InMemoryOutbox::new());
        let handler = Arc::new(FixedHandler::new(Outcome::Processed));
        enqueue(&outbox, notification_job(1)).await;

        let config = JobDispatcherConfig::default().with_retention_hours(0);
        let dispatcher = JobDispatcher::with_config(outbox.clone(), handler, config);
        dispatcher.poll_once().await.unwrap();
        dispatcher.cleanup().await;

        assert!(outbox.entries().await.is_empty());
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        let config = JobDispatcherConfig::default().with_retry_backoff(Duration::from_secs(10));

        assert_eq!(config.backoff_for(0), Duration::from_secs(10));
        assert_eq!(config.backoff_for(1), Duration::from_secs(20));
        assert_eq!(config.backoff_for(3), Duration::from_secs(80));
    }
}

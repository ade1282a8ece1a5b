//! Job handler port.

use async_trait::async_trait;

use super::JobMessage;

/// Result of handling one job, as seen by the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Work done, or nothing left to do.
    Processed,
    /// Transient failure; deliver again after backoff.
    Retry(String),
    /// Permanent failure, already recorded; never deliver again.
    Terminal(String),
}

impl Outcome {
    pub fn is_processed(&self) -> bool {
        matches!(self, Outcome::Processed)
    }
}

/// Consumer of outbox jobs.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, message: &JobMessage) -> Outcome;
}

//! Reconciliation error types.
//!
//! Every failure is classified as retryable (the queue redelivers it later),
//! terminal (waiting cannot make the event valid), or an invariant conflict
//! that needs an operator.

use thiserror::Error;

use crate::domain::foundation::DomainError;

use super::NotificationStatus;

/// Reason a notification can never be processed successfully.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TerminalReason {
    #[error("Notification {0} not found")]
    NotificationNotFound(String),

    #[error("Unknown notification type {0}")]
    UnknownNotificationType(i32),

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Purchase not found at billing provider")]
    PurchaseNotFound,

    #[error("Duplicate notification for order {0}")]
    DuplicateNotification(String),

    #[error("Stale notification: {0}")]
    StaleNotification(String),

    #[error("Payment not confirmed by billing provider")]
    PaymentNotConfirmed,

    #[error("No payment to cancel or restart")]
    NothingToCancel,

    #[error("No prior purchase for grace period")]
    NoPriorPurchase,

    #[error("A later subscription already exists")]
    LaterSubscriptionExists,

    #[error("Payment not found for voided purchase")]
    PaymentNotFound,
}

/// Errors produced while reconciling a purchase token against the ledger.
#[derive(Debug, Error)]
pub enum ReconciliationError {
    /// Recorded on the notification and never retried.
    #[error("Do not retry: {0}")]
    DoNotRetry(TerminalReason),

    /// Transient failure; the queue redelivers per its backoff policy.
    #[error("Retryable: {0}")]
    Retryable(String),

    /// Ledger invariant violated; left for an operator.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Repository error: {0}")]
    Repository(#[from] DomainError),
}

impl ReconciliationError {
    pub fn do_not_retry(reason: TerminalReason) -> Self {
        ReconciliationError::DoNotRetry(reason)
    }

    pub fn retryable(reason: impl Into<String>) -> Self {
        ReconciliationError::Retryable(reason.into())
    }

    pub fn conflict(reason: impl Into<String>) -> Self {
        ReconciliationError::Conflict(reason.into())
    }

    /// Returns true if redelivering the same message may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ReconciliationError::Retryable(_) | ReconciliationError::Repository(_)
        )
    }

    /// Status to record on the developer notification, if any.
    ///
    /// Retryable failures leave the notification untouched.
    pub fn notification_status(&self) -> Option<NotificationStatus> {
        match self {
            ReconciliationError::DoNotRetry(TerminalReason::UnknownNotificationType(_))
            | ReconciliationError::Conflict(_) => Some(NotificationStatus::Error),
            ReconciliationError::DoNotRetry(_) => Some(NotificationStatus::DoNotRetry),
            ReconciliationError::Retryable(_) | ReconciliationError::Repository(_) => None,
        }
    }
}

//! Recurring charge gateway port.
//!
//! Contract exposed to the host's recurring-billing scheduler. The provider
//! renews subscriptions on its own; a "charge" only confirms that the
//! renewal became visible.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::foundation::{SubscriptionId, Timestamp};
use crate::domain::ledger::Payment;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChargeError {
    /// Try again later; the renewal may not be visible yet.
    #[error("Charge should be retried: {0}")]
    Retry(String),

    /// Stop charging this token.
    #[error("Charge should stop: {0}")]
    Stop(String),

    #[error("Operation not supported")]
    Unsupported,
}

/// A confirmed renewal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChargeConfirmation {
    /// The charged payment with its new window and metadata.
    pub payment: Payment,
    pub subscription_id: SubscriptionId,
}

#[async_trait]
pub trait RecurringChargeGateway: Send + Sync {
    /// Confirms the renewal covered by `payment` for `charge_token`.
    async fn charge(
        &self,
        payment: &Payment,
        charge_token: &str,
    ) -> Result<ChargeConfirmation, ChargeError>;

    /// True while the provider still renews this token.
    async fn check_valid(&self, charge_token: &str) -> Result<bool, ChargeError>;

    async fn get_subscription_expiration(&self, charge_token: &str)
        -> Result<Timestamp, ChargeError>;

    /// Tokens never expire on their own.
    async fn check_expire(&self, _charge_token: &str) -> Result<bool, ChargeError> {
        Err(ChargeError::Unsupported)
    }
}

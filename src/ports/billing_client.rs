//! Billing verification client port.
//!
//! Fetches the authoritative subscription state from the billing provider
//! and acknowledges fulfilled purchases.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::purchase::ExternalSubscriptionState;

/// Errors from the billing provider.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BillingError {
    /// The provider does not know this purchase token.
    #[error("Purchase not found: {0}")]
    NotFound(String),

    /// A concurrent acknowledgement won the race.
    #[error("Purchase already acknowledged")]
    AlreadyAcknowledged,

    #[error("Billing provider unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid billing response: {0}")]
    InvalidResponse(String),
}

impl BillingError {
    /// Returns true if the same request may succeed later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BillingError::Unavailable(_) | BillingError::InvalidResponse(_)
        )
    }
}

/// Key of a subscription purchase at the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionRef {
    pub package_name: String,
    pub product_id: String,
    pub purchase_token: String,
}

impl SubscriptionRef {
    pub fn new(
        package_name: impl Into<String>,
        product_id: impl Into<String>,
        purchase_token: impl Into<String>,
    ) -> Self {
        Self {
            package_name: package_name.into(),
            product_id: product_id.into(),
            purchase_token: purchase_token.into(),
        }
    }
}

/// Port for the billing provider's verification API.
///
/// Implementations are constructed once and shared; they must not keep
/// per-notification state.
#[async_trait]
pub trait BillingVerificationClient: Send + Sync {
    async fn get_subscription(
        &self,
        subscription: &SubscriptionRef,
    ) -> Result<ExternalSubscriptionState, BillingError>;

    /// # Errors
    ///
    /// - `AlreadyAcknowledged` if another caller acknowledged first
    async fn acknowledge(&self, subscription: &SubscriptionRef) -> Result<(), BillingError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_failures_are_retryable() {
        assert!(BillingError::Unavailable("503".to_string()).is_retryable());
        assert!(BillingError::InvalidResponse("bad json".to_string()).is_retryable());
    }

    #[test]
    fn unknown_purchase_is_not_retryable() {
        assert!(!BillingError::NotFound("tok".to_string()).is_retryable());
        assert!(!BillingError::AlreadyAcknowledged.is_retryable());
    }
}

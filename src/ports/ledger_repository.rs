//! Ledger repository ports.
//!
//! Payments, subscriptions, recurring-charge histories and users live in the
//! host's ledger. These ports expose the lookups reconciliation needs; the
//! purchase token and order id stored in metadata are the idempotency key.
//!
//! # Example
//!
//! ```ignore
//! async fn already_recorded(
//!     payments: &dyn PaymentRepository,
//!     order_id: &OrderId,
//! ) -> Result<bool, DomainError> {
//!     Ok(payments.find_by_order_id(order_id).await?.is_some())
//! }
//! ```

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, PaymentId, SubscriptionId, Timestamp, UserId};
use crate::domain::ledger::{Payment, RecurringCharge, RecurringChargeState, Subscription, User};
use crate::domain::purchase::OrderId;

/// Repository port for ledger payments.
#[async_trait]
pub trait PaymentRepository: Send + Sync {
    async fn create(&self, payment: &Payment) -> Result<(), DomainError>;

    /// # Errors
    ///
    /// - `PaymentNotFound` if the payment doesn't exist
    /// - `DatabaseError` on persistence failure
    async fn update(&self, payment: &Payment) -> Result<(), DomainError>;

    async fn find_by_id(&self, id: &PaymentId) -> Result<Option<Payment>, DomainError>;

    /// Payment whose `order_id` metadata equals `order_id` exactly.
    async fn find_by_order_id(&self, order_id: &OrderId) -> Result<Option<Payment>, DomainError>;

    /// Payments tagged with the purchase token, latest subscription end first.
    async fn list_by_purchase_token(&self, purchase_token: &str)
        -> Result<Vec<Payment>, DomainError>;

    /// Payment with the latest subscription end for the token.
    async fn latest_by_purchase_token(
        &self,
        purchase_token: &str,
    ) -> Result<Option<Payment>, DomainError> {
        Ok(self
            .list_by_purchase_token(purchase_token)
            .await?
            .into_iter()
            .next())
    }

    /// Latest-ending payment for the token whose subscription starts at or after `start`.
    async fn latest_by_purchase_token_starting_from(
        &self,
        purchase_token: &str,
        start: &Timestamp,
    ) -> Result<Option<Payment>, DomainError> {
        Ok(self
            .list_by_purchase_token(purchase_token)
            .await?
            .into_iter()
            .find(|p| !p.subscription_start.is_before(start)))
    }
}

/// Repository port for ledger subscriptions.
#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    async fn create(&self, subscription: &Subscription) -> Result<(), DomainError>;

    /// # Errors
    ///
    /// - `SubscriptionNotFound` if the subscription doesn't exist
    /// - `DatabaseError` on persistence failure
    async fn update(&self, subscription: &Subscription) -> Result<(), DomainError>;

    async fn find_by_id(&self, id: &SubscriptionId) -> Result<Option<Subscription>, DomainError>;

    /// Removes a subscription whose payment could not be stored.
    ///
    /// Deleting an unknown id is not an error.
    async fn delete(&self, id: &SubscriptionId) -> Result<(), DomainError>;

    /// Subscription carrying `order_id` in its own metadata (trial or grace period).
    async fn find_by_order_id(
        &self,
        order_id: &OrderId,
    ) -> Result<Option<Subscription>, DomainError>;

    /// Latest-ending subscription reachable from the purchase token, either
    /// through its own metadata or through its payment's metadata.
    async fn latest_for_purchase_token(
        &self,
        purchase_token: &str,
    ) -> Result<Option<Subscription>, DomainError>;
}

/// Repository port for recurring-charge histories.
///
/// Histories are append-only per charge token; entries only change state.
#[async_trait]
pub trait RecurringChargeRepository: Send + Sync {
    async fn create(&self, charge: &RecurringCharge) -> Result<(), DomainError>;

    async fn update(&self, charge: &RecurringCharge) -> Result<(), DomainError>;

    /// Full history for the charge token, newest first.
    async fn history(&self, charge_token: &str) -> Result<Vec<RecurringCharge>, DomainError>;

    /// Head of the history.
    async fn latest(&self, charge_token: &str) -> Result<Option<RecurringCharge>, DomainError> {
        Ok(self.history(charge_token).await?.into_iter().next())
    }

    /// Newest entry currently in `state`.
    async fn latest_in_state(
        &self,
        charge_token: &str,
        state: RecurringChargeState,
    ) -> Result<Option<RecurringCharge>, DomainError> {
        Ok(self
            .history(charge_token)
            .await?
            .into_iter()
            .find(|c| c.state == state))
    }
}

/// Repository port for ledger users.
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(&self, user: &User) -> Result<(), DomainError>;

    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, DomainError>;

    async fn find_by_external_account_id(
        &self,
        external_account_id: &str,
    ) -> Result<Option<User>, DomainError>;

    /// All users whose metadata holds `key = value`.
    async fn find_by_metadata(&self, key: &str, value: &str) -> Result<Vec<User>, DomainError>;
}

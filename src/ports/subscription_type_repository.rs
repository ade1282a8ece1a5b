//! Subscription type mapping port.

use async_trait::async_trait;

use crate::domain::foundation::DomainError;
use crate::domain::purchase::SubscriptionTypeMapping;

/// Read port for product id to subscription type mappings.
#[async_trait]
pub trait SubscriptionTypeRepository: Send + Sync {
    /// Returns `None` if the product id has no mapping.
    async fn find_by_product_id(
        &self,
        product_id: &str,
    ) -> Result<Option<SubscriptionTypeMapping>, DomainError>;
}

//! Purchase token store port.
//!
//! The purchase token is the identity anchor shared by every entry point.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, Timestamp};
use crate::domain::purchase::PurchaseToken;

/// Repository port for purchase token persistence.
#[async_trait]
pub trait PurchaseTokenRepository: Send + Sync {
    /// Inserts the token or refreshes its package/product association.
    ///
    /// Returns the stored record, keeping the original `created_at`.
    async fn upsert(
        &self,
        token: &str,
        package_name: &str,
        product_id: &str,
    ) -> Result<PurchaseToken, DomainError>;

    /// Find a token record. Returns `None` if the token was never seen.
    async fn find(&self, token: &str) -> Result<Option<PurchaseToken>, DomainError>;

    /// All tokens last updated at or before `as_of`, oldest first.
    async fn list_updated_before(&self, as_of: &Timestamp)
        -> Result<Vec<PurchaseToken>, DomainError>;
}

//! Notification log ports.
//!
//! Both logs are append-only. Developer notifications additionally carry a
//! processing status and an optional snapshot of the provider state.

use async_trait::async_trait;

use crate::domain::foundation::{
    DeveloperNotificationId, DomainError, VoidedPurchaseNotificationId,
};
use crate::domain::purchase::{
    DeveloperNotification, NewDeveloperNotification, NewVoidedPurchaseNotification,
    VoidedPurchaseNotification,
};

/// Repository port for the developer notification log.
#[async_trait]
pub trait DeveloperNotificationRepository: Send + Sync {
    /// Appends a notification with status `new` and returns it with its id.
    ///
    /// Never deduplicates; every received event gets its own row.
    async fn append(
        &self,
        notification: NewDeveloperNotification,
    ) -> Result<DeveloperNotification, DomainError>;

    async fn find_by_id(
        &self,
        id: DeveloperNotificationId,
    ) -> Result<Option<DeveloperNotification>, DomainError>;

    /// Persists status and snapshot changes.
    ///
    /// # Errors
    ///
    /// - `NotificationNotFound` if the row doesn't exist
    /// - `DatabaseError` on persistence failure
    async fn update(&self, notification: &DeveloperNotification) -> Result<(), DomainError>;

    /// Most recently received notification for a purchase token.
    async fn find_latest_for_token(
        &self,
        purchase_token: &str,
    ) -> Result<Option<DeveloperNotification>, DomainError>;
}

/// Repository port for the voided purchase log.
#[async_trait]
pub trait VoidedPurchaseRepository: Send + Sync {
    async fn append(
        &self,
        notification: NewVoidedPurchaseNotification,
    ) -> Result<VoidedPurchaseNotification, DomainError>;

    async fn find_by_id(
        &self,
        id: VoidedPurchaseNotificationId,
    ) -> Result<Option<VoidedPurchaseNotification>, DomainError>;
}

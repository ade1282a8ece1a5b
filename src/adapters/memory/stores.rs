//! In-memory purchase token store, notification logs and type mappings.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::domain::foundation::{
    DeveloperNotificationId, DomainError, ErrorCode, Timestamp, VoidedPurchaseNotificationId,
};
use crate::domain::purchase::{
    DeveloperNotification, NewDeveloperNotification, NewVoidedPurchaseNotification,
    PurchaseToken, SubscriptionTypeMapping, VoidedPurchaseNotification,
};
use crate::ports::{
    DeveloperNotificationRepository, PurchaseTokenRepository, SubscriptionTypeRepository,
    VoidedPurchaseRepository,
};

/// In-memory purchase token store.
#[derive(Default)]
pub struct InMemoryPurchaseTokens {
    tokens: RwLock<HashMap<String, PurchaseToken>>,
}

impl InMemoryPurchaseTokens {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn count(&self) -> usize {
        self.tokens.read().await.len()
    }
}

#[async_trait]
impl PurchaseTokenRepository for InMemoryPurchaseTokens {
    async fn upsert(
        &self,
        token: &str,
        package_name: &str,
        product_id: &str,
    ) -> Result<PurchaseToken, DomainError> {
        let mut tokens = self.tokens.write().await;
        let record = tokens
            .entry(token.to_string())
            .and_modify(|existing| existing.touch(package_name, product_id))
            .or_insert_with(|| PurchaseToken::new(token, package_name, product_id));
        Ok(record.clone())
    }

    async fn find(&self, token: &str) -> Result<Option<PurchaseToken>, DomainError> {
        Ok(self.tokens.read().await.get(token).cloned())
    }

    async fn list_updated_before(
        &self,
        as_of: &Timestamp,
    ) -> Result<Vec<PurchaseToken>, DomainError> {
        let tokens = self.tokens.read().await;
        let mut listed: Vec<_> = tokens
            .values()
            .filter(|t| !t.updated_at.is_after(as_of))
            .cloned()
            .collect();
        listed.sort_by_key(|t| t.updated_at);
        Ok(listed)
    }
}

#[derive(Default)]
struct LogState {
    developer: Vec<DeveloperNotification>,
    voided: Vec<VoidedPurchaseNotification>,
}

/// In-memory developer and voided-purchase notification logs.
///
/// Ids come from a sequence, like the serial columns of the tables.
#[derive(Default)]
pub struct InMemoryNotificationLog {
    state: RwLock<LogState>,
}

impl InMemoryNotificationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn developer_notifications(&self) -> Vec<DeveloperNotification> {
        self.state.read().await.developer.clone()
    }

    pub async fn voided_notifications(&self) -> Vec<VoidedPurchaseNotification> {
        self.state.read().await.voided.clone()
    }
}

#[async_trait]
impl DeveloperNotificationRepository for InMemoryNotificationLog {
    async fn append(
        &self,
        notification: NewDeveloperNotification,
    ) -> Result<DeveloperNotification, DomainError> {
        let mut state = self.state.write().await;
        let id = DeveloperNotificationId::new(state.developer.len() as i64 + 1);
        let stored = DeveloperNotification::from_new(id, notification);
        state.developer.push(stored.clone());
        Ok(stored)
    }

    async fn find_by_id(
        &self,
        id: DeveloperNotificationId,
    ) -> Result<Option<DeveloperNotification>, DomainError> {
        let state = self.state.read().await;
        Ok(state.developer.iter().find(|n| n.id == id).cloned())
    }

    async fn update(&self, notification: &DeveloperNotification) -> Result<(), DomainError> {
        let mut state = self.state.write().await;
        match state.developer.iter_mut().find(|n| n.id == notification.id) {
            Some(existing) => {
                existing.status = notification.status;
                existing.subscription_snapshot = notification.subscription_snapshot.clone();
                existing.modified_at = notification.modified_at;
                Ok(())
            }
            None => Err(DomainError::new(
                ErrorCode::NotificationNotFound,
                "Developer notification not found",
            )
            .with_detail("developer_notification_id", notification.id.to_string())),
        }
    }

    async fn find_latest_for_token(
        &self,
        purchase_token: &str,
    ) -> Result<Option<DeveloperNotification>, DomainError> {
        let state = self.state.read().await;
        Ok(state
            .developer
            .iter()
            .rev()
            .find(|n| n.purchase_token == purchase_token)
            .cloned())
    }
}

#[async_trait]
impl VoidedPurchaseRepository for InMemoryNotificationLog {
    async fn append(
        &self,
        notification: NewVoidedPurchaseNotification,
    ) -> Result<VoidedPurchaseNotification, DomainError> {
        let mut state = self.state.write().await;
        let id = VoidedPurchaseNotificationId::new(state.voided.len() as i64 + 1);
        let stored = VoidedPurchaseNotification::from_new(id, notification);
        state.voided.push(stored.clone());
        Ok(stored)
    }

    async fn find_by_id(
        &self,
        id: VoidedPurchaseNotificationId,
    ) -> Result<Option<VoidedPurchaseNotification>, DomainError> {
        let state = self.state.read().await;
        Ok(state.voided.iter().find(|n| n.id == id).cloned())
    }
}

/// In-memory product mappings, seeded by tests or local runs.
#[derive(Default)]
pub struct InMemorySubscriptionTypes {
    mappings: RwLock<HashMap<String, SubscriptionTypeMapping>>,
}

impl InMemorySubscriptionTypes {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, mapping: SubscriptionTypeMapping) {
        self.mappings
            .write()
            .await
            .insert(mapping.product_id.clone(), mapping);
    }
}

#[async_trait]
impl SubscriptionTypeRepository for InMemorySubscriptionTypes {
    async fn find_by_product_id(
        &self,
        product_id: &str,
    ) -> Result<Option<SubscriptionTypeMapping>, DomainError> {
        Ok(self.mappings.read().await.get(product_id).cloned())
    }
}

//! Mock billing verification client.
//!
//! Serves subscription states seeded by the test, records acknowledgements
//! and can inject provider failures.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

use crate::domain::purchase::{AcknowledgementState, ExternalSubscriptionState};
use crate::ports::{BillingError, BillingVerificationClient, SubscriptionRef};

#[derive(Default)]
pub struct MockBillingClient {
    states: RwLock<HashMap<String, ExternalSubscriptionState>>,
    fetch_error: RwLock<Option<BillingError>>,
    acknowledge_error: RwLock<Option<BillingError>>,
    fetches: AtomicUsize,
    acknowledgements: AtomicUsize,
}

impl MockBillingClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the state returned for `purchase_token`.
    pub async fn set_state(&self, purchase_token: &str, state: ExternalSubscriptionState) {
        self.states
            .write()
            .await
            .insert(purchase_token.to_string(), state);
    }

    pub async fn fail_fetch_with(&self, error: Option<BillingError>) {
        *self.fetch_error.write().await = error;
    }

    pub async fn fail_acknowledge_with(&self, error: Option<BillingError>) {
        *self.acknowledge_error.write().await = error;
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn acknowledge_count(&self) -> usize {
        self.acknowledgements.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BillingVerificationClient for MockBillingClient {
    async fn get_subscription(
        &self,
        subscription: &SubscriptionRef,
    ) -> Result<ExternalSubscriptionState, BillingError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.fetch_error.read().await.clone() {
            return Err(err);
        }
        self.states
            .read()
            .await
            .get(&subscription.purchase_token)
            .cloned()
            .ok_or_else(|| BillingError::NotFound(subscription.purchase_token.clone()))
    }

    async fn acknowledge(&self, subscription: &SubscriptionRef) -> Result<(), BillingError> {
        if let Some(err) = self.acknowledge_error.read().await.clone() {
            return Err(err);
        }
        let mut states = self.states.write().await;
        let state = states
            .get_mut(&subscription.purchase_token)
            .ok_or_else(|| BillingError::NotFound(subscription.purchase_token.clone()))?;
        if state.acknowledgement_state == AcknowledgementState::Acknowledged {
            return Err(BillingError::AlreadyAcknowledged);
        }
        state.acknowledgement_state = AcknowledgementState::Acknowledged;
        self.acknowledgements.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

//! In-memory ledger implementing every ledger repository port.
//!
//! One shared state backs payments, subscriptions, recurring charges and
//! users so that cross-entity lookups (a subscription reached through its
//! payment's metadata) behave like the SQL joins of the postgres adapter.
//!
//! Used by tests and local runs. Insertion order is preserved so that
//! recurring-charge histories read newest-first like the sequenced table.

use async_trait::async_trait;
use std::cmp::Reverse;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::domain::foundation::{
    DomainError, ErrorCode, PaymentId, SubscriptionId, UserId,
};
use crate::domain::ledger::{Payment, RecurringCharge, Subscription, User};
use crate::domain::purchase::{metadata, OrderId};
use crate::ports::{
    PaymentRepository, RecurringChargeRepository, SubscriptionRepository, UserRepository,
};

#[derive(Default)]
struct LedgerState {
    payments: HashMap<PaymentId, Payment>,
    subscriptions: HashMap<SubscriptionId, Subscription>,
    charges: Vec<RecurringCharge>,
    users: Vec<User>,
}

/// In-memory host ledger.
#[derive(Default)]
pub struct InMemoryLedger {
    state: RwLock<LedgerState>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    // === Test Helpers ===

    pub async fn payments(&self) -> Vec<Payment> {
        let state = self.state.read().await;
        let mut payments: Vec<_> = state.payments.values().cloned().collect();
        payments.sort_by_key(|p| p.created_at);
        payments
    }

    pub async fn subscriptions(&self) -> Vec<Subscription> {
        let state = self.state.read().await;
        let mut subscriptions: Vec<_> = state.subscriptions.values().cloned().collect();
        subscriptions.sort_by_key(|s| (s.start, s.created_at));
        subscriptions
    }

    pub async fn charges(&self) -> Vec<RecurringCharge> {
        self.state.read().await.charges.clone()
    }

    pub async fn users(&self) -> Vec<User> {
        self.state.read().await.users.clone()
    }

    pub async fn payment_count(&self) -> usize {
        self.state.read().await.payments.len()
    }

    pub async fn subscription_count(&self) -> usize {
        self.state.read().await.subscriptions.len()
    }

    /// Total metadata rows across payments.
    pub async fn payment_meta_count(&self) -> usize {
        let state = self.state.read().await;
        state.payments.values().map(|p| p.metadata.len()).sum()
    }

    /// Total metadata rows across subscriptions.
    pub async fn subscription_meta_count(&self) -> usize {
        let state = self.state.read().await;
        state.subscriptions.values().map(|s| s.metadata.len()).sum()
    }
}

fn tagged_with(meta: &metadata::Metadata, key: &str, value: &str) -> bool {
    meta.get(key).map(String::as_str) == Some(value)
}

#[async_trait]
impl PaymentRepository for InMemoryLedger {
    async fn create(&self, payment: &Payment) -> Result<(), DomainError> {
        let mut state = self.state.write().await;
        if state.payments.contains_key(&payment.id) {
            return Err(DomainError::new(ErrorCode::Conflict, "Payment already exists")
                .with_detail("payment_id", payment.id.to_string()));
        }
        state.payments.insert(payment.id, payment.clone());
        Ok(())
    }

    async fn update(&self, payment: &Payment) -> Result<(), DomainError> {
        let mut state = self.state.write().await;
        match state.payments.get_mut(&payment.id) {
            Some(existing) => {
                *existing = payment.clone();
                Ok(())
            }
            None => Err(DomainError::new(ErrorCode::PaymentNotFound, "Payment not found")
                .with_detail("payment_id", payment.id.to_string())),
        }
    }

    async fn find_by_id(&self, id: &PaymentId) -> Result<Option<Payment>, DomainError> {
        Ok(self.state.read().await.payments.get(id).cloned())
    }

    async fn find_by_order_id(&self, order_id: &OrderId) -> Result<Option<Payment>, DomainError> {
        let state = self.state.read().await;
        Ok(state
            .payments
            .values()
            .find(|p| tagged_with(&p.metadata, metadata::ORDER_ID, order_id.as_str()))
            .cloned())
    }

    async fn list_by_purchase_token(
        &self,
        purchase_token: &str,
    ) -> Result<Vec<Payment>, DomainError> {
        let state = self.state.read().await;
        let mut payments: Vec<_> = state
            .payments
            .values()
            .filter(|p| tagged_with(&p.metadata, metadata::PURCHASE_TOKEN, purchase_token))
            .cloned()
            .collect();
        payments.sort_by_key(|p| (Reverse(p.subscription_end), Reverse(p.created_at)));
        Ok(payments)
    }
}

#[async_trait]
impl SubscriptionRepository for InMemoryLedger {
    async fn create(&self, subscription: &Subscription) -> Result<(), DomainError> {
        let mut state = self.state.write().await;
        if state.subscriptions.contains_key(&subscription.id) {
            return Err(DomainError::new(ErrorCode::Conflict, "Subscription already exists")
                .with_detail("subscription_id", subscription.id.to_string()));
        }
        state.subscriptions.insert(subscription.id, subscription.clone());
        Ok(())
    }

    async fn update(&self, subscription: &Subscription) -> Result<(), DomainError> {
        let mut state = self.state.write().await;
        match state.subscriptions.get_mut(&subscription.id) {
            Some(existing) => {
                *existing = subscription.clone();
                Ok(())
            }
            None => Err(
                DomainError::new(ErrorCode::SubscriptionNotFound, "Subscription not found")
                    .with_detail("subscription_id", subscription.id.to_string()),
            ),
        }
    }

    async fn find_by_id(&self, id: &SubscriptionId) -> Result<Option<Subscription>, DomainError> {
        Ok(self.state.read().await.subscriptions.get(id).cloned())
    }

    async fn delete(&self, id: &SubscriptionId) -> Result<(), DomainError> {
        self.state.write().await.subscriptions.remove(id);
        Ok(())
    }

    async fn find_by_order_id(
        &self,
        order_id: &OrderId,
    ) -> Result<Option<Subscription>, DomainError> {
        let state = self.state.read().await;
        Ok(state
            .subscriptions
            .values()
            .filter(|s| tagged_with(&s.metadata, metadata::ORDER_ID, order_id.as_str()))
            .max_by_key(|s| s.end)
            .cloned())
    }

    async fn latest_for_purchase_token(
        &self,
        purchase_token: &str,
    ) -> Result<Option<Subscription>, DomainError> {
        let state = self.state.read().await;
        let paid_by_token = |s: &Subscription| {
            s.payment_id
                .and_then(|id| state.payments.get(&id))
                .map(|p| tagged_with(&p.metadata, metadata::PURCHASE_TOKEN, purchase_token))
                .unwrap_or(false)
        };

        Ok(state
            .subscriptions
            .values()
            .filter(|s| {
                tagged_with(&s.metadata, metadata::PURCHASE_TOKEN, purchase_token)
                    || paid_by_token(s)
            })
            .max_by_key(|s| (s.end, s.created_at))
            .cloned())
    }
}

#[async_trait]
impl RecurringChargeRepository for InMemoryLedger {
    async fn create(&self, charge: &RecurringCharge) -> Result<(), DomainError> {
        self.state.write().await.charges.push(charge.clone());
        Ok(())
    }

    async fn update(&self, charge: &RecurringCharge) -> Result<(), DomainError> {
        let mut state = self.state.write().await;
        match state.charges.iter_mut().find(|c| c.id == charge.id) {
            Some(existing) => {
                *existing = charge.clone();
                Ok(())
            }
            None => Err(DomainError::new(
                ErrorCode::RecurringChargeNotFound,
                "Recurring charge not found",
            )
            .with_detail("recurring_charge_id", charge.id.to_string())),
        }
    }

    async fn history(&self, charge_token: &str) -> Result<Vec<RecurringCharge>, DomainError> {
        let state = self.state.read().await;
        Ok(state
            .charges
            .iter()
            .rev()
            .filter(|c| c.charge_token == charge_token)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl UserRepository for InMemoryLedger {
    async fn create(&self, user: &User) -> Result<(), DomainError> {
        let mut state = self.state.write().await;
        if state.users.iter().any(|u| u.id == user.id) {
            return Err(DomainError::new(ErrorCode::Conflict, "User already exists")
                .with_detail("user_id", user.id.to_string()));
        }
        state.users.push(user.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, DomainError> {
        let state = self.state.read().await;
        Ok(state.users.iter().find(|u| &u.id == id).cloned())
    }

    async fn find_by_external_account_id(
        &self,
        external_account_id: &str,
    ) -> Result<Option<User>, DomainError> {
        let state = self.state.read().await;
        Ok(state
            .users
            .iter()
            .find(|u| u.external_account_id.as_deref() == Some(external_account_id))
            .cloned())
    }

    async fn find_by_metadata(&self, key: &str, value: &str) -> Result<Vec<User>, DomainError> {
        let state = self.state.read().await;
        Ok(state
            .users
            .iter()
            .filter(|u| tagged_with(&u.metadata, key, value))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::Timestamp;
    use crate::domain::ledger::RecurringChargeState;
    use crate::domain::purchase::SubscriptionType;

    fn ts(secs: i64) -> Timestamp {
        Timestamp::from_millis(secs * 1_000).unwrap()
    }

    fn payment(token: &str, order: &str, end: i64) -> Payment {
        Payment::new(
            UserId::new("user-1").unwrap(),
            SubscriptionType::new("premium").unwrap(),
            ts(end - 100),
            ts(end),
        )
        .with_meta(metadata::PURCHASE_TOKEN, token)
        .with_meta(metadata::ORDER_ID, order)
    }

    #[tokio::test]
    async fn payments_by_token_are_latest_end_first() {
        let ledger = InMemoryLedger::new();
        PaymentRepository::create(&ledger, &payment("tok", "GPA.1", 200)).await.unwrap();
        PaymentRepository::create(&ledger, &payment("tok", "GPA.1..0", 300)).await.unwrap();
        PaymentRepository::create(&ledger, &payment("other", "GPA.2", 900)).await.unwrap();

        let listed = ledger.list_by_purchase_token("tok").await.unwrap();

        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].subscription_end, ts(300));
        let latest = ledger.latest_by_purchase_token("tok").await.unwrap().unwrap();
        assert_eq!(latest.meta(metadata::ORDER_ID), Some("GPA.1..0"));
    }

    #[tokio::test]
    async fn payment_found_by_exact_order_id() {
        let ledger = InMemoryLedger::new();
        PaymentRepository::create(&ledger, &payment("tok", "GPA.1", 200)).await.unwrap();

        let found = PaymentRepository::find_by_order_id(&ledger, &OrderId::new("GPA.1").unwrap())
            .await
            .unwrap();
        let missing = PaymentRepository::find_by_order_id(&ledger, &OrderId::new("GPA.1..0").unwrap())
            .await
            .unwrap();

        assert!(found.is_some());
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn latest_subscription_reached_through_payment_metadata() {
        let ledger = InMemoryLedger::new();
        let p = payment("tok", "GPA.1", 200);
        let s = Subscription::new(
            p.user_id.clone(),
            p.subscription_type.clone(),
            p.subscription_start,
            p.subscription_end,
        )
        .for_payment(p.id);
        PaymentRepository::create(&ledger, &p).await.unwrap();
        SubscriptionRepository::create(&ledger, &s).await.unwrap();

        let latest = ledger.latest_for_purchase_token("tok").await.unwrap();

        assert_eq!(latest.map(|l| l.id), Some(s.id));
    }

    #[tokio::test]
    async fn charge_history_is_newest_first() {
        let ledger = InMemoryLedger::new();
        let first = RecurringCharge::charged("tok", PaymentId::new(), ts(100), None);
        let second = RecurringCharge::scheduled("tok", PaymentId::new(), ts(200), 3, Some(first.id));
        RecurringChargeRepository::create(&ledger, &first).await.unwrap();
        RecurringChargeRepository::create(&ledger, &second).await.unwrap();

        let head = ledger.latest("tok").await.unwrap().unwrap();
        let charged = ledger
            .latest_in_state("tok", RecurringChargeState::Charged)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(head.id, second.id);
        assert_eq!(charged.id, first.id);
    }

    #[tokio::test]
    async fn updating_unknown_payment_fails() {
        let ledger = InMemoryLedger::new();
        let result = PaymentRepository::update(&ledger, &payment("tok", "GPA.1", 200)).await;
        assert_eq!(result.unwrap_err().code, ErrorCode::PaymentNotFound);
    }
}

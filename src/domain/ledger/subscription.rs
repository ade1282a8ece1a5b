//! Ledger subscription entity.
//!
//! Subscriptions of one purchase token form a forward chain through
//! `next_subscription_id`. Lookups go by "latest end time for this token"
//! rather than walking the chain.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{PaymentId, SubscriptionId, Timestamp, UserId};
use crate::domain::purchase::{metadata, Metadata, SubscriptionType};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub user_id: UserId,
    pub subscription_type: SubscriptionType,
    pub start: Timestamp,
    pub end: Timestamp,
    /// Paying charge; absent for trials and grace periods.
    pub payment_id: Option<PaymentId>,
    pub next_subscription_id: Option<SubscriptionId>,
    /// Mirrors payment metadata when there is no payment.
    pub metadata: Metadata,
    pub notes: Vec<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Subscription {
    pub fn new(
        user_id: UserId,
        subscription_type: SubscriptionType,
        start: Timestamp,
        end: Timestamp,
    ) -> Self {
        let now = Timestamp::now();
        Self {
            id: SubscriptionId::new(),
            user_id,
            subscription_type,
            start,
            end,
            payment_id: None,
            next_subscription_id: None,
            metadata: Metadata::new(),
            notes: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn for_payment(mut self, payment_id: PaymentId) -> Self {
        self.payment_id = Some(payment_id);
        self
    }

    pub fn with_meta(mut self, key: &str, value: impl Into<String>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn meta(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    pub fn is_grace_period(&self) -> bool {
        metadata::is_grace_period(&self.metadata)
    }

    pub fn is_active_at(&self, at: &Timestamp) -> bool {
        !self.start.is_after(at) && self.end.is_after(at)
    }

    pub fn set_end(&mut self, end: Timestamp) {
        self.end = end;
        self.updated_at = Timestamp::now();
    }

    /// Ends the subscription at `at`, never before its start.
    pub fn close_at(&mut self, at: Timestamp) {
        let end = if at.is_before(&self.start) { self.start } else { at };
        self.set_end(end);
    }

    pub fn chain_to(&mut self, next: SubscriptionId) {
        self.next_subscription_id = Some(next);
        self.updated_at = Timestamp::now();
    }

    pub fn add_note(&mut self, note: impl Into<String>) {
        self.notes.push(note.into());
        self.updated_at = Timestamp::now();
    }
}

//! Ledger payment entity.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{
    PaymentId, StateMachine, SubscriptionId, Timestamp, UserId, ValidationError,
};
use crate::domain::purchase::{metadata, Metadata, OrderId, SubscriptionType};

/// Payment status in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Created by the recurring scheduler, not yet charged.
    Pending,
    Confirmed,
    /// Voided or revoked by the provider.
    Refund,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Confirmed => "confirmed",
            PaymentStatus::Refund => "refund",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(PaymentStatus::Pending),
            "confirmed" => Some(PaymentStatus::Confirmed),
            "refund" => Some(PaymentStatus::Refund),
            _ => None,
        }
    }
}

impl StateMachine for PaymentStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        use PaymentStatus::*;
        matches!(
            (self, target),
            (Pending, Confirmed) | (Pending, Refund) | (Confirmed, Refund)
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use PaymentStatus::*;
        match self {
            Pending => vec![Confirmed, Refund],
            Confirmed => vec![Refund],
            Refund => vec![],
        }
    }
}

/// A charge recorded in the ledger, covering one subscription window.
///
/// # Invariants
///
/// - `subscription_start <= subscription_end`
/// - linked to at most one subscription
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub user_id: UserId,
    pub status: PaymentStatus,
    pub subscription_type: SubscriptionType,
    pub subscription_start: Timestamp,
    pub subscription_end: Timestamp,
    pub subscription_id: Option<SubscriptionId>,
    pub metadata: Metadata,
    pub notes: Vec<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Payment {
    /// Creates a pending payment for the given window.
    pub fn new(
        user_id: UserId,
        subscription_type: SubscriptionType,
        subscription_start: Timestamp,
        subscription_end: Timestamp,
    ) -> Self {
        let now = Timestamp::now();
        Self {
            id: PaymentId::new(),
            user_id,
            status: PaymentStatus::Pending,
            subscription_type,
            subscription_start,
            subscription_end,
            subscription_id: None,
            metadata: Metadata::new(),
            notes: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_meta(mut self, key: &str, value: impl Into<String>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn set_meta(&mut self, key: &str, value: impl Into<String>) {
        self.metadata.insert(key.to_string(), value.into());
        self.updated_at = Timestamp::now();
    }

    pub fn meta(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    pub fn purchase_token(&self) -> Option<&str> {
        self.meta(metadata::PURCHASE_TOKEN)
    }

    pub fn order_id(&self) -> Option<OrderId> {
        self.meta(metadata::ORDER_ID)
            .and_then(|id| OrderId::new(id).ok())
    }

    pub fn is_confirmed(&self) -> bool {
        self.status == PaymentStatus::Confirmed
    }

    pub fn is_refunded(&self) -> bool {
        self.status == PaymentStatus::Refund
    }

    pub fn confirm(&mut self) -> Result<(), ValidationError> {
        self.status = self.status.transition_to(PaymentStatus::Confirmed)?;
        self.updated_at = Timestamp::now();
        Ok(())
    }

    pub fn refund(&mut self) -> Result<(), ValidationError> {
        self.status = self.status.transition_to(PaymentStatus::Refund)?;
        self.updated_at = Timestamp::now();
        Ok(())
    }

    /// Moves the covered window.
    pub fn set_window(&mut self, start: Timestamp, end: Timestamp) -> Result<(), ValidationError> {
        if end.is_before(&start) {
            return Err(ValidationError::invalid_format(
                "subscription_end",
                "end precedes start",
            ));
        }
        self.subscription_start = start;
        self.subscription_end = end;
        self.updated_at = Timestamp::now();
        Ok(())
    }

    pub fn link_subscription(&mut self, subscription_id: SubscriptionId) {
        self.subscription_id = Some(subscription_id);
        self.updated_at = Timestamp::now();
    }

    pub fn add_note(&mut self, note: impl Into<String>) {
        self.notes.push(note.into());
        self.updated_at = Timestamp::now();
    }
}

//! Shared ledger operations used by every reconciliation entry point.

use std::sync::Arc;

use crate::domain::foundation::Timestamp;
use crate::domain::ledger::Subscription;
use crate::domain::purchase::{OrderId, ReconciliationError};
use crate::ports::{
    PaymentRepository, RecurringChargeRepository, SubscriptionRepository,
    SubscriptionTypeRepository, UserRepository,
};

use super::schedule::RecurringSchedule;

/// Ledger stores touched by reconciliation.
#[derive(Clone)]
pub struct LedgerPorts {
    pub payments: Arc<dyn PaymentRepository>,
    pub subscriptions: Arc<dyn SubscriptionRepository>,
    pub charges: Arc<dyn RecurringChargeRepository>,
    pub users: Arc<dyn UserRepository>,
    pub subscription_types: Arc<dyn SubscriptionTypeRepository>,
}

/// Tunables shared by the reconciliation entry points.
#[derive(Debug, Clone)]
pub struct ReconciliationSettings {
    /// Realm of users created for purchases without an account.
    pub anonymous_user_realm: String,
    /// Retries granted to each scheduled recurring charge.
    pub recurring_retry_budget: u32,
    /// Acknowledge fulfilled purchases at the billing provider.
    pub acknowledge_purchases: bool,
}

impl Default for ReconciliationSettings {
    fn default() -> Self {
        Self {
            anonymous_user_realm: "google_play".to_string(),
            recurring_retry_budget: 3,
            acknowledge_purchases: true,
        }
    }
}

/// Ledger mutations shared by notifications, verification, voids and the gateway.
///
/// The routines read then write without row locks; processing is assumed
/// serial per purchase token.
#[derive(Clone)]
pub struct LedgerReconciler {
    pub(super) ledger: LedgerPorts,
    pub(super) settings: ReconciliationSettings,
    pub(super) schedule: RecurringSchedule,
}

impl LedgerReconciler {
    pub fn new(ledger: LedgerPorts, settings: ReconciliationSettings) -> Self {
        let schedule = RecurringSchedule::new(ledger.charges.clone(), settings.recurring_retry_budget);
        Self {
            ledger,
            settings,
            schedule,
        }
    }

    pub fn ledger(&self) -> &LedgerPorts {
        &self.ledger
    }

    pub fn settings(&self) -> &ReconciliationSettings {
        &self.settings
    }

    pub fn schedule(&self) -> &RecurringSchedule {
        &self.schedule
    }

    /// Ends the still-open grace-period subscription for `order_id`, if any.
    ///
    /// A real charge for the same order supersedes the grace period.
    pub async fn close_grace_period(
        &self,
        order_id: Option<&OrderId>,
    ) -> Result<Option<Subscription>, ReconciliationError> {
        let Some(order_id) = order_id else {
            return Ok(None);
        };
        let Some(mut grace) = self.ledger.subscriptions.find_by_order_id(order_id).await? else {
            return Ok(None);
        };
        if !grace.is_grace_period() {
            return Ok(None);
        }

        let now = Timestamp::now();
        if !grace.end.is_after(&now) {
            return Ok(None);
        }

        grace.close_at(now);
        grace.add_note("grace period superseded by charge");
        self.ledger.subscriptions.update(&grace).await?;
        tracing::info!(
            subscription_id = %grace.id,
            order_id = %order_id,
            "Closed grace period subscription"
        );
        Ok(Some(grace))
    }
}

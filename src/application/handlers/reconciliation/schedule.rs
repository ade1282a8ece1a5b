//! Recurring-charge schedule maintenance.

use std::sync::Arc;

use crate::domain::ledger::{Payment, RecurringCharge, RecurringChargeState};
use crate::domain::purchase::{redact, ReconciliationError};
use crate::ports::RecurringChargeRepository;

/// Appends to and transitions a purchase token's recurring-charge history.
#[derive(Clone)]
pub struct RecurringSchedule {
    charges: Arc<dyn RecurringChargeRepository>,
    retry_budget: u32,
}

impl RecurringSchedule {
    pub fn new(charges: Arc<dyn RecurringChargeRepository>, retry_budget: u32) -> Self {
        Self {
            charges,
            retry_budget,
        }
    }

    /// Starts a schedule from a first payment: the charge itself plus the
    /// next attempt at the end of its window.
    pub async fn create_from(
        &self,
        charge_token: &str,
        payment: &Payment,
    ) -> Result<RecurringCharge, ReconciliationError> {
        let previous = self.charges.latest(charge_token).await?.map(|c| c.id);
        let charged = RecurringCharge::charged(
            charge_token,
            payment.id,
            payment.subscription_start,
            previous,
        );
        self.charges.create(&charged).await?;

        let next = RecurringCharge::scheduled(
            charge_token,
            payment.id,
            payment.subscription_end,
            self.retry_budget,
            Some(charged.id),
        );
        self.charges.create(&next).await?;

        tracing::info!(
            purchase_token = redact(charge_token),
            payment_id = %payment.id,
            charge_at = %next.charge_at,
            "Created recurring charge schedule"
        );
        Ok(next)
    }

    /// Marks the scheduled attempt as fulfilled by `payment` and schedules
    /// the following one.
    pub async fn complete_with(
        &self,
        charge_token: &str,
        payment: &Payment,
    ) -> Result<RecurringCharge, ReconciliationError> {
        let Some(mut head) = self.charges.latest(charge_token).await? else {
            return self.create_from(charge_token, payment).await;
        };
        if !head.is_active() {
            return self.create_from(charge_token, payment).await;
        }

        head.complete_with(payment.id)
            .map_err(|e| ReconciliationError::conflict(e.to_string()))?;
        self.charges.update(&head).await?;

        let next = RecurringCharge::scheduled(
            charge_token,
            payment.id,
            payment.subscription_end,
            self.retry_budget,
            Some(head.id),
        );
        self.charges.create(&next).await?;

        tracing::info!(
            purchase_token = redact(charge_token),
            payment_id = %payment.id,
            charge_at = %next.charge_at,
            "Completed scheduled recurring charge"
        );
        Ok(next)
    }

    /// Stops the latest active entry. Returns `None` when nothing is active.
    pub async fn stop(
        &self,
        charge_token: &str,
        target: RecurringChargeState,
    ) -> Result<Option<RecurringCharge>, ReconciliationError> {
        let Some(mut active) = self
            .charges
            .latest_in_state(charge_token, RecurringChargeState::Active)
            .await?
        else {
            tracing::debug!(
                purchase_token = redact(charge_token),
                "No active recurring charge to stop"
            );
            return Ok(None);
        };

        active
            .transition(target)
            .map_err(|e| ReconciliationError::conflict(e.to_string()))?;
        self.charges.update(&active).await?;
        tracing::info!(
            purchase_token = redact(charge_token),
            recurring_charge_id = %active.id,
            state = active.state.as_str(),
            "Stopped recurring charge"
        );
        Ok(Some(active))
    }

    /// Reactivates the latest stopped entry, or schedules a new attempt
    /// after `payment` when the history has no entry to reactivate.
    pub async fn ensure_active(
        &self,
        charge_token: &str,
        payment: &Payment,
    ) -> Result<RecurringCharge, ReconciliationError> {
        let history = self.charges.history(charge_token).await?;

        if let Some(active) = history.iter().find(|c| c.is_active()) {
            return Ok(active.clone());
        }

        if let Some(stopped) = history.iter().find(|c| c.state.is_stopped()) {
            let mut stopped = stopped.clone();
            stopped
                .transition(RecurringChargeState::Active)
                .map_err(|e| ReconciliationError::conflict(e.to_string()))?;
            self.charges.update(&stopped).await?;
            tracing::info!(
                purchase_token = redact(charge_token),
                recurring_charge_id = %stopped.id,
                "Reactivated recurring charge"
            );
            return Ok(stopped);
        }

        match history.first() {
            None => self.create_from(charge_token, payment).await,
            Some(head) => {
                let next = RecurringCharge::scheduled(
                    charge_token,
                    payment.id,
                    payment.subscription_end,
                    self.retry_budget,
                    Some(head.id),
                );
                self.charges.create(&next).await?;
                tracing::info!(
                    purchase_token = redact(charge_token),
                    charge_at = %next.charge_at,
                    "Scheduled recurring charge after restart"
                );
                Ok(next)
            }
        }
    }

    /// Newest entry that recorded a successful charge.
    pub async fn last_successful(
        &self,
        charge_token: &str,
    ) -> Result<Option<RecurringCharge>, ReconciliationError> {
        Ok(self
            .charges
            .latest_in_state(charge_token, RecurringChargeState::Charged)
            .await?)
    }
}

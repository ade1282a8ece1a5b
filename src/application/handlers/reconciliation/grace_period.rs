//! Grace-period subscriptions.
//!
//! While the provider retries a failed renewal the user stays entitled. The
//! grace period is a payment-less subscription chained after the latest one.

use crate::domain::foundation::Timestamp;
use crate::domain::ledger::Subscription;
use crate::domain::purchase::{
    metadata, redact, ExternalSubscriptionState, ReconciliationError, TerminalReason,
};

use super::LedgerReconciler;

impl LedgerReconciler {
    /// Grants a grace period after the latest subscription of the token.
    ///
    /// Returns `None` when the provider state shows the charge already
    /// happened or renewal stopped.
    pub async fn create_grace_period_subscription(
        &self,
        purchase_token: &str,
        product_id: &str,
        state: &ExternalSubscriptionState,
    ) -> Result<Option<Subscription>, ReconciliationError> {
        if !(state.auto_renewing && state.is_payment_pending()) {
            tracing::debug!(
                purchase_token = redact(purchase_token),
                "Grace period no longer applies"
            );
            return Ok(None);
        }

        let mut latest = self
            .ledger
            .subscriptions
            .latest_for_purchase_token(purchase_token)
            .await?
            .ok_or(ReconciliationError::DoNotRetry(TerminalReason::NoPriorPurchase))?;

        let end = state.expiry_secs();
        if !latest.end.is_before(&end) {
            return Err(ReconciliationError::do_not_retry(
                TerminalReason::LaterSubscriptionExists,
            ));
        }

        let now = Timestamp::now();
        let start = if latest.end.is_after(&now) { latest.end } else { now };
        if start.is_after(&end) {
            return Err(ReconciliationError::do_not_retry(
                TerminalReason::StaleNotification("grace period already over".to_string()),
            ));
        }

        let subscription_type = self
            .resolve_subscription_type(product_id, state.order_id.as_ref())
            .await?;
        let user_id = self.resolve_user(state, purchase_token).await?;

        let mut grace = Subscription::new(user_id, subscription_type, start, end)
            .with_meta(metadata::PURCHASE_TOKEN, purchase_token)
            .with_meta(metadata::GRACE_PERIOD, metadata::FLAG_TRUE);
        if let Some(order_id) = &state.order_id {
            grace = grace.with_meta(metadata::ORDER_ID, order_id.as_str());
        }
        grace.add_note(format!("grace period until {}", end));

        self.ledger.subscriptions.create(&grace).await?;
        latest.chain_to(grace.id);
        self.ledger.subscriptions.update(&latest).await?;

        tracing::info!(
            subscription_id = %grace.id,
            previous_subscription_id = %latest.id,
            purchase_token = redact(purchase_token),
            until = %end,
            "Granted grace period"
        );
        Ok(Some(grace))
    }
}

//! Cancellation, revocation and restart of a purchase's subscription.

use crate::domain::foundation::Timestamp;
use crate::domain::ledger::{Payment, RecurringChargeState};
use crate::domain::purchase::{
    metadata, redact, CancellationReason, ExternalSubscriptionState, NotificationType,
    ReconciliationError, TerminalReason,
};

use super::LedgerReconciler;

impl LedgerReconciler {
    /// Payment whose subscription the event refers to.
    async fn payment_for_event(
        &self,
        purchase_token: &str,
        state: &ExternalSubscriptionState,
    ) -> Result<Payment, ReconciliationError> {
        self.ledger
            .payments
            .latest_by_purchase_token_starting_from(
                purchase_token,
                &state.start_time.truncate_to_secs(),
            )
            .await?
            .ok_or(ReconciliationError::DoNotRetry(TerminalReason::NothingToCancel))
    }

    /// Records the cancellation on the payment, stops the recurring
    /// schedule and moves the subscription end to the provider's expiry.
    ///
    /// A revocation also refunds the payment.
    pub async fn cancel_subscription(
        &self,
        purchase_token: &str,
        state: &ExternalSubscriptionState,
        kind: NotificationType,
    ) -> Result<Payment, ReconciliationError> {
        let mut payment = self.payment_for_event(purchase_token, state).await?;
        let reason = state.cancellation_reason();
        let canceled_at = state.user_cancellation_time.unwrap_or_else(Timestamp::now);
        let note = format!("{}: {} at {}", kind, reason.describe(), canceled_at);

        payment.set_meta(metadata::CANCEL_REASON, reason.as_str());
        payment.set_meta(metadata::CANCEL_DATETIME, canceled_at.to_rfc3339());
        if let CancellationReason::UserCanceled {
            survey_reason,
            user_input,
        } = &reason
        {
            if let Some(survey_reason) = survey_reason {
                payment.set_meta(metadata::CANCEL_SURVEY_REASON, survey_reason.as_str());
            }
            if let Some(user_input) = user_input {
                payment.set_meta(metadata::CANCEL_SURVEY_USER_INPUT, user_input.clone());
            }
        }
        payment.add_note(note.clone());

        if kind == NotificationType::Revoked && !payment.is_refunded() {
            payment
                .refund()
                .map_err(|e| ReconciliationError::conflict(e.to_string()))?;
        }

        self.schedule
            .stop(purchase_token, RecurringChargeState::UserStop)
            .await?;

        if let Some(subscription_id) = payment.subscription_id {
            if let Some(mut subscription) =
                self.ledger.subscriptions.find_by_id(&subscription_id).await?
            {
                subscription.close_at(state.expiry_secs());
                subscription.add_note(note);
                self.ledger.subscriptions.update(&subscription).await?;
            }
        }

        self.ledger.payments.update(&payment).await?;

        tracing::info!(
            payment_id = %payment.id,
            purchase_token = redact(purchase_token),
            reason = reason.as_str(),
            kind = %kind,
            "Canceled subscription"
        );
        Ok(payment)
    }

    /// Records the restart and reactivates the recurring schedule.
    pub async fn restart_subscription(
        &self,
        purchase_token: &str,
        state: &ExternalSubscriptionState,
    ) -> Result<Payment, ReconciliationError> {
        let mut payment = self.payment_for_event(purchase_token, state).await?;
        let now = Timestamp::now();

        payment.set_meta(metadata::RESTART_DATETIME, now.to_rfc3339());
        payment.add_note(format!("restarted at {}", now));

        self.schedule.ensure_active(purchase_token, &payment).await?;
        self.ledger.payments.update(&payment).await?;

        tracing::info!(
            payment_id = %payment.id,
            purchase_token = redact(purchase_token),
            "Restarted subscription"
        );
        Ok(payment)
    }
}

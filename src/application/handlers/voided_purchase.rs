//! VoidedPurchaseHandler - Applies a provider void/refund to the ledger.

use std::sync::Arc;

use crate::domain::foundation::{Timestamp, VoidedPurchaseNotificationId};
use crate::domain::ledger::{Payment, RecurringChargeState};
use crate::domain::purchase::{
    metadata, redact, OrderId, ReconciliationError, TerminalReason, VoidedPurchaseNotification,
};
use crate::ports::{Outcome, VoidedPurchaseRepository};

use super::reconciliation::LedgerReconciler;

pub struct VoidedPurchaseHandler {
    voided: Arc<dyn VoidedPurchaseRepository>,
    reconciler: LedgerReconciler,
}

impl VoidedPurchaseHandler {
    pub fn new(voided: Arc<dyn VoidedPurchaseRepository>, reconciler: LedgerReconciler) -> Self {
        Self { voided, reconciler }
    }

    /// Refunds the voided payment. Safe to run more than once.
    pub async fn handle(&self, id: VoidedPurchaseNotificationId) -> Outcome {
        let notification = match self.voided.find_by_id(id).await {
            Ok(Some(notification)) => notification,
            Ok(None) => {
                tracing::warn!(voided_notification_id = %id, "Voided purchase notification not found");
                let reason = TerminalReason::NotificationNotFound(id.to_string());
                return Outcome::Terminal(reason.to_string());
            }
            Err(e) => return Outcome::Retry(e.to_string()),
        };

        match self.void(&notification).await {
            Ok(()) => Outcome::Processed,
            Err(err) if err.is_retryable() => {
                tracing::warn!(
                    voided_notification_id = %id,
                    error = %err,
                    "Voiding purchase failed, will retry"
                );
                Outcome::Retry(err.to_string())
            }
            Err(err) => {
                tracing::warn!(
                    voided_notification_id = %id,
                    purchase_token = redact(&notification.purchase_token),
                    error = %err,
                    "Voided purchase will not be retried"
                );
                Outcome::Terminal(err.to_string())
            }
        }
    }

    async fn void(&self, notification: &VoidedPurchaseNotification) -> Result<(), ReconciliationError> {
        let mut payment = self.find_payment(notification).await?;
        if payment.is_refunded() {
            tracing::debug!(payment_id = %payment.id, "Payment already refunded");
            return Ok(());
        }

        let ledger = self.reconciler.ledger();
        let now = Timestamp::now();

        if let Some(subscription_id) = payment.subscription_id {
            if let Some(mut subscription) = ledger.subscriptions.find_by_id(&subscription_id).await? {
                if subscription.end.is_after(&now) {
                    subscription.close_at(now);
                    subscription.add_note(format!("voided {}", now));
                    ledger.subscriptions.update(&subscription).await?;
                }
            }
        }

        self.reconciler
            .schedule()
            .stop(&notification.purchase_token, RecurringChargeState::SystemStop)
            .await?;

        payment
            .refund()
            .map_err(|e| ReconciliationError::conflict(e.to_string()))?;
        payment.set_meta(metadata::REFUND_DATETIME, now.to_rfc3339());
        payment.add_note(format!(
            "voided by provider ({}) at {}",
            notification.refund_type.as_str(),
            now
        ));
        ledger.payments.update(&payment).await?;

        tracing::info!(
            payment_id = %payment.id,
            purchase_token = redact(&notification.purchase_token),
            order_id = %notification.order_id,
            "Refunded voided payment"
        );
        Ok(())
    }

    async fn find_payment(
        &self,
        notification: &VoidedPurchaseNotification,
    ) -> Result<Payment, ReconciliationError> {
        let payments = &self.reconciler.ledger().payments;
        if let Ok(order_id) = OrderId::new(&notification.order_id) {
            if let Some(payment) = payments.find_by_order_id(&order_id).await? {
                return Ok(payment);
            }
        }
        payments
            .latest_by_purchase_token(&notification.purchase_token)
            .await?
            .ok_or_else(|| ReconciliationError::do_not_retry(TerminalReason::PaymentNotFound))
    }
}

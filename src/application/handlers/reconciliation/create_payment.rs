//! Payment creation for purchases, renewals and recoveries.

use crate::domain::foundation::{DeveloperNotificationId, Timestamp, UserId};
use crate::domain::ledger::{Payment, Subscription};
use crate::domain::purchase::{
    metadata, redact, ExternalSubscriptionState, OrderId, ReconciliationError, SubscriptionType,
    TerminalReason,
};

use super::LedgerReconciler;

/// Input for recording a confirmed charge.
#[derive(Debug, Clone)]
pub struct PaymentRequest<'a> {
    pub purchase_token: &'a str,
    pub product_id: &'a str,
    pub state: &'a ExternalSubscriptionState,
    pub notification_id: Option<DeveloperNotificationId>,
    /// Owner known by the caller; skips user resolution.
    pub user_id: Option<UserId>,
}

/// What recording a charge did to the ledger.
#[derive(Debug, Clone)]
pub enum PaymentRecorded {
    Created {
        payment: Payment,
        subscription: Subscription,
    },
    /// A payment for this order id already exists.
    AlreadyRecorded(Payment),
    TrialStarted(Subscription),
    /// The order is a free trial that was already recorded.
    TrialAlreadyRecorded(Subscription),
}

impl LedgerReconciler {
    /// Records the charge described by the provider state.
    ///
    /// Idempotent per order id. Detects renewals of the same purchase and
    /// rejects exact duplicates and out-of-order replays.
    pub async fn record_payment(
        &self,
        request: PaymentRequest<'_>,
    ) -> Result<PaymentRecorded, ReconciliationError> {
        let state = request.state;
        let token = request.purchase_token;
        let order_id = state.order_id.as_ref();

        if let Some(order_id) = order_id {
            if let Some(existing) = self.ledger.payments.find_by_order_id(order_id).await? {
                tracing::debug!(
                    order_id = %order_id,
                    payment_id = %existing.id,
                    "Payment already recorded for order"
                );
                return Ok(PaymentRecorded::AlreadyRecorded(existing));
            }

            if let Some(existing) = self.ledger.subscriptions.find_by_order_id(order_id).await? {
                if existing.subscription_type.is_free() {
                    tracing::debug!(order_id = %order_id, "Trial already recorded for order");
                    return Ok(PaymentRecorded::TrialAlreadyRecorded(existing));
                }
                if !existing.is_grace_period() {
                    tracing::error!(
                        order_id = %order_id,
                        subscription_id = %existing.id,
                        "Non-grace subscription already holds order id"
                    );
                    return Err(ReconciliationError::conflict(format!(
                        "Subscription {} already holds order {}",
                        existing.id, order_id
                    )));
                }
            }
        }

        if !state.is_payment_confirmed() {
            return Err(ReconciliationError::do_not_retry(
                TerminalReason::PaymentNotConfirmed,
            ));
        }

        let subscription_type = if state.is_free_trial() {
            SubscriptionType::free()
        } else {
            self.resolve_subscription_type(request.product_id, order_id)
                .await?
        };

        let user_id = match request.user_id {
            Some(user_id) => user_id,
            None => self.resolve_user(state, token).await?,
        };

        if state.is_free_trial() {
            let trial = self
                .start_trial(token, order_id, user_id, subscription_type, state)
                .await?;
            return Ok(PaymentRecorded::TrialStarted(trial));
        }

        let mut start = state.start_time.truncate_to_secs();
        let end = state.expiry_secs();
        let mut renewal = false;

        if let Some(previous) = self.ledger.payments.latest_by_purchase_token(token).await? {
            let previous_order = previous.order_id();

            if previous_order.as_ref() == order_id && previous.subscription_end == end {
                return Err(ReconciliationError::do_not_retry(
                    TerminalReason::DuplicateNotification(display_order(order_id)),
                ));
            }
            if previous.subscription_end.is_after(&end) {
                return Err(ReconciliationError::do_not_retry(
                    TerminalReason::StaleNotification(format!(
                        "payment {} already covers until {}",
                        previous.id, previous.subscription_end
                    )),
                ));
            }
            let same_purchase = match (&previous_order, order_id) {
                (Some(prev), Some(new)) => prev.same_purchase(new),
                _ => false,
            };
            if same_purchase {
                start = previous.subscription_end;
                renewal = true;
            }
        }

        self.close_grace_period(order_id).await?;

        let mut payment = Payment::new(user_id.clone(), subscription_type.clone(), start, end)
            .with_meta(metadata::PURCHASE_TOKEN, token);
        if let Some(order_id) = order_id {
            payment = payment.with_meta(metadata::ORDER_ID, order_id.as_str());
        }
        if let Some(notification_id) = request.notification_id {
            payment = payment.with_meta(
                metadata::DEVELOPER_NOTIFICATION_ID,
                notification_id.to_string(),
            );
        }
        payment
            .confirm()
            .map_err(|e| ReconciliationError::conflict(e.to_string()))?;

        let subscription =
            Subscription::new(user_id, subscription_type, start, end).for_payment(payment.id);
        payment.link_subscription(subscription.id);

        let predecessor = self
            .ledger
            .subscriptions
            .latest_for_purchase_token(token)
            .await?;

        // The payment row references the subscription, so the subscription
        // goes first and is removed again when the payment insert fails.
        self.ledger.subscriptions.create(&subscription).await?;
        if let Err(e) = self.ledger.payments.create(&payment).await {
            tracing::warn!(
                subscription_id = %subscription.id,
                order_id = %display_order(order_id),
                error = %e,
                "Payment insert failed, removing its subscription"
            );
            self.ledger.subscriptions.delete(&subscription.id).await?;
            return Err(e.into());
        }

        if let Some(mut predecessor) = predecessor {
            if predecessor.next_subscription_id.is_none() {
                predecessor.chain_to(subscription.id);
                self.ledger.subscriptions.update(&predecessor).await?;
            }
        }

        let has_schedule = self.ledger.charges.latest(token).await?.is_some();
        if renewal || has_schedule {
            self.schedule.complete_with(token, &payment).await?;
        } else {
            self.schedule.create_from(token, &payment).await?;
        }

        tracing::info!(
            payment_id = %payment.id,
            subscription_id = %subscription.id,
            purchase_token = redact(token),
            order_id = %display_order(order_id),
            renewal,
            "Recorded payment"
        );

        Ok(PaymentRecorded::Created {
            payment,
            subscription,
        })
    }

    async fn start_trial(
        &self,
        token: &str,
        order_id: Option<&OrderId>,
        user_id: UserId,
        subscription_type: SubscriptionType,
        state: &ExternalSubscriptionState,
    ) -> Result<Subscription, ReconciliationError> {
        let start = state.start_time.truncate_to_secs();
        let end = state.expiry_secs();
        if end.is_before(&start) {
            return Err(ReconciliationError::do_not_retry(
                TerminalReason::MalformedPayload("trial expiry precedes start".to_string()),
            ));
        }

        let mut trial = Subscription::new(user_id, subscription_type, start, end)
            .with_meta(metadata::PURCHASE_TOKEN, token);
        if let Some(order_id) = order_id {
            trial = trial.with_meta(metadata::ORDER_ID, order_id.as_str());
        }
        trial.add_note(format!("free trial started {}", Timestamp::now()));
        self.ledger.subscriptions.create(&trial).await?;

        tracing::info!(
            subscription_id = %trial.id,
            purchase_token = redact(token),
            "Started free trial"
        );
        Ok(trial)
    }
}

pub(crate) fn display_order(order_id: Option<&OrderId>) -> String {
    order_id
        .map(|o| o.to_string())
        .unwrap_or_else(|| "<none>".to_string())
}

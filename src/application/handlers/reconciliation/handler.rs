//! ReconciliationHandler - Processes one logged developer notification.

use std::sync::Arc;

use crate::domain::foundation::DeveloperNotificationId;
use crate::domain::purchase::{
    redact, DeveloperNotification, ExternalSubscriptionState, NotificationStatus,
    NotificationType, ReconciliationError, TerminalReason,
};
use crate::ports::{
    BillingError, BillingVerificationClient, DeveloperNotificationRepository, Outcome,
    SubscriptionRef,
};

use super::{display_order, LedgerReconciler, PaymentRecorded, PaymentRequest};

/// Handler for the asynchronous notification path.
///
/// Fetches the authoritative state for the notification's purchase token,
/// applies the per-type ledger mutation and records the resulting status.
pub struct ReconciliationHandler {
    notifications: Arc<dyn DeveloperNotificationRepository>,
    billing: Arc<dyn BillingVerificationClient>,
    reconciler: LedgerReconciler,
}

impl ReconciliationHandler {
    pub fn new(
        notifications: Arc<dyn DeveloperNotificationRepository>,
        billing: Arc<dyn BillingVerificationClient>,
        reconciler: LedgerReconciler,
    ) -> Self {
        Self {
            notifications,
            billing,
            reconciler,
        }
    }

    /// Processes a notification and reports the outcome to the queue.
    pub async fn handle(&self, id: DeveloperNotificationId) -> Outcome {
        let mut notification = match self.notifications.find_by_id(id).await {
            Ok(Some(notification)) => notification,
            Ok(None) => {
                tracing::warn!(notification_id = %id, "Developer notification not found");
                let reason = TerminalReason::NotificationNotFound(id.to_string());
                return Outcome::Terminal(reason.to_string());
            }
            Err(e) => return Outcome::Retry(e.to_string()),
        };

        if notification.status == NotificationStatus::Processed {
            tracing::debug!(notification_id = %id, "Notification already processed");
            return Outcome::Processed;
        }

        match self.process(&mut notification).await {
            Ok(()) => self.finish(&mut notification).await,
            Err(err) => self.record_failure(&mut notification, err).await,
        }
    }

    async fn process(
        &self,
        notification: &mut DeveloperNotification,
    ) -> Result<(), ReconciliationError> {
        let kind = notification.kind().map_err(|e| {
            ReconciliationError::do_not_retry(TerminalReason::UnknownNotificationType(e.0))
        })?;
        let subscription = subscription_ref(notification)?;

        let state = self
            .billing
            .get_subscription(&subscription)
            .await
            .map_err(billing_failure)?;

        let snapshot = serde_json::to_value(&state).map_err(|e| {
            ReconciliationError::do_not_retry(TerminalReason::MalformedPayload(e.to_string()))
        })?;
        notification.attach_snapshot(snapshot);
        self.notifications.update(notification).await?;

        let token = notification.purchase_token.as_str();
        tracing::info!(
            notification_id = %notification.id,
            purchase_token = redact(token),
            kind = %kind,
            "Reconciling notification"
        );

        match kind {
            NotificationType::Purchased | NotificationType::Renewed | NotificationType::Recovered => {
                self.create_payment(notification, &subscription, &state).await
            }
            NotificationType::Expired | NotificationType::Canceled | NotificationType::Revoked => {
                self.reconciler
                    .cancel_subscription(token, &state, kind)
                    .await
                    .map(|_| ())
            }
            NotificationType::Restarted => self
                .reconciler
                .restart_subscription(token, &state)
                .await
                .map(|_| ()),
            NotificationType::PriceChangeConfirmed
            | NotificationType::OnHold
            | NotificationType::Deferred
            | NotificationType::Paused
            | NotificationType::PauseScheduleChanged => Ok(()),
            NotificationType::InGracePeriod => self
                .reconciler
                .create_grace_period_subscription(token, &notification.product_id, &state)
                .await
                .map(|_| ()),
        }
    }

    async fn create_payment(
        &self,
        notification: &DeveloperNotification,
        subscription: &SubscriptionRef,
        state: &ExternalSubscriptionState,
    ) -> Result<(), ReconciliationError> {
        let recorded = self
            .reconciler
            .record_payment(PaymentRequest {
                purchase_token: &notification.purchase_token,
                product_id: &notification.product_id,
                state,
                notification_id: Some(notification.id),
                user_id: None,
            })
            .await?;

        acknowledge(
            self.billing.as_ref(),
            self.reconciler.settings().acknowledge_purchases,
            subscription,
            state,
        )
        .await?;

        match recorded {
            PaymentRecorded::AlreadyRecorded(_) => Err(ReconciliationError::do_not_retry(
                TerminalReason::DuplicateNotification(display_order(state.order_id.as_ref())),
            )),
            PaymentRecorded::Created { .. }
            | PaymentRecorded::TrialStarted(_)
            | PaymentRecorded::TrialAlreadyRecorded(_) => Ok(()),
        }
    }

    async fn finish(&self, notification: &mut DeveloperNotification) -> Outcome {
        notification.mark(NotificationStatus::Processed);
        match self.notifications.update(notification).await {
            Ok(()) => Outcome::Processed,
            Err(e) => {
                tracing::warn!(
                    notification_id = %notification.id,
                    error = %e,
                    "Failed to mark notification processed"
                );
                Outcome::Retry(e.to_string())
            }
        }
    }

    async fn record_failure(
        &self,
        notification: &mut DeveloperNotification,
        err: ReconciliationError,
    ) -> Outcome {
        let Some(status) = err.notification_status() else {
            tracing::warn!(
                notification_id = %notification.id,
                error = %err,
                "Reconciliation failed, will retry"
            );
            return Outcome::Retry(err.to_string());
        };

        if status == NotificationStatus::Error {
            tracing::error!(
                notification_id = %notification.id,
                purchase_token = redact(&notification.purchase_token),
                error = %err,
                "Reconciliation needs operator attention"
            );
        } else {
            tracing::warn!(
                notification_id = %notification.id,
                purchase_token = redact(&notification.purchase_token),
                error = %err,
                "Reconciliation will not be retried"
            );
        }

        notification.mark(status);
        if let Err(e) = self.notifications.update(notification).await {
            tracing::warn!(
                notification_id = %notification.id,
                error = %e,
                "Failed to record notification status"
            );
            return Outcome::Retry(e.to_string());
        }
        Outcome::Terminal(err.to_string())
    }
}

fn subscription_ref(
    notification: &DeveloperNotification,
) -> Result<SubscriptionRef, ReconciliationError> {
    for (field, value) in [
        ("purchase_token", &notification.purchase_token),
        ("package_name", &notification.package_name),
        ("product_id", &notification.product_id),
    ] {
        if value.trim().is_empty() {
            return Err(ReconciliationError::do_not_retry(
                TerminalReason::MalformedPayload(format!("missing {}", field)),
            ));
        }
    }
    Ok(SubscriptionRef::new(
        &notification.package_name,
        &notification.product_id,
        &notification.purchase_token,
    ))
}

/// Maps a failed state fetch onto the reconciliation error kinds.
pub(crate) fn billing_failure(err: BillingError) -> ReconciliationError {
    match err {
        BillingError::NotFound(_) => {
            ReconciliationError::do_not_retry(TerminalReason::PurchaseNotFound)
        }
        other => ReconciliationError::retryable(other.to_string()),
    }
}

/// Acknowledges the purchase unless the provider already shows it
/// acknowledged. Losing a concurrent acknowledgement race is fine.
pub(crate) async fn acknowledge(
    billing: &dyn BillingVerificationClient,
    enabled: bool,
    subscription: &SubscriptionRef,
    state: &ExternalSubscriptionState,
) -> Result<(), ReconciliationError> {
    if !enabled || state.is_acknowledged() {
        return Ok(());
    }
    match billing.acknowledge(subscription).await {
        Ok(()) => {
            tracing::info!(
                purchase_token = redact(&subscription.purchase_token),
                "Acknowledged purchase"
            );
            Ok(())
        }
        Err(BillingError::AlreadyAcknowledged) => {
            tracing::debug!(
                purchase_token = redact(&subscription.purchase_token),
                "Purchase acknowledged concurrently"
            );
            Ok(())
        }
        Err(e) => Err(billing_failure(e)),
    }
}

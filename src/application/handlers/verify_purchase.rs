//! VerifyPurchaseHandler - Synchronous verification of a client-submitted purchase.
//!
//! Runs the same idempotency checks as the notification path, so whichever
//! of the two reaches the ledger first records the payment and the other
//! converges on it.

use std::sync::Arc;

use serde::Serialize;

use crate::domain::foundation::{PaymentId, SubscriptionId, UserId};
use crate::domain::purchase::{redact, ReconciliationError, TerminalReason};
use crate::ports::{BillingVerificationClient, PurchaseTokenRepository, SubscriptionRef};

use super::reconciliation::{
    acknowledge, billing_failure, LedgerReconciler, PaymentRecorded, PaymentRequest,
};

#[derive(Debug, Clone)]
pub struct VerifyPurchaseCommand {
    pub package_name: String,
    pub product_id: String,
    pub purchase_token: String,
    /// Authenticated caller; takes precedence over user resolution.
    pub user_id: Option<UserId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum VerifyPurchaseResult {
    Verified {
        payment_id: PaymentId,
        subscription_id: SubscriptionId,
    },
    AlreadyRecorded {
        payment_id: PaymentId,
    },
    TrialStarted {
        subscription_id: SubscriptionId,
    },
    /// The provider has not settled the payment yet.
    PaymentPending,
}

pub struct VerifyPurchaseHandler {
    purchase_tokens: Arc<dyn PurchaseTokenRepository>,
    billing: Arc<dyn BillingVerificationClient>,
    reconciler: LedgerReconciler,
}

impl VerifyPurchaseHandler {
    pub fn new(
        purchase_tokens: Arc<dyn PurchaseTokenRepository>,
        billing: Arc<dyn BillingVerificationClient>,
        reconciler: LedgerReconciler,
    ) -> Self {
        Self {
            purchase_tokens,
            billing,
            reconciler,
        }
    }

    pub async fn handle(
        &self,
        cmd: VerifyPurchaseCommand,
    ) -> Result<VerifyPurchaseResult, ReconciliationError> {
        for (field, value) in [
            ("purchase_token", &cmd.purchase_token),
            ("package_name", &cmd.package_name),
            ("product_id", &cmd.product_id),
        ] {
            if value.trim().is_empty() {
                return Err(ReconciliationError::do_not_retry(
                    TerminalReason::MalformedPayload(format!("missing {}", field)),
                ));
            }
        }

        self.purchase_tokens
            .upsert(&cmd.purchase_token, &cmd.package_name, &cmd.product_id)
            .await?;

        let subscription =
            SubscriptionRef::new(&cmd.package_name, &cmd.product_id, &cmd.purchase_token);
        let state = self
            .billing
            .get_subscription(&subscription)
            .await
            .map_err(billing_failure)?;

        if !state.is_payment_confirmed() {
            tracing::info!(
                purchase_token = redact(&cmd.purchase_token),
                "Verified purchase is still pending payment"
            );
            return Ok(VerifyPurchaseResult::PaymentPending);
        }

        let recorded = self
            .reconciler
            .record_payment(PaymentRequest {
                purchase_token: &cmd.purchase_token,
                product_id: &cmd.product_id,
                state: &state,
                notification_id: None,
                user_id: cmd.user_id.clone(),
            })
            .await;

        let result = match recorded {
            Ok(PaymentRecorded::Created {
                payment,
                subscription,
            }) => VerifyPurchaseResult::Verified {
                payment_id: payment.id,
                subscription_id: subscription.id,
            },
            Ok(PaymentRecorded::AlreadyRecorded(payment)) => {
                VerifyPurchaseResult::AlreadyRecorded {
                    payment_id: payment.id,
                }
            }
            Ok(PaymentRecorded::TrialStarted(trial))
            | Ok(PaymentRecorded::TrialAlreadyRecorded(trial)) => {
                VerifyPurchaseResult::TrialStarted {
                    subscription_id: trial.id,
                }
            }
            Err(ReconciliationError::DoNotRetry(
                TerminalReason::DuplicateNotification(_) | TerminalReason::StaleNotification(_),
            )) => self.latest_recorded(&cmd.purchase_token).await?,
            Err(e) => return Err(e),
        };

        acknowledge(
            self.billing.as_ref(),
            self.reconciler.settings().acknowledge_purchases,
            &subscription,
            &state,
        )
        .await?;

        tracing::info!(
            purchase_token = redact(&cmd.purchase_token),
            result = ?result,
            "Verified purchase"
        );
        Ok(result)
    }

    /// The payment that already covers this token, for replays that the
    /// ledger rejected as duplicate or stale.
    async fn latest_recorded(
        &self,
        purchase_token: &str,
    ) -> Result<VerifyPurchaseResult, ReconciliationError> {
        let payment = self
            .reconciler
            .ledger()
            .payments
            .latest_by_purchase_token(purchase_token)
            .await?
            .ok_or_else(|| {
                ReconciliationError::conflict("replay rejected but no payment recorded for token")
            })?;
        Ok(VerifyPurchaseResult::AlreadyRecorded {
            payment_id: payment.id,
        })
    }
}

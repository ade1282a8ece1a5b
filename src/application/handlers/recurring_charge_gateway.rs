//! PlayRecurringChargeGateway - Recurring-charge contract backed by provider state.
//!
//! The provider renews subscriptions on its own. When the host scheduler
//! asks for a charge, the gateway only checks that the renewal is visible
//! and records it in the ledger.

use async_trait::async_trait;
use std::sync::Arc;

use crate::domain::foundation::{DomainError, Timestamp};
use crate::domain::ledger::{Payment, Subscription};
use crate::domain::purchase::{metadata, redact, ExternalSubscriptionState, ReconciliationError};
use crate::ports::{
    BillingError, BillingVerificationClient, ChargeConfirmation, ChargeError,
    DeveloperNotificationRepository, PurchaseTokenRepository, RecurringChargeGateway,
    SubscriptionRef,
};

use super::reconciliation::LedgerReconciler;

/// Subscription covering a charged payment.
enum ChargedSubscription {
    /// Already linked to the payment; only its window moved.
    Reused(Subscription),
    /// Newly stored. The predecessor is chained once the payment is stored.
    Created {
        subscription: Subscription,
        predecessor: Option<Subscription>,
    },
}

pub struct PlayRecurringChargeGateway {
    purchase_tokens: Arc<dyn PurchaseTokenRepository>,
    notifications: Arc<dyn DeveloperNotificationRepository>,
    billing: Arc<dyn BillingVerificationClient>,
    reconciler: LedgerReconciler,
}

impl PlayRecurringChargeGateway {
    pub fn new(
        purchase_tokens: Arc<dyn PurchaseTokenRepository>,
        notifications: Arc<dyn DeveloperNotificationRepository>,
        billing: Arc<dyn BillingVerificationClient>,
        reconciler: LedgerReconciler,
    ) -> Self {
        Self {
            purchase_tokens,
            notifications,
            billing,
            reconciler,
        }
    }

    async fn subscription_ref(&self, charge_token: &str) -> Result<SubscriptionRef, ChargeError> {
        let record = self
            .purchase_tokens
            .find(charge_token)
            .await
            .map_err(repository)?
            .ok_or_else(|| ChargeError::Stop("unknown purchase token".to_string()))?;
        Ok(SubscriptionRef::new(
            &record.package_name,
            &record.product_id,
            &record.token,
        ))
    }

    async fn fetch(&self, charge_token: &str) -> Result<ExternalSubscriptionState, ChargeError> {
        let subscription = self.subscription_ref(charge_token).await?;
        self.billing
            .get_subscription(&subscription)
            .await
            .map_err(|e| ChargeError::Retry(e.to_string()))
    }

    /// Subscription end recorded by the last successful charge.
    async fn previous_end(&self, charge_token: &str) -> Result<Timestamp, ChargeError> {
        let last = self
            .reconciler
            .schedule()
            .last_successful(charge_token)
            .await
            .map_err(reconciliation)?;
        let Some(payment_id) = last.and_then(|c| c.payment_id) else {
            tracing::error!(
                purchase_token = redact(charge_token),
                "No successful recurring charge for token"
            );
            return Err(ChargeError::Retry("no previous successful charge".to_string()));
        };

        let previous = self
            .reconciler
            .ledger()
            .payments
            .find_by_id(&payment_id)
            .await
            .map_err(repository)?;
        match previous {
            Some(previous) => Ok(previous.subscription_end),
            None => {
                tracing::error!(
                    purchase_token = redact(charge_token),
                    payment_id = %payment_id,
                    "Recurring charge points at a missing payment"
                );
                Err(ChargeError::Retry(format!("payment {} not found", payment_id)))
            }
        }
    }

    /// Stores the subscription covering `payment` and links it.
    async fn record_subscription(
        &self,
        charge_token: &str,
        payment: &mut Payment,
    ) -> Result<ChargedSubscription, ChargeError> {
        let subscriptions = &self.reconciler.ledger().subscriptions;

        if let Some(id) = payment.subscription_id {
            if let Some(mut existing) = subscriptions.find_by_id(&id).await.map_err(repository)? {
                existing.start = payment.subscription_start;
                existing.set_end(payment.subscription_end);
                subscriptions.update(&existing).await.map_err(repository)?;
                return Ok(ChargedSubscription::Reused(existing));
            }
        }

        let predecessor = subscriptions
            .latest_for_purchase_token(charge_token)
            .await
            .map_err(repository)?;
        let subscription = Subscription::new(
            payment.user_id.clone(),
            payment.subscription_type.clone(),
            payment.subscription_start,
            payment.subscription_end,
        )
        .for_payment(payment.id);
        subscriptions.create(&subscription).await.map_err(repository)?;
        payment.link_subscription(subscription.id);
        Ok(ChargedSubscription::Created {
            subscription,
            predecessor,
        })
    }

    async fn store_payment(&self, payment: &Payment) -> Result<(), DomainError> {
        let payments = &self.reconciler.ledger().payments;
        if payments.find_by_id(&payment.id).await?.is_some() {
            payments.update(payment).await
        } else {
            payments.create(payment).await
        }
    }
}

#[async_trait]
impl RecurringChargeGateway for PlayRecurringChargeGateway {
    async fn charge(
        &self,
        payment: &Payment,
        charge_token: &str,
    ) -> Result<ChargeConfirmation, ChargeError> {
        let state = self.fetch(charge_token).await?;
        if !state.is_payment_confirmed() {
            return Err(ChargeError::Retry("payment not settled".to_string()));
        }

        let now = Timestamp::now();
        let new_end = state.expiry_secs();
        if !state.auto_renewing && !new_end.is_after(&now) {
            return Err(ChargeError::Stop("subscription no longer renews".to_string()));
        }

        let ledger = self.reconciler.ledger();
        if let Some(order_id) = state.order_id.as_ref() {
            if let Some(existing) = ledger
                .payments
                .find_by_order_id(order_id)
                .await
                .map_err(repository)?
            {
                if existing.id != payment.id {
                    if let Some(subscription_id) = existing.subscription_id {
                        tracing::debug!(
                            order_id = %order_id,
                            payment_id = %existing.id,
                            "Renewal already recorded"
                        );
                        return Ok(ChargeConfirmation {
                            payment: existing,
                            subscription_id,
                        });
                    }
                }
            }
        }

        let previous_end = self.previous_end(charge_token).await?;
        if !new_end.is_after(&previous_end) || !new_end.is_after(&now.truncate_to_secs()) {
            tracing::debug!(
                purchase_token = redact(charge_token),
                previous_end = %previous_end,
                expiry = %new_end,
                "Renewal not visible yet"
            );
            return Err(ChargeError::Retry("renewal not visible yet".to_string()));
        }

        let mut charged = payment.clone();
        charged
            .set_window(previous_end, new_end)
            .map_err(|e| ChargeError::Retry(e.to_string()))?;
        if !charged.is_confirmed() {
            charged
                .confirm()
                .map_err(|e| ChargeError::Stop(e.to_string()))?;
        }
        charged.set_meta(metadata::PURCHASE_TOKEN, charge_token);
        if let Some(order_id) = state.order_id.as_ref() {
            charged.set_meta(metadata::ORDER_ID, order_id.as_str());
        }
        if let Some(latest) = self
            .notifications
            .find_latest_for_token(charge_token)
            .await
            .map_err(repository)?
        {
            charged.set_meta(metadata::DEVELOPER_NOTIFICATION_ID, latest.id.to_string());
        }

        self.reconciler
            .close_grace_period(state.order_id.as_ref())
            .await
            .map_err(reconciliation)?;

        let recorded = self.record_subscription(charge_token, &mut charged).await?;

        if let Err(e) = self.store_payment(&charged).await {
            if let ChargedSubscription::Created { subscription, .. } = &recorded {
                tracing::warn!(
                    subscription_id = %subscription.id,
                    error = %e,
                    "Payment write failed, removing its subscription"
                );
                ledger
                    .subscriptions
                    .delete(&subscription.id)
                    .await
                    .map_err(repository)?;
            }
            return Err(repository(e));
        }

        let subscription = match recorded {
            ChargedSubscription::Reused(subscription) => subscription,
            ChargedSubscription::Created {
                subscription,
                predecessor,
            } => {
                if let Some(mut predecessor) = predecessor {
                    if predecessor.next_subscription_id.is_none() {
                        predecessor.chain_to(subscription.id);
                        ledger
                            .subscriptions
                            .update(&predecessor)
                            .await
                            .map_err(repository)?;
                    }
                }
                subscription
            }
        };

        self.reconciler
            .schedule()
            .complete_with(charge_token, &charged)
            .await
            .map_err(reconciliation)?;

        tracing::info!(
            payment_id = %charged.id,
            purchase_token = redact(charge_token),
            subscription_end = %charged.subscription_end,
            "Confirmed recurring charge"
        );
        Ok(ChargeConfirmation {
            payment: charged,
            subscription_id: subscription.id,
        })
    }

    async fn check_valid(&self, charge_token: &str) -> Result<bool, ChargeError> {
        let subscription = match self.subscription_ref(charge_token).await {
            Ok(subscription) => subscription,
            Err(ChargeError::Stop(_)) => return Ok(false),
            Err(e) => return Err(e),
        };
        match self.billing.get_subscription(&subscription).await {
            Ok(state) => Ok(state.auto_renewing || state.expiry_time.is_after(&Timestamp::now())),
            Err(BillingError::NotFound(_)) => Ok(false),
            Err(e) => Err(ChargeError::Retry(e.to_string())),
        }
    }

    async fn get_subscription_expiration(
        &self,
        charge_token: &str,
    ) -> Result<Timestamp, ChargeError> {
        Ok(self.fetch(charge_token).await?.expiry_secs())
    }
}

fn repository(err: DomainError) -> ChargeError {
    ChargeError::Retry(err.to_string())
}

fn reconciliation(err: ReconciliationError) -> ChargeError {
    if err.is_retryable() {
        ChargeError::Retry(err.to_string())
    } else {
        ChargeError::Stop(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{
        InMemoryLedger, InMemoryNotificationLog, InMemoryPurchaseTokens,
        InMemorySubscriptionTypes, MockBillingClient,
    };
    use crate::application::handlers::reconciliation::{
        LedgerPorts, PaymentRecorded, PaymentRequest, ReconciliationSettings,
    };
    use crate::domain::foundation::UserId;
    use crate::domain::ledger::RecurringChargeState;
    use crate::domain::purchase::test_support::state;
    use crate::domain::purchase::{SubscriptionType, SubscriptionTypeMapping};

    const TOKEN: &str = "tok-gateway";

    struct Fixture {
        ledger: Arc<InMemoryLedger>,
        billing: Arc<MockBillingClient>,
        reconciler: LedgerReconciler,
        gateway: PlayRecurringChargeGateway,
    }

    async fn fixture() -> Fixture {
        let ledger = Arc::new(InMemoryLedger::new());
        let types = Arc::new(InMemorySubscriptionTypes::new());
        types
            .insert(SubscriptionTypeMapping::new(
                "monthly",
                SubscriptionType::new("premium").unwrap(),
            ))
            .await;
        let tokens = Arc::new(InMemoryPurchaseTokens::new());
        tokens
            .upsert(TOKEN, "com.example.app", "monthly")
            .await
            .unwrap();
        let billing = Arc::new(MockBillingClient::new());
        let reconciler = LedgerReconciler::new(
            LedgerPorts {
                payments: ledger.clone(),
                subscriptions: ledger.clone(),
                charges: ledger.clone(),
                users: ledger.clone(),
                subscription_types: types,
            },
            ReconciliationSettings::default(),
        );
        let gateway = PlayRecurringChargeGateway::new(
            tokens,
            Arc::new(InMemoryNotificationLog::new()),
            billing.clone(),
            reconciler.clone(),
        );
        Fixture {
            ledger,
            billing,
            reconciler,
            gateway,
        }
    }

    fn ms(ts: Timestamp) -> i64 {
        ts.as_millis()
    }

    /// Records a first purchase ending in `days` days and returns its payment.
    async fn first_purchase(f: &Fixture, days: i64) -> Payment {
        let start = Timestamp::now().add_days(days - 30);
        let end = Timestamp::now().add_days(days);
        let initial = state("GPA.7", ms(start), ms(end));
        let recorded = f
            .reconciler
            .record_payment(PaymentRequest {
                purchase_token: TOKEN,
                product_id: "monthly",
                state: &initial,
                notification_id: None,
                user_id: Some(UserId::new("user-1").unwrap()),
            })
            .await
            .unwrap();
        match recorded {
            PaymentRecorded::Created { payment, .. } => payment,
            other => panic!("unexpected {:?}", other),
        }
    }

    fn pending_renewal(previous: &Payment) -> Payment {
        Payment::new(
            previous.user_id.clone(),
            previous.subscription_type.clone(),
            previous.subscription_end,
            previous.subscription_end,
        )
    }

    #[tokio::test]
    async fn visible_renewal_is_recorded() {
        let f = fixture().await;
        let first = first_purchase(&f, 1).await;
        let renewed_end = Timestamp::now().add_days(31);
        f.billing
            .set_state(TOKEN, state("GPA.7..0", ms(first.subscription_end), ms(renewed_end)))
            .await;

        let confirmation = f
            .gateway
            .charge(&pending_renewal(&first), TOKEN)
            .await
            .unwrap();

        let payment = confirmation.payment;
        assert!(payment.is_confirmed());
        assert_eq!(payment.subscription_start, first.subscription_end);
        assert_eq!(payment.subscription_end, renewed_end.truncate_to_secs());
        assert_eq!(payment.meta(metadata::ORDER_ID), Some("GPA.7..0"));
        assert_eq!(f.ledger.payment_count().await, 2);
        assert_eq!(f.ledger.subscription_count().await, 2);

        let head = f.ledger.charges().await;
        let active: Vec<_> = head.iter().filter(|c| c.is_active()).collect();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].payment_id, Some(payment.id));
    }

    #[tokio::test]
    async fn charge_closes_grace_period_for_same_order() {
        let f = fixture().await;
        let first = first_purchase(&f, 1).await;
        let mut retrying = state(
            "GPA.7..0",
            ms(first.subscription_end),
            ms(Timestamp::now().add_days(3)),
        );
        retrying.payment_state = Some(crate::domain::purchase::PaymentState::Pending);
        let grace = f
            .reconciler
            .create_grace_period_subscription(TOKEN, "monthly", &retrying)
            .await
            .unwrap()
            .unwrap();

        let renewed_end = Timestamp::now().add_days(31);
        f.billing
            .set_state(TOKEN, state("GPA.7..0", ms(first.subscription_end), ms(renewed_end)))
            .await;
        let confirmation = f
            .gateway
            .charge(&pending_renewal(&first), TOKEN)
            .await
            .unwrap();

        let subscriptions = f.ledger.subscriptions().await;
        assert_eq!(subscriptions.len(), 3);
        let closed = subscriptions.iter().find(|s| s.id == grace.id).unwrap();
        assert_eq!(closed.end, closed.start);
        assert_eq!(closed.start, first.subscription_end);
        assert_eq!(closed.next_subscription_id, Some(confirmation.subscription_id));

        let paid = subscriptions
            .iter()
            .find(|s| s.id == confirmation.subscription_id)
            .unwrap();
        assert_eq!(paid.payment_id, Some(confirmation.payment.id));
        assert_eq!(paid.end, renewed_end.truncate_to_secs());
    }

    #[tokio::test]
    async fn renewal_not_yet_visible_is_retried() {
        let f = fixture().await;
        let first = first_purchase(&f, 1).await;
        f.billing
            .set_state(
                TOKEN,
                state("GPA.7", ms(first.subscription_start), ms(first.subscription_end)),
            )
            .await;

        let err = f
            .gateway
            .charge(&pending_renewal(&first), TOKEN)
            .await
            .unwrap_err();

        assert!(matches!(err, ChargeError::Retry(_)));
        assert_eq!(f.ledger.payment_count().await, 1);
    }

    #[tokio::test]
    async fn pending_payment_is_retried() {
        let f = fixture().await;
        let first = first_purchase(&f, 1).await;
        let mut pending = state("GPA.7..0", ms(first.subscription_end), ms(Timestamp::now().add_days(31)));
        pending.payment_state = Some(crate::domain::purchase::PaymentState::Pending);
        f.billing.set_state(TOKEN, pending).await;

        let err = f
            .gateway
            .charge(&pending_renewal(&first), TOKEN)
            .await
            .unwrap_err();

        assert!(matches!(err, ChargeError::Retry(_)));
    }

    #[tokio::test]
    async fn lapsed_subscription_stops_charging() {
        let f = fixture().await;
        let first = first_purchase(&f, -1).await;
        let mut lapsed = state("GPA.7", ms(first.subscription_start), ms(first.subscription_end));
        lapsed.auto_renewing = false;
        f.billing.set_state(TOKEN, lapsed).await;

        let err = f
            .gateway
            .charge(&pending_renewal(&first), TOKEN)
            .await
            .unwrap_err();

        assert!(matches!(err, ChargeError::Stop(_)));
        assert!(!f.gateway.check_valid(TOKEN).await.unwrap());
    }

    #[tokio::test]
    async fn missing_history_is_retried() {
        let f = fixture().await;
        let renewed = state("GPA.9..0", ms(Timestamp::now()), ms(Timestamp::now().add_days(30)));
        f.billing.set_state(TOKEN, renewed).await;
        let orphan = Payment::new(
            UserId::new("user-1").unwrap(),
            SubscriptionType::new("premium").unwrap(),
            Timestamp::now(),
            Timestamp::now(),
        );

        let err = f.gateway.charge(&orphan, TOKEN).await.unwrap_err();

        assert!(matches!(err, ChargeError::Retry(_)));
        assert!(f
            .ledger
            .charges()
            .await
            .iter()
            .all(|c| c.state != RecurringChargeState::Charged));
    }

    #[tokio::test]
    async fn unknown_token_is_invalid() {
        let f = fixture().await;
        assert!(!f.gateway.check_valid("nope").await.unwrap());
        assert!(matches!(
            f.gateway.get_subscription_expiration("nope").await,
            Err(ChargeError::Stop(_))
        ));
    }

    #[tokio::test]
    async fn expiration_is_whole_seconds() {
        let f = fixture().await;
        f.billing
            .set_state(TOKEN, state("GPA.7", 1_903_548_057_000, 1_906_140_057_999))
            .await;

        let expiry = f.gateway.get_subscription_expiration(TOKEN).await.unwrap();

        assert_eq!(expiry.as_millis(), 1_906_140_057_000);
    }

    #[tokio::test]
    async fn check_expire_is_unsupported() {
        let f = fixture().await;
        assert_eq!(
            f.gateway.check_expire(TOKEN).await,
            Err(ChargeError::Unsupported)
        );
    }
}

//! Shared fixture for integration tests: every port backed by the
//! in-memory adapters, wired like the worker binary wires postgres.

#![allow(dead_code)]

use std::sync::Arc;

use purchase_reconciler::adapters::memory::{
    InMemoryLedger, InMemoryNotificationLog, InMemoryOutbox, InMemoryPurchaseTokens,
    InMemorySubscriptionTypes, MockBillingClient,
};
use purchase_reconciler::application::{
    IngestNotificationHandler, JobRouter, LedgerPorts, LedgerReconciler, ReconciliationHandler,
    ReconciliationSettings, VoidedPurchaseHandler,
};
use purchase_reconciler::domain::foundation::{DeveloperNotificationId, Timestamp};
use purchase_reconciler::domain::purchase::{
    AcknowledgementState, ExternalSubscriptionState, NewDeveloperNotification, NotificationType,
    OrderId, PaymentState, SubscriptionType, SubscriptionTypeMapping,
};
use purchase_reconciler::ports::DeveloperNotificationRepository;

pub const PACKAGE: &str = "com.example.app";
pub const PRODUCT: &str = "monthly";

/// 2030-04-27 19:20:57 UTC
pub const START_MS: i64 = 1_903_548_057_000;
/// 2030-05-27 19:20:57 UTC
pub const END_MS: i64 = 1_906_140_057_000;
pub const DAY_MS: i64 = 86_400_000;

pub struct World {
    pub ledger: Arc<InMemoryLedger>,
    pub log: Arc<InMemoryNotificationLog>,
    pub tokens: Arc<InMemoryPurchaseTokens>,
    pub types: Arc<InMemorySubscriptionTypes>,
    pub outbox: Arc<InMemoryOutbox>,
    pub billing: Arc<MockBillingClient>,
    pub reconciler: LedgerReconciler,
    pub notifications: Arc<ReconciliationHandler>,
    pub voided: Arc<VoidedPurchaseHandler>,
}

impl World {
    pub async fn new() -> Self {
        let ledger = Arc::new(InMemoryLedger::new());
        let log = Arc::new(InMemoryNotificationLog::new());
        let types = Arc::new(InMemorySubscriptionTypes::new());
        types
            .insert(SubscriptionTypeMapping::new(
                PRODUCT,
                SubscriptionType::new("premium_monthly").unwrap(),
            ))
            .await;
        let billing = Arc::new(MockBillingClient::new());

        let reconciler = LedgerReconciler::new(
            LedgerPorts {
                payments: ledger.clone(),
                subscriptions: ledger.clone(),
                charges: ledger.clone(),
                users: ledger.clone(),
                subscription_types: types.clone(),
            },
            ReconciliationSettings::default(),
        );
        let notifications = Arc::new(ReconciliationHandler::new(
            log.clone(),
            billing.clone(),
            reconciler.clone(),
        ));
        let voided = Arc::new(VoidedPurchaseHandler::new(log.clone(), reconciler.clone()));

        Self {
            ledger,
            log,
            tokens: Arc::new(InMemoryPurchaseTokens::new()),
            types,
            outbox: Arc::new(InMemoryOutbox::new()),
            billing,
            reconciler,
            notifications,
            voided,
        }
    }

    pub fn router(&self) -> Arc<JobRouter> {
        Arc::new(JobRouter::new(self.notifications.clone(), self.voided.clone()))
    }

    pub fn ingest_handler(&self) -> IngestNotificationHandler {
        IngestNotificationHandler::new(
            self.tokens.clone(),
            self.log.clone(),
            self.log.clone(),
            self.outbox.clone(),
            chrono::Duration::zero(),
        )
    }

    /// Logs a notification of `kind` for `token` and returns its id.
    pub async fn notify(&self, token: &str, kind: NotificationType) -> DeveloperNotificationId {
        self.log
            .append(NewDeveloperNotification {
                purchase_token: token.to_string(),
                package_name: PACKAGE.to_string(),
                product_id: PRODUCT.to_string(),
                event_time: Timestamp::now(),
                notification_type: kind.code(),
            })
            .await
            .unwrap()
            .id
    }
}

/// Confirmed, auto-renewing, unacknowledged provider state.
pub fn state(order_id: &str, start_ms: i64, expiry_ms: i64) -> ExternalSubscriptionState {
    ExternalSubscriptionState {
        order_id: Some(OrderId::new(order_id).unwrap()),
        start_time: Timestamp::from_millis(start_ms).unwrap(),
        expiry_time: Timestamp::from_millis(expiry_ms).unwrap(),
        auto_renewing: true,
        payment_state: Some(PaymentState::Received),
        cancel_reason: None,
        cancel_survey_result: None,
        user_cancellation_time: None,
        acknowledgement_state: AcknowledgementState::Pending,
        obfuscated_external_account_id: None,
        developer_payload: None,
        linked_purchase_token: None,
    }
}

/// Provider state while a renewal charge is being retried.
pub fn grace_state(order_id: &str, start_ms: i64, expiry_ms: i64) -> ExternalSubscriptionState {
    ExternalSubscriptionState {
        payment_state: Some(PaymentState::Pending),
        ..state(order_id, start_ms, expiry_ms)
    }
}

pub fn secs(millis: i64) -> Timestamp {
    Timestamp::from_millis(millis).unwrap()
}

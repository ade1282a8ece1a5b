//! Ingestion through the job outbox to the ledger, plus convergence of the
//! synchronous verification path with the notification path.

mod common;

use common::{state, World, END_MS, PACKAGE, PRODUCT, START_MS};
use purchase_reconciler::adapters::queue::JobDispatcher;
use purchase_reconciler::application::{
    ReceivedNotification, ReceivedVoidedPurchase, VerifyPurchaseCommand, VerifyPurchaseHandler,
    VerifyPurchaseResult,
};
use purchase_reconciler::domain::ledger::{PaymentStatus, RecurringChargeState};
use purchase_reconciler::domain::purchase::{metadata, NotificationStatus, NotificationType};
use purchase_reconciler::ports::{BillingError, DeveloperNotificationRepository, OutboxStatus, Outcome};

const TOKEN: &str = "tok-dispatch-0001";

fn received(kind: NotificationType) -> ReceivedNotification {
    ReceivedNotification {
        package_name: PACKAGE.to_string(),
        product_id: PRODUCT.to_string(),
        purchase_token: TOKEN.to_string(),
        event_time_millis: START_MS,
        notification_type: kind.code(),
    }
}

fn dispatcher(world: &World) -> JobDispatcher {
    JobDispatcher::new(world.outbox.clone(), world.router())
}

#[tokio::test]
async fn ingested_purchase_is_reconciled_by_dispatcher() {
    let world = World::new().await;
    world.billing.set_state(TOKEN, state("GPA.1", START_MS, END_MS)).await;

    let ingested = world
        .ingest_handler()
        .ingest(received(NotificationType::Purchased))
        .await
        .unwrap();
    assert_eq!(world.outbox.count_with_status(OutboxStatus::Pending).await, 1);
    assert_eq!(world.tokens.count().await, 1);

    assert_eq!(dispatcher(&world).poll_once().await.unwrap(), 1);

    let logged = world
        .log
        .find_by_id(ingested.notification_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(logged.status, NotificationStatus::Processed);
    assert_eq!(world.outbox.count_with_status(OutboxStatus::Published).await, 1);

    let payment = world.ledger.payments().await.remove(0);
    assert_eq!(
        payment.meta(metadata::DEVELOPER_NOTIFICATION_ID),
        Some(ingested.notification_id.to_string().as_str())
    );
}

#[tokio::test]
async fn billing_outage_keeps_job_pending_for_redelivery() {
    let world = World::new().await;
    world
        .billing
        .fail_fetch_with(Some(BillingError::Unavailable("503".to_string())))
        .await;

    let ingested = world
        .ingest_handler()
        .ingest(received(NotificationType::Purchased))
        .await
        .unwrap();
    assert_eq!(dispatcher(&world).poll_once().await.unwrap(), 0);

    let entry = world.outbox.entries().await.remove(0);
    assert_eq!(entry.id, ingested.job_id);
    assert_eq!(entry.status, OutboxStatus::Pending);
    assert_eq!(entry.attempts, 1);
    assert_eq!(world.ledger.payment_count().await, 0);

    let logged = world
        .log
        .find_by_id(ingested.notification_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(logged.status, NotificationStatus::New);
}

#[tokio::test]
async fn voided_purchase_refunds_once() {
    let world = World::new().await;
    world.billing.set_state(TOKEN, state("GPA.1", START_MS, END_MS)).await;
    let ingest = world.ingest_handler();
    ingest.ingest(received(NotificationType::Purchased)).await.unwrap();
    dispatcher(&world).poll_once().await.unwrap();

    let voided = ingest
        .ingest_voided(ReceivedVoidedPurchase {
            purchase_token: TOKEN.to_string(),
            order_id: "GPA.1".to_string(),
            product_type: 1,
            refund_type: 1,
            event_time_millis: START_MS,
        })
        .await
        .unwrap();
    assert_eq!(dispatcher(&world).poll_once().await.unwrap(), 1);

    let payment = world.ledger.payments().await.remove(0);
    assert_eq!(payment.status, PaymentStatus::Refund);
    assert!(payment.meta(metadata::REFUND_DATETIME).is_some());
    let subscription = world.ledger.subscriptions().await.remove(0);
    assert_eq!(subscription.end, subscription.start);
    let charges = world.ledger.charges().await;
    assert!(charges.iter().any(|c| c.state == RecurringChargeState::SystemStop));
    assert!(charges.iter().all(|c| c.state != RecurringChargeState::Active));

    let notes = payment.notes.len();
    let outcome = world.voided.handle(voided.notification_id).await;
    assert_eq!(outcome, Outcome::Processed);
    assert_eq!(world.ledger.payments().await[0].notes.len(), notes);
}

#[tokio::test]
async fn verification_and_notification_converge_on_one_payment() {
    let world = World::new().await;
    world.billing.set_state(TOKEN, state("GPA.1", START_MS, END_MS)).await;

    let verify = VerifyPurchaseHandler::new(
        world.tokens.clone(),
        world.billing.clone(),
        world.reconciler.clone(),
    );
    let verified = verify
        .handle(VerifyPurchaseCommand {
            package_name: PACKAGE.to_string(),
            product_id: PRODUCT.to_string(),
            purchase_token: TOKEN.to_string(),
            user_id: None,
        })
        .await
        .unwrap();
    let VerifyPurchaseResult::Verified { payment_id, .. } = verified else {
        panic!("expected a verified purchase, got {:?}", verified);
    };

    let ingested = world
        .ingest_handler()
        .ingest(received(NotificationType::Purchased))
        .await
        .unwrap();
    dispatcher(&world).poll_once().await.unwrap();

    let logged = world
        .log
        .find_by_id(ingested.notification_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(logged.status, NotificationStatus::DoNotRetry);
    assert_eq!(world.outbox.count_with_status(OutboxStatus::Published).await, 1);

    let payments = world.ledger.payments().await;
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].id, payment_id);
    assert_eq!(world.billing.acknowledge_count(), 1);
}

#[tokio::test]
async fn failed_acknowledgement_is_healed_by_replay() {
    let world = World::new().await;
    world.billing.set_state(TOKEN, state("GPA.1", START_MS, END_MS)).await;
    world
        .billing
        .fail_acknowledge_with(Some(BillingError::Unavailable("503".to_string())))
        .await;

    let first = world.notify(TOKEN, NotificationType::Purchased).await;
    assert!(matches!(
        world.notifications.handle(first).await,
        Outcome::Retry(_)
    ));
    assert_eq!(world.ledger.payment_count().await, 1);

    world.billing.fail_acknowledge_with(None).await;
    world.notifications.handle(first).await;

    assert_eq!(world.ledger.payment_count().await, 1);
    assert_eq!(world.billing.acknowledge_count(), 1);
}

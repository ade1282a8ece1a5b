//! Renewal counting from order id suffixes: offer graduation and backfill
//! use the same rule with a one-period offset.

mod common;

use proptest::prelude::*;

use common::{secs, state, World, DAY_MS, END_MS, PACKAGE, PRODUCT, START_MS};
use purchase_reconciler::application::BackfillRecurringCharges;
use purchase_reconciler::domain::ledger::{Payment, RecurringChargeState};
use purchase_reconciler::domain::purchase::{
    metadata, NotificationType, OrderId, SubscriptionType, SubscriptionTypeMapping,
};
use purchase_reconciler::ports::{Outcome, PaymentRepository, PurchaseTokenRepository};

const TOKEN: &str = "tok-offer-0001";
const MONTH_MS: i64 = 30 * DAY_MS;

fn ty(name: &str) -> SubscriptionType {
    SubscriptionType::new(name).unwrap()
}

proptest! {
    #[test]
    fn suffix_counts_consumed_periods(base in "GPA\\.[0-9]{4}-[0-9]{4}", n in 0u32..500) {
        let original = OrderId::new(base.clone()).unwrap();
        let renewal = OrderId::new(format!("{}..{}", base, n)).unwrap();

        prop_assert_eq!(original.renewal_count(), 0);
        prop_assert_eq!(renewal.renewal_count(), n + 1);
        prop_assert_eq!(renewal.charge_count(), renewal.renewal_count() + 1);
        prop_assert!(renewal.same_purchase(&original));
        prop_assert_eq!(renewal.base(), base.as_str());
    }

    #[test]
    fn graduation_happens_once_offer_window_is_consumed(n in 0u32..20, window in 1u32..6) {
        let mapping = SubscriptionTypeMapping::new(PRODUCT, ty("intro"))
            .with_offer(Some(window), ty("standard"));
        let order = OrderId::new(format!("GPA.1000-2000..{}", n)).unwrap();

        let expected = if n + 1 >= window { "standard" } else { "intro" };
        let resolved = mapping.resolve(Some(&order));
        prop_assert_eq!(resolved.as_str(), expected);
    }

    #[test]
    fn malformed_suffix_counts_as_original(garbage in "[a-z]{1,6}") {
        let order = OrderId::new(format!("GPA.1000-2000..{}", garbage)).unwrap();
        prop_assert_eq!(order.renewal_count(), 0);
        prop_assert_eq!(order.base(), order.as_str());
    }
}

#[tokio::test]
async fn renewals_graduate_from_offer_type() {
    let world = World::new().await;
    world
        .types
        .insert(
            SubscriptionTypeMapping::new(PRODUCT, ty("intro")).with_offer(Some(2), ty("standard")),
        )
        .await;

    let orders = ["GPA.7", "GPA.7..0", "GPA.7..1"];
    for (i, order) in orders.iter().enumerate() {
        let start = START_MS + i as i64 * MONTH_MS;
        world
            .billing
            .set_state(TOKEN, state(order, start, start + MONTH_MS))
            .await;
        let kind = if i == 0 {
            NotificationType::Purchased
        } else {
            NotificationType::Renewed
        };
        let id = world.notify(TOKEN, kind).await;
        assert_eq!(world.notifications.handle(id).await, Outcome::Processed);
    }

    let payments = world.ledger.payments().await;
    let type_of = |order: &str| {
        payments
            .iter()
            .find(|p| p.order_id().map(|o| o.as_str() == order).unwrap_or(false))
            .map(|p| p.subscription_type.as_str().to_string())
            .unwrap()
    };
    assert_eq!(type_of("GPA.7"), "intro");
    assert_eq!(type_of("GPA.7..0"), "intro");
    assert_eq!(type_of("GPA.7..1"), "standard");
}

#[tokio::test]
async fn backfill_rebuilds_schedule_from_payment_history() {
    let world = World::new().await;
    for (i, order) in ["GPA.9", "GPA.9..0"].iter().enumerate() {
        let start = START_MS + i as i64 * MONTH_MS;
        world
            .billing
            .set_state(TOKEN, state(order, start, start + MONTH_MS))
            .await;
        let kind = if i == 0 {
            NotificationType::Purchased
        } else {
            NotificationType::Renewed
        };
        let id = world.notify(TOKEN, kind).await;
        assert_eq!(world.notifications.handle(id).await, Outcome::Processed);
    }

    // A second purchase whose schedule was never recorded.
    let orphan = "tok-offer-orphan";
    world.tokens.upsert(orphan, PACKAGE, PRODUCT).await.unwrap();
    world.tokens.upsert(TOKEN, PACKAGE, PRODUCT).await.unwrap();
    let mut orphan_payment = Payment::new(
        world.ledger.payments().await[0].user_id.clone(),
        ty("premium_monthly"),
        secs(START_MS),
        secs(END_MS),
    )
    .with_meta(metadata::PURCHASE_TOKEN, orphan)
    .with_meta(metadata::ORDER_ID, "GPA.42");
    orphan_payment.confirm().unwrap();
    world.ledger.create(&orphan_payment).await.unwrap();

    let report = BackfillRecurringCharges::new(world.tokens.clone(), world.reconciler.clone())
        .run(None)
        .await
        .unwrap();

    assert_eq!(report.tokens_scanned, 2);
    assert_eq!(report.tokens_backfilled, 1);
    assert!(report.anomalies.is_empty());

    let orphan_history: Vec<_> = world
        .ledger
        .charges()
        .await
        .into_iter()
        .filter(|c| c.charge_token == orphan)
        .collect();
    assert_eq!(orphan_history.len(), 2);
    assert_eq!(orphan_history[0].state, RecurringChargeState::Charged);
    assert_eq!(orphan_history[1].state, RecurringChargeState::Active);
    assert_eq!(orphan_history[1].charge_at, secs(END_MS));
}

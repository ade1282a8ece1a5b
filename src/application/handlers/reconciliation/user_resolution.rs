//! Resolution of the internal user owning a purchase.

use crate::domain::foundation::UserId;
use crate::domain::ledger::User;
use crate::domain::purchase::{
    metadata, redact, ExternalSubscriptionState, OrderId, ReconciliationError, SubscriptionType,
};

use super::LedgerReconciler;

impl LedgerReconciler {
    /// Resolves the owner of `purchase_token`.
    ///
    /// Order: the account id carried by the provider state, the owner of an
    /// earlier payment for the token, a user tagged with the token, and
    /// finally a new anonymous user for this integration.
    pub async fn resolve_user(
        &self,
        state: &ExternalSubscriptionState,
        purchase_token: &str,
    ) -> Result<UserId, ReconciliationError> {
        let external_account_id = state.external_account_id();

        if let Some(account_id) = external_account_id.as_deref() {
            if let Ok(user_id) = UserId::new(account_id) {
                if let Some(user) = self.ledger.users.find_by_id(&user_id).await? {
                    return Ok(user.id);
                }
            }
            if let Some(user) = self
                .ledger
                .users
                .find_by_external_account_id(account_id)
                .await?
            {
                return Ok(user.id);
            }
        }

        if let Some(payment) = self
            .ledger
            .payments
            .latest_by_purchase_token(purchase_token)
            .await?
        {
            return Ok(payment.user_id);
        }

        let mut tagged = self
            .ledger
            .users
            .find_by_metadata(metadata::PURCHASE_TOKEN, purchase_token)
            .await?;
        match tagged.len() {
            0 => {}
            1 => return Ok(tagged.remove(0).id),
            n => {
                tracing::error!(
                    purchase_token = redact(purchase_token),
                    matches = n,
                    "Purchase token is tagged on several users"
                );
                return Err(ReconciliationError::conflict(format!(
                    "{} users tagged with the same purchase token",
                    n
                )));
            }
        }

        let mut user = User::anonymous(self.settings.anonymous_user_realm.clone())
            .with_meta(metadata::PURCHASE_TOKEN, purchase_token);
        user.external_account_id = external_account_id;
        self.ledger.users.create(&user).await?;
        tracing::info!(
            user_id = %user.id,
            purchase_token = redact(purchase_token),
            "Created anonymous user for purchase"
        );
        Ok(user.id)
    }

    /// Internal subscription type for the period started by `order_id`.
    ///
    /// A product without a mapping needs operator attention.
    pub async fn resolve_subscription_type(
        &self,
        product_id: &str,
        order_id: Option<&OrderId>,
    ) -> Result<SubscriptionType, ReconciliationError> {
        let mapping = self
            .ledger
            .subscription_types
            .find_by_product_id(product_id)
            .await?
            .ok_or_else(|| {
                tracing::error!(product_id, "No subscription type mapping for product");
                ReconciliationError::conflict(format!(
                    "No subscription type mapping for product {}",
                    product_id
                ))
            })?;
        Ok(mapping.resolve(order_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{InMemoryLedger, InMemorySubscriptionTypes};
    use crate::application::handlers::reconciliation::{LedgerPorts, ReconciliationSettings};
    use crate::domain::foundation::Timestamp;
    use crate::domain::ledger::Payment;
    use crate::domain::purchase::test_support::state;
    use crate::ports::{PaymentRepository, UserRepository};
    use std::sync::Arc;

    fn reconciler(ledger: &Arc<InMemoryLedger>) -> LedgerReconciler {
        LedgerReconciler::new(
            LedgerPorts {
                payments: ledger.clone(),
                subscriptions: ledger.clone(),
                charges: ledger.clone(),
                users: ledger.clone(),
                subscription_types: Arc::new(InMemorySubscriptionTypes::new()),
            },
            ReconciliationSettings::default(),
        )
    }

    #[tokio::test]
    async fn external_account_id_wins() {
        let ledger = Arc::new(InMemoryLedger::new());
        let mut owner = User::anonymous("google_play");
        owner.external_account_id = Some("acct-1".to_string());
        UserRepository::create(ledger.as_ref(), &owner).await.unwrap();

        let mut s = state("GPA.1", 0, 1_000);
        s.obfuscated_external_account_id = Some("acct-1".to_string());

        let resolved = reconciler(&ledger).resolve_user(&s, "tok").await.unwrap();
        assert_eq!(resolved, owner.id);
    }

    #[tokio::test]
    async fn earlier_payment_owner_is_reused() {
        let ledger = Arc::new(InMemoryLedger::new());
        let owner = UserId::new("owner").unwrap();
        let payment = Payment::new(
            owner.clone(),
            SubscriptionType::new("premium").unwrap(),
            Timestamp::from_millis(0).unwrap(),
            Timestamp::from_millis(1_000).unwrap(),
        )
        .with_meta(metadata::PURCHASE_TOKEN, "tok");
        PaymentRepository::create(ledger.as_ref(), &payment).await.unwrap();

        let resolved = reconciler(&ledger)
            .resolve_user(&state("GPA.1", 0, 1_000), "tok")
            .await
            .unwrap();
        assert_eq!(resolved, owner);
    }

    #[tokio::test]
    async fn ambiguous_token_tag_is_a_conflict() {
        let ledger = Arc::new(InMemoryLedger::new());
        for _ in 0..2 {
            let user = User::anonymous("google_play").with_meta(metadata::PURCHASE_TOKEN, "tok");
            UserRepository::create(ledger.as_ref(), &user).await.unwrap();
        }

        let result = reconciler(&ledger)
            .resolve_user(&state("GPA.1", 0, 1_000), "tok")
            .await;
        assert!(matches!(result, Err(ReconciliationError::Conflict(_))));
    }

    #[tokio::test]
    async fn unknown_purchaser_gets_anonymous_user() {
        let ledger = Arc::new(InMemoryLedger::new());
        let r = reconciler(&ledger);

        let first = r.resolve_user(&state("GPA.1", 0, 1_000), "tok").await.unwrap();
        let second = r.resolve_user(&state("GPA.1", 0, 1_000), "tok").await.unwrap();

        let users = ledger.users().await;
        assert_eq!(users.len(), 1);
        assert!(users[0].is_anonymous);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn missing_mapping_is_a_conflict() {
        let ledger = Arc::new(InMemoryLedger::new());
        let result = reconciler(&ledger)
            .resolve_subscription_type("unknown-product", None)
            .await;
        assert!(matches!(result, Err(ReconciliationError::Conflict(_))));
    }
}

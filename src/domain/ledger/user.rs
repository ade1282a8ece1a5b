//! Ledger user entity.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{Timestamp, UserId};
use crate::domain::purchase::Metadata;

/// Owner of payments and subscriptions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    /// Opaque account id supplied by the client through the billing provider.
    pub external_account_id: Option<String>,
    /// Created by this service before the purchaser claimed an account.
    pub is_anonymous: bool,
    /// Integration scope of anonymous users.
    pub realm: Option<String>,
    pub metadata: Metadata,
    pub created_at: Timestamp,
}

impl User {
    /// Unclaimed user scoped to `realm`, so purchases can proceed without an account.
    pub fn anonymous(realm: impl Into<String>) -> Self {
        Self {
            id: UserId::generate(),
            external_account_id: None,
            is_anonymous: true,
            realm: Some(realm.into()),
            metadata: Metadata::new(),
            created_at: Timestamp::now(),
        }
    }

    pub fn with_meta(mut self, key: &str, value: impl Into<String>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::purchase::metadata;

    #[test]
    fn anonymous_user_is_scoped_to_realm() {
        let user = User::anonymous("google_play").with_meta(metadata::PURCHASE_TOKEN, "tok");

        assert!(user.is_anonymous);
        assert_eq!(user.realm.as_deref(), Some("google_play"));
        assert_eq!(user.metadata.get(metadata::PURCHASE_TOKEN).map(String::as_str), Some("tok"));
    }

    #[test]
    fn anonymous_users_get_distinct_ids() {
        assert_ne!(User::anonymous("r").id, User::anonymous("r").id);
    }
}

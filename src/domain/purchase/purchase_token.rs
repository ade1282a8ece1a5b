//! Purchase token identity anchor.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::Timestamp;

/// Canonical record for one external purchase token.
///
/// Upserted on every sighting so the package/product association always
/// reflects the latest known mapping. Never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseToken {
    pub token: String,
    pub package_name: String,
    pub product_id: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl PurchaseToken {
    pub fn new(
        token: impl Into<String>,
        package_name: impl Into<String>,
        product_id: impl Into<String>,
    ) -> Self {
        let now = Timestamp::now();
        Self {
            token: token.into(),
            package_name: package_name.into(),
            product_id: product_id.into(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Applies a newer sighting of the same token.
    pub fn touch(&mut self, package_name: &str, product_id: &str) {
        self.package_name = package_name.to_string();
        self.product_id = product_id.to_string();
        self.updated_at = Timestamp::now();
    }

    /// Token prefix safe for logs.
    pub fn redacted(&self) -> &str {
        redact(&self.token)
    }
}

/// Returns the loggable prefix of a purchase token.
pub fn redact(token: &str) -> &str {
    match token.char_indices().nth(12) {
        Some((idx, _)) => &token[..idx],
        None => token,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn touch_updates_product_mapping() {
        let mut token = PurchaseToken::new("tok", "com.example.app", "monthly");
        token.touch("com.example.app", "yearly");

        assert_eq!(token.product_id, "yearly");
        assert!(token.updated_at >= token.created_at);
    }

    #[test]
    fn redact_keeps_short_prefix() {
        assert_eq!(redact("abcdefghijklmnopqrstuvwxyz"), "abcdefghijkl");
        assert_eq!(redact("short"), "short");
    }
}

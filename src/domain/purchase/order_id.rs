//! Order identifiers and the renewal suffix convention.
//!
//! The provider issues `GPA.1234-5678-9012-34567` for the original purchase
//! and appends `..0`, `..1`, ... for each renewal of the same subscription.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::foundation::ValidationError;

const RENEWAL_SEPARATOR: &str = "..";

/// External transaction identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(String);

impl OrderId {
    pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(ValidationError::empty_field("order_id"));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Renewal index `N` of a `..N` suffix, if the suffix is well formed.
    pub fn renewal_suffix(&self) -> Option<u32> {
        let (_, suffix) = self.0.rsplit_once(RENEWAL_SEPARATOR)?;
        // The charge count (`n + 2`) must stay representable.
        match suffix.parse::<u32>().ok().filter(|n| n.checked_add(2).is_some()) {
            Some(n) => Some(n),
            None => {
                tracing::warn!(order_id = %self.0, "Ignoring malformed order id renewal suffix");
                None
            }
        }
    }

    /// Order id without its renewal suffix. Shared by every renewal of a purchase.
    pub fn base(&self) -> &str {
        match self.renewal_suffix() {
            Some(_) => self
                .0
                .rsplit_once(RENEWAL_SEPARATOR)
                .map(|(base, _)| base)
                .unwrap_or(&self.0),
            None => &self.0,
        }
    }

    /// Billing periods consumed before this order: 0 for the original
    /// purchase, 1 for `..0`, 2 for `..1`.
    pub fn renewal_count(&self) -> u32 {
        self.renewal_suffix().map(|n| n + 1).unwrap_or(0)
    }

    /// Charges made up to and including this order: 1 for the original
    /// purchase, 2 for `..0`.
    pub fn charge_count(&self) -> u32 {
        self.renewal_count() + 1
    }

    /// True when both orders belong to the same purchase.
    pub fn same_purchase(&self, other: &OrderId) -> bool {
        self.base() == other.base()
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

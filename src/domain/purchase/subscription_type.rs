//! Mapping from external product ids to internal subscription types.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::foundation::ValidationError;

use super::OrderId;

/// Name of the internal subscription type used for free trials.
pub const FREE_SUBSCRIPTION_TYPE: &str = "free";

/// Internal subscription type name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionType(String);

impl SubscriptionType {
    pub fn new(name: impl Into<String>) -> Result<Self, ValidationError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ValidationError::empty_field("subscription_type"));
        }
        Ok(Self(name))
    }

    pub fn free() -> Self {
        Self(FREE_SUBSCRIPTION_TYPE.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Trial subscriptions never receive a payment.
    pub fn is_free(&self) -> bool {
        self.0 == FREE_SUBSCRIPTION_TYPE
    }
}

impl fmt::Display for SubscriptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Product id mapping, optionally with an introductory offer window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionTypeMapping {
    pub product_id: String,
    pub subscription_type: SubscriptionType,
    /// Number of billing periods billed at the offer type. `None` means one.
    pub offer_periods: Option<u32>,
    /// Type billed once the offer window is consumed.
    pub next_subscription_type: Option<SubscriptionType>,
}

impl SubscriptionTypeMapping {
    pub fn new(product_id: impl Into<String>, subscription_type: SubscriptionType) -> Self {
        Self {
            product_id: product_id.into(),
            subscription_type,
            offer_periods: None,
            next_subscription_type: None,
        }
    }

    pub fn with_offer(mut self, offer_periods: Option<u32>, next: SubscriptionType) -> Self {
        self.offer_periods = offer_periods;
        self.next_subscription_type = Some(next);
        self
    }

    pub fn offer_window(&self) -> u32 {
        self.offer_periods.unwrap_or(1)
    }

    /// Subscription type billed for the period started by `order_id`.
    ///
    /// Once the periods consumed before this order reach the offer window,
    /// the post-offer type applies.
    pub fn resolve(&self, order_id: Option<&OrderId>) -> SubscriptionType {
        let Some(next) = &self.next_subscription_type else {
            return self.subscription_type.clone();
        };

        let consumed = order_id.map(OrderId::renewal_count).unwrap_or(0);
        if consumed >= self.offer_window() {
            next.clone()
        } else {
            self.subscription_type.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ty(name: &str) -> SubscriptionType {
        SubscriptionType::new(name).unwrap()
    }

    fn order(s: &str) -> OrderId {
        OrderId::new(s).unwrap()
    }

    #[test]
    fn mapping_without_offer_always_returns_base_type() {
        let mapping = SubscriptionTypeMapping::new("monthly", ty("premium"));
        assert_eq!(mapping.resolve(Some(&order("GPA.X..7"))), ty("premium"));
    }

    #[test]
    fn default_offer_window_is_one_period() {
        let mapping =
            SubscriptionTypeMapping::new("intro", ty("intro")).with_offer(None, ty("premium"));

        assert_eq!(mapping.resolve(Some(&order("GPA.X"))), ty("intro"));
        assert_eq!(mapping.resolve(Some(&order("GPA.X..0"))), ty("premium"));
    }

    #[test]
    fn explicit_offer_window_graduates_after_consumed_periods() {
        let mapping =
            SubscriptionTypeMapping::new("intro", ty("intro")).with_offer(Some(3), ty("premium"));

        assert_eq!(mapping.resolve(Some(&order("GPA.X"))), ty("intro"));
        assert_eq!(mapping.resolve(Some(&order("GPA.X..0"))), ty("intro"));
        assert_eq!(mapping.resolve(Some(&order("GPA.X..1"))), ty("intro"));
        assert_eq!(mapping.resolve(Some(&order("GPA.X..2"))), ty("premium"));
    }

    #[test]
    fn missing_order_id_counts_as_original_purchase() {
        let mapping =
            SubscriptionTypeMapping::new("intro", ty("intro")).with_offer(Some(1), ty("premium"));
        assert_eq!(mapping.resolve(None), ty("intro"));
    }

    #[test]
    fn free_type_is_detected() {
        assert!(SubscriptionType::free().is_free());
        assert!(!ty("premium").is_free());
    }
}

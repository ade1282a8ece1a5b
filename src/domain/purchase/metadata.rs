//! Metadata keys written to payment, subscription and user ledgers.
//!
//! The purchase token plus order id pair is the idempotency key for every
//! payment and grace-period subscription this service creates.

use std::collections::BTreeMap;

/// String key/value metadata attached to a ledger entity.
pub type Metadata = BTreeMap<String, String>;

pub const PURCHASE_TOKEN: &str = "purchase_token";
pub const ORDER_ID: &str = "order_id";
pub const DEVELOPER_NOTIFICATION_ID: &str = "developer_notification_id";
pub const GRACE_PERIOD: &str = "grace_period";
pub const CANCEL_REASON: &str = "cancel_reason";
pub const CANCEL_SURVEY_REASON: &str = "cancel_survey_reason";
pub const CANCEL_SURVEY_USER_INPUT: &str = "cancel_survey_user_input";
pub const CANCEL_DATETIME: &str = "cancel_datetime";
pub const RESTART_DATETIME: &str = "restart_datetime";
pub const REFUND_DATETIME: &str = "refund_datetime";
pub const ARTICLE_ID: &str = "article_id";

pub const FLAG_TRUE: &str = "true";

/// Returns true when the metadata marks a grace-period subscription.
pub fn is_grace_period(meta: &Metadata) -> bool {
    meta.get(GRACE_PERIOD).map(String::as_str) == Some(FLAG_TRUE)
}

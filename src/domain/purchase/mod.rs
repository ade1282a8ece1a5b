//! Purchase module - External purchase lifecycle vocabulary.
//!
//! Purchase tokens, the developer and voided-purchase notification logs,
//! the provider's subscription state, order ids and product mappings.

mod errors;
mod external_state;
pub mod metadata;
mod notification;
mod notification_type;
mod order_id;
mod purchase_token;
mod subscription_type;

pub use errors::{ReconciliationError, TerminalReason};
pub use external_state::{
    AcknowledgementState, CancelCode, CancelSurveyResult, CancellationReason,
    ExternalSubscriptionState, PaymentState, SurveyReason,
};
pub use metadata::Metadata;
pub use notification::{
    DeveloperNotification, NewDeveloperNotification, NewVoidedPurchaseNotification,
    NotificationStatus, ProductType, RefundType, VoidedPurchaseNotification,
};
pub use notification_type::{NotificationType, UnknownNotificationType};
pub use order_id::OrderId;
pub use purchase_token::{redact, PurchaseToken};
pub use subscription_type::{SubscriptionType, SubscriptionTypeMapping, FREE_SUBSCRIPTION_TYPE};

#[cfg(test)]
pub(crate) use external_state::test_support;

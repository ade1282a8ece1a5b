//! Developer notification log entries.
//!
//! Every lifecycle event received from the billing provider is appended here
//! before any processing happens. Deduplication happens during reconciliation,
//! not at ingestion, so the log may hold several rows for the same event.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{
    DeveloperNotificationId, StateMachine, Timestamp, VoidedPurchaseNotificationId,
};

use super::{NotificationType, UnknownNotificationType};

/// Processing status of a developer notification.
///
/// Monotonic: nothing ever returns to `New`. A notification that ended in
/// `Error` or `DoNotRetry` may be replayed by an operator and move again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
    New,
    Processed,
    Error,
    DoNotRetry,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationStatus::New => "new",
            NotificationStatus::Processed => "processed",
            NotificationStatus::Error => "error",
            NotificationStatus::DoNotRetry => "do_not_retry",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "new" => Some(NotificationStatus::New),
            "processed" => Some(NotificationStatus::Processed),
            "error" => Some(NotificationStatus::Error),
            "do_not_retry" => Some(NotificationStatus::DoNotRetry),
            _ => None,
        }
    }
}

impl StateMachine for NotificationStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        use NotificationStatus::*;
        matches!(
            (self, target),
            (New, Processed)
                | (New, Error)
                | (New, DoNotRetry)
                | (Error, Processed)
                | (Error, Error)
                | (Error, DoNotRetry)
                | (DoNotRetry, Processed)
                | (DoNotRetry, Error)
                | (DoNotRetry, DoNotRetry)
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use NotificationStatus::*;
        match self {
            New | Error | DoNotRetry => vec![Processed, Error, DoNotRetry],
            Processed => vec![],
        }
    }
}

/// A received lifecycle event, ready to be appended to the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDeveloperNotification {
    pub purchase_token: String,
    pub package_name: String,
    pub product_id: String,
    pub event_time: Timestamp,
    pub notification_type: i32,
}

/// One logged developer notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeveloperNotification {
    pub id: DeveloperNotificationId,
    pub purchase_token: String,
    pub package_name: String,
    pub product_id: String,
    pub event_time: Timestamp,
    /// Raw provider code; unknown codes are kept so they can be reported.
    pub notification_type: i32,
    pub status: NotificationStatus,
    /// Authoritative subscription state fetched while processing.
    pub subscription_snapshot: Option<serde_json::Value>,
    pub created_at: Timestamp,
    pub modified_at: Timestamp,
}

impl DeveloperNotification {
    pub fn from_new(id: DeveloperNotificationId, new: NewDeveloperNotification) -> Self {
        let now = Timestamp::now();
        Self {
            id,
            purchase_token: new.purchase_token,
            package_name: new.package_name,
            product_id: new.product_id,
            event_time: new.event_time,
            notification_type: new.notification_type,
            status: NotificationStatus::New,
            subscription_snapshot: None,
            created_at: now,
            modified_at: now,
        }
    }

    pub fn kind(&self) -> Result<NotificationType, UnknownNotificationType> {
        NotificationType::from_code(self.notification_type)
    }

    /// Moves the status forward. Invalid transitions leave the row untouched.
    pub fn mark(&mut self, status: NotificationStatus) -> bool {
        match self.status.transition_to(status) {
            Ok(next) => {
                self.status = next;
                self.modified_at = Timestamp::now();
                true
            }
            Err(_) => false,
        }
    }

    pub fn attach_snapshot(&mut self, snapshot: serde_json::Value) {
        self.subscription_snapshot = Some(snapshot);
        self.modified_at = Timestamp::now();
    }
}

/// Refund scope reported with a voided purchase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefundType {
    FullRefund,
    QuantityBasedPartialRefund,
    Unknown,
}

impl RefundType {
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => RefundType::FullRefund,
            2 => RefundType::QuantityBasedPartialRefund,
            _ => RefundType::Unknown,
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            RefundType::FullRefund => 1,
            RefundType::QuantityBasedPartialRefund => 2,
            RefundType::Unknown => 0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RefundType::FullRefund => "full refund",
            RefundType::QuantityBasedPartialRefund => "partial refund",
            RefundType::Unknown => "unknown refund",
        }
    }
}

/// Product kind reported with a voided purchase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductType {
    Subscription,
    OneTime,
    Unknown,
}

impl ProductType {
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => ProductType::Subscription,
            2 => ProductType::OneTime,
            _ => ProductType::Unknown,
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            ProductType::Subscription => 1,
            ProductType::OneTime => 2,
            ProductType::Unknown => 0,
        }
    }
}

/// A received void/refund event, ready to be appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewVoidedPurchaseNotification {
    pub purchase_token: String,
    pub order_id: String,
    pub product_type: ProductType,
    pub refund_type: RefundType,
    pub event_time: Timestamp,
}

/// Append-only record of a void/refund event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoidedPurchaseNotification {
    pub id: VoidedPurchaseNotificationId,
    pub purchase_token: String,
    pub order_id: String,
    pub product_type: ProductType,
    pub refund_type: RefundType,
    pub event_time: Timestamp,
    pub created_at: Timestamp,
}

impl VoidedPurchaseNotification {
    pub fn from_new(id: VoidedPurchaseNotificationId, new: NewVoidedPurchaseNotification) -> Self {
        Self {
            id,
            purchase_token: new.purchase_token,
            order_id: new.order_id,
            product_type: new.product_type,
            refund_type: new.refund_type,
            event_time: new.event_time,
            created_at: Timestamp::now(),
        }
    }
}

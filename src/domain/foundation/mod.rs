//! Foundation module - Shared domain primitives.
//!
//! Contains identifiers, timestamps, the state machine trait and error types
//! that form the vocabulary of the reconciliation domain.

mod errors;
mod ids;
mod state_machine;
mod timestamp;

pub use errors::{DomainError, ErrorCode, ValidationError};
pub use ids::{
    DeveloperNotificationId, PaymentId, RecurringChargeId, SubscriptionId, UserId,
    VoidedPurchaseNotificationId,
};
pub use state_machine::StateMachine;
pub use timestamp::Timestamp;

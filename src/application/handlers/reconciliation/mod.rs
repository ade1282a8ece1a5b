//! Notification reconciliation engine.
//!
//! `LedgerReconciler` holds the ledger mutations and idempotency checks
//! shared by every entry point; `ReconciliationHandler` drives them for
//! logged developer notifications.

mod cancel_subscription;
mod create_payment;
mod grace_period;
mod handler;
mod ledger;
mod schedule;
mod user_resolution;

pub use create_payment::{PaymentRecorded, PaymentRequest};
pub use handler::ReconciliationHandler;
pub use ledger::{LedgerPorts, LedgerReconciler, ReconciliationSettings};
pub use schedule::RecurringSchedule;

pub(crate) use create_payment::display_order;
pub(crate) use handler::{acknowledge, billing_failure};

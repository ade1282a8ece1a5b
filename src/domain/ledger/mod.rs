//! Ledger module - Payments, subscriptions, recurring charges and users.

mod payment;
mod recurring_charge;
mod subscription;
mod user;

pub use payment::{Payment, PaymentStatus};
pub use recurring_charge::{RecurringCharge, RecurringChargeState};
pub use subscription::Subscription;
pub use user::User;

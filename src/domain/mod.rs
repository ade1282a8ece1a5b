//! Domain layer containing business logic and domain types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared domain primitives (IDs, timestamps, errors, state machines)
//! - `purchase` - Purchase tokens, notification logs and provider subscription state
//! - `ledger` - Payments, subscriptions, recurring-charge schedules and users

pub mod foundation;
pub mod ledger;
pub mod purchase;

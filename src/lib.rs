//! Purchase Reconciler - Mobile subscription notification reconciliation
//!
//! This crate reconciles lifecycle events from an external billing provider
//! with an internal ledger of payments, subscriptions and recurring-charge
//! schedules, converging every entry point on one idempotent view per
//! purchase token.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;

//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the domain and the outside world. Adapters implement these ports.
//!
//! ## Store Ports
//!
//! - `PurchaseTokenRepository` - Identity anchor per purchase token
//! - `DeveloperNotificationRepository` / `VoidedPurchaseRepository` - Notification logs
//! - `SubscriptionTypeRepository` - Product id mappings
//! - `PaymentRepository`, `SubscriptionRepository`, `RecurringChargeRepository`,
//!   `UserRepository` - The host ledger
//!
//! ## External Ports
//!
//! - `BillingVerificationClient` - Authoritative subscription state
//! - `RecurringChargeGateway` - Contract offered to the recurring-billing scheduler
//!
//! ## Queue Ports
//!
//! - `OutboxWriter` - Durable job queue with delayed delivery
//! - `JobHandler` - Consumer of queued jobs

mod billing_client;
mod job_handler;
mod ledger_repository;
mod notification_repository;
mod outbox_writer;
mod purchase_token_repository;
mod recurring_charge_gateway;
mod subscription_type_repository;

pub use billing_client::{BillingError, BillingVerificationClient, SubscriptionRef};
pub use job_handler::{JobHandler, Outcome};
pub use ledger_repository::{
    PaymentRepository, RecurringChargeRepository, SubscriptionRepository, UserRepository,
};
pub use notification_repository::{DeveloperNotificationRepository, VoidedPurchaseRepository};
pub use outbox_writer::{JobMessage, OutboxEntry, OutboxStatus, OutboxWriter};
pub use purchase_token_repository::PurchaseTokenRepository;
pub use recurring_charge_gateway::{ChargeConfirmation, ChargeError, RecurringChargeGateway};
pub use subscription_type_repository::SubscriptionTypeRepository;

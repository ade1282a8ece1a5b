//! In-process implementations of every port, for tests and local runs.

mod billing;
mod ledger;
mod outbox;
mod stores;

pub use billing::MockBillingClient;
pub use ledger::InMemoryLedger;
pub use outbox::InMemoryOutbox;
pub use stores::{InMemoryNotificationLog, InMemoryPurchaseTokens, InMemorySubscriptionTypes};

//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the domain to external systems:
//! - `google_play` - Billing verification over the Android Publisher API
//! - `memory` - In-process stores and a mock billing client
//! - `postgres` - sqlx-backed stores and the job outbox
//! - `queue` - Outbox-polling job dispatcher

pub mod google_play;
pub mod memory;
pub mod postgres;
pub mod queue;

pub use google_play::{AccessTokenSource, GooglePlayBillingClient};
pub use memory::{
    InMemoryLedger, InMemoryNotificationLog, InMemoryOutbox, InMemoryPurchaseTokens,
    InMemorySubscriptionTypes, MockBillingClient,
};
pub use queue::{JobDispatcher, JobDispatcherConfig};

//! Application handlers.
//!
//! Handlers that orchestrate domain operations for each entry point:
//!
//! ## Ingestion
//! - Logging received notifications and queueing their processing
//!
//! ## Jobs
//! - Reconciling developer notifications against provider state
//! - Applying voided purchases
//! - Routing outbox jobs to the handlers above
//!
//! ## Synchronous entry points
//! - Purchase verification submitted by the client
//! - Recurring-charge gateway called by the host scheduler
//!
//! ## Maintenance
//! - Backfilling recurring-charge history

mod backfill_recurring_charges;
mod ingest_notification;
mod job_router;
pub mod reconciliation;
mod recurring_charge_gateway;
mod verify_purchase;
mod voided_purchase;

// Ingestion
pub use ingest_notification::{
    IngestNotificationHandler, IngestResult, ReceivedNotification, ReceivedVoidedPurchase,
};

// Jobs
pub use job_router::JobRouter;
pub use reconciliation::{
    LedgerPorts, LedgerReconciler, PaymentRecorded, PaymentRequest, ReconciliationHandler,
    ReconciliationSettings, RecurringSchedule,
};
pub use voided_purchase::VoidedPurchaseHandler;

// Synchronous entry points
pub use recurring_charge_gateway::PlayRecurringChargeGateway;
pub use verify_purchase::{VerifyPurchaseCommand, VerifyPurchaseHandler, VerifyPurchaseResult};

// Maintenance
pub use backfill_recurring_charges::{BackfillRecurringCharges, BackfillReport};

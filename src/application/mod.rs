//! Application layer - Handlers for every entry point.
//!
//! This layer orchestrates domain operations and coordinates between ports.
//! The notification, verification, void and gateway paths share one
//! `LedgerReconciler`, so they converge on the same ledger state.

pub mod handlers;

pub use handlers::{
    // Ingestion
    IngestNotificationHandler, IngestResult, ReceivedNotification, ReceivedVoidedPurchase,
    // Jobs
    JobRouter, ReconciliationHandler, VoidedPurchaseHandler,
    // Reconciliation core
    LedgerPorts, LedgerReconciler, PaymentRecorded, PaymentRequest, ReconciliationSettings,
    RecurringSchedule,
    // Synchronous entry points
    PlayRecurringChargeGateway, VerifyPurchaseCommand, VerifyPurchaseHandler,
    VerifyPurchaseResult,
    // Maintenance
    BackfillRecurringCharges, BackfillReport,
};

//! Reconciliation worker.
//!
//! `purchase-reconciler` drains the job outbox until Ctrl-C.
//! `purchase-reconciler backfill [AS_OF]` rebuilds missing recurring-charge
//! history for tokens last updated at or before `AS_OF` (RFC 3339 or
//! `YYYY-MM-DD`, default now) and exits.

use std::error::Error;
use std::sync::Arc;

use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use purchase_reconciler::adapters::google_play::GooglePlayBillingClient;
use purchase_reconciler::adapters::postgres::{
    self, PostgresNotificationLog, PostgresOutbox, PostgresPaymentRepository,
    PostgresPurchaseTokenRepository, PostgresRecurringChargeRepository,
    PostgresSubscriptionRepository, PostgresSubscriptionTypeRepository, PostgresUserRepository,
};
use purchase_reconciler::adapters::queue::JobDispatcher;
use purchase_reconciler::application::{
    BackfillRecurringCharges, JobRouter, LedgerPorts, LedgerReconciler, ReconciliationHandler,
    VoidedPurchaseHandler,
};
use purchase_reconciler::config::{AppConfig, LogFormat, WorkerConfig};
use purchase_reconciler::domain::foundation::Timestamp;

fn init_tracing(worker: &WorkerConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&worker.log_level));
    let registry = tracing_subscriber::registry().with(filter);

    match worker.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let config = AppConfig::load()?;
    config.validate()?;
    init_tracing(&config.worker);

    tracing::info!(environment = ?config.worker.environment, "Starting purchase reconciler");

    let pool = postgres::connect(&config.database).await?;
    if config.database.run_migrations {
        postgres::run_migrations(&pool).await?;
    }

    let purchase_tokens = Arc::new(PostgresPurchaseTokenRepository::new(pool.clone()));
    let notification_log = Arc::new(PostgresNotificationLog::new(pool.clone()));
    let outbox = Arc::new(PostgresOutbox::new(pool.clone()));
    let ledger = LedgerPorts {
        payments: Arc::new(PostgresPaymentRepository::new(pool.clone())),
        subscriptions: Arc::new(PostgresSubscriptionRepository::new(pool.clone())),
        charges: Arc::new(PostgresRecurringChargeRepository::new(pool.clone())),
        users: Arc::new(PostgresUserRepository::new(pool.clone())),
        subscription_types: Arc::new(PostgresSubscriptionTypeRepository::new(pool.clone())),
    };
    let reconciler = LedgerReconciler::new(ledger, config.billing.reconciliation_settings());

    let mut args = std::env::args().skip(1);
    if args.next().as_deref() == Some("backfill") {
        let as_of = args
            .next()
            .map(|raw| Timestamp::parse("as_of", &raw))
            .transpose()?;
        tracing::info!(as_of = ?as_of.map(|t| t.to_string()), "Running recurring charge backfill");
        let report = BackfillRecurringCharges::new(purchase_tokens, reconciler)
            .run(as_of)
            .await?;
        tracing::info!(
            tokens_scanned = report.tokens_scanned,
            tokens_backfilled = report.tokens_backfilled,
            charges_created = report.charges_created,
            anomalies = report.anomalies.len(),
            "Backfill finished"
        );
        return Ok(());
    }

    let billing = Arc::new(GooglePlayBillingClient::from_config(&config.billing)?);
    let notifications = Arc::new(ReconciliationHandler::new(
        notification_log.clone(),
        billing,
        reconciler.clone(),
    ));
    let voided = Arc::new(VoidedPurchaseHandler::new(notification_log, reconciler));
    let router = Arc::new(JobRouter::new(notifications, voided));

    let dispatcher = JobDispatcher::with_config(outbox, router, config.worker.dispatcher_config());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown requested");
        }
        let _ = shutdown_tx.send(true);
    });

    dispatcher.run(shutdown_rx).await;
    tracing::info!("Purchase reconciler stopped");
    Ok(())
}

//! BackfillRecurringCharges - Rebuilds missing recurring-charge history.
//!
//! Tokens recorded before schedules were maintained, or whose processing
//! crashed before scheduling, have payments but no charge history. The
//! backfill derives one from the payments.

use serde::Serialize;
use std::sync::Arc;

use crate::domain::foundation::{DomainError, Timestamp};
use crate::domain::ledger::RecurringCharge;
use crate::domain::purchase::redact;
use crate::ports::PurchaseTokenRepository;

use super::reconciliation::LedgerReconciler;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BackfillReport {
    pub tokens_scanned: usize,
    pub tokens_backfilled: usize,
    pub charges_created: usize,
    /// Tokens whose payment count disagrees with their order id suffix.
    pub anomalies: Vec<String>,
}

pub struct BackfillRecurringCharges {
    purchase_tokens: Arc<dyn PurchaseTokenRepository>,
    reconciler: LedgerReconciler,
}

impl BackfillRecurringCharges {
    pub fn new(
        purchase_tokens: Arc<dyn PurchaseTokenRepository>,
        reconciler: LedgerReconciler,
    ) -> Self {
        Self {
            purchase_tokens,
            reconciler,
        }
    }

    /// Backfills every token last updated at or before `as_of` (default now).
    pub async fn run(&self, as_of: Option<Timestamp>) -> Result<BackfillReport, DomainError> {
        let as_of = as_of.unwrap_or_else(Timestamp::now);
        let mut report = BackfillReport::default();

        for record in self.purchase_tokens.list_updated_before(&as_of).await? {
            report.tokens_scanned += 1;
            let created = self.backfill_token(&record.token, &as_of, &mut report).await?;
            if created > 0 {
                report.tokens_backfilled += 1;
                report.charges_created += created;
            }
        }

        tracing::info!(
            tokens_scanned = report.tokens_scanned,
            tokens_backfilled = report.tokens_backfilled,
            charges_created = report.charges_created,
            anomalies = report.anomalies.len(),
            "Recurring charge backfill finished"
        );
        Ok(report)
    }

    async fn backfill_token(
        &self,
        token: &str,
        as_of: &Timestamp,
        report: &mut BackfillReport,
    ) -> Result<usize, DomainError> {
        let ledger = self.reconciler.ledger();
        if !ledger.charges.history(token).await?.is_empty() {
            return Ok(0);
        }

        let mut payments = ledger.payments.list_by_purchase_token(token).await?;
        if payments.is_empty() {
            return Ok(0);
        }
        payments.reverse();

        let mut previous = None;
        let mut created = 0;
        for payment in &payments {
            let charged =
                RecurringCharge::charged(token, payment.id, payment.subscription_start, previous);
            ledger.charges.create(&charged).await?;
            previous = Some(charged.id);
            created += 1;
        }

        let Some(latest) = payments.last() else {
            return Ok(created);
        };

        if let Some(order_id) = latest.order_id() {
            let expected = order_id.charge_count() as usize;
            if expected != payments.len() {
                tracing::error!(
                    purchase_token = redact(token),
                    order_id = %order_id,
                    expected,
                    recorded = payments.len(),
                    "Payment count disagrees with order id"
                );
                report.anomalies.push(format!(
                    "{}: order {} implies {} charges, {} recorded",
                    redact(token),
                    order_id,
                    expected,
                    payments.len()
                ));
            }
        }

        if latest.is_confirmed() && latest.subscription_end.is_after(as_of) {
            let next = RecurringCharge::scheduled(
                token,
                latest.id,
                latest.subscription_end,
                self.reconciler.settings().recurring_retry_budget,
                previous,
            );
            ledger.charges.create(&next).await?;
            created += 1;
        }

        tracing::info!(
            purchase_token = redact(token),
            charges = created,
            "Backfilled recurring charges"
        );
        Ok(created)
    }
}

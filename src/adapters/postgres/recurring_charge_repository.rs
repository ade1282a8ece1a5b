//! PostgreSQL implementation of RecurringChargeRepository.
//!
//! History order comes from the `seq` column, not from timestamps, so
//! entries appended within the same instant keep their order.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::foundation::{
    DomainError, ErrorCode, PaymentId, RecurringChargeId, Timestamp,
};
use crate::domain::ledger::{RecurringCharge, RecurringChargeState};
use crate::ports::RecurringChargeRepository;

use super::db_error;

pub struct PostgresRecurringChargeRepository {
    pool: PgPool,
}

impl PostgresRecurringChargeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct RecurringChargeRow {
    id: Uuid,
    charge_token: String,
    state: String,
    charge_at: DateTime<Utc>,
    retries_left: i32,
    payment_id: Option<Uuid>,
    previous_id: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<RecurringChargeRow> for RecurringCharge {
    type Error = DomainError;

    fn try_from(row: RecurringChargeRow) -> Result<Self, Self::Error> {
        let state = RecurringChargeState::parse(&row.state).ok_or_else(|| {
            DomainError::new(
                ErrorCode::DatabaseError,
                format!("Invalid recurring charge state: {}", row.state),
            )
        })?;

        Ok(RecurringCharge {
            id: RecurringChargeId::from_uuid(row.id),
            charge_token: row.charge_token,
            state,
            charge_at: Timestamp::from_datetime(row.charge_at),
            retries_left: u32::try_from(row.retries_left).unwrap_or(0),
            payment_id: row.payment_id.map(PaymentId::from_uuid),
            previous_id: row.previous_id.map(RecurringChargeId::from_uuid),
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
        })
    }
}

const COLUMNS: &str =
    "id, charge_token, state, charge_at, retries_left, payment_id, previous_id, created_at, updated_at";

#[async_trait]
impl RecurringChargeRepository for PostgresRecurringChargeRepository {
    async fn create(&self, charge: &RecurringCharge) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO recurring_charges (
                id, charge_token, state, charge_at, retries_left, payment_id, previous_id,
                created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(charge.id.as_uuid())
        .bind(&charge.charge_token)
        .bind(charge.state.as_str())
        .bind(charge.charge_at.as_datetime())
        .bind(i32::try_from(charge.retries_left).unwrap_or(i32::MAX))
        .bind(charge.payment_id.map(|id| *id.as_uuid()))
        .bind(charge.previous_id.map(|id| *id.as_uuid()))
        .bind(charge.created_at.as_datetime())
        .bind(charge.updated_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to create recurring charge", e))?;

        Ok(())
    }

    async fn update(&self, charge: &RecurringCharge) -> Result<(), DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE recurring_charges SET
                state = $2,
                charge_at = $3,
                retries_left = $4,
                payment_id = $5,
                updated_at = $6
            WHERE id = $1
            "#,
        )
        .bind(charge.id.as_uuid())
        .bind(charge.state.as_str())
        .bind(charge.charge_at.as_datetime())
        .bind(i32::try_from(charge.retries_left).unwrap_or(i32::MAX))
        .bind(charge.payment_id.map(|id| *id.as_uuid()))
        .bind(charge.updated_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to update recurring charge", e))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::new(
                ErrorCode::RecurringChargeNotFound,
                "Recurring charge not found",
            )
            .with_detail("recurring_charge_id", charge.id.to_string()));
        }

        Ok(())
    }

    async fn history(&self, charge_token: &str) -> Result<Vec<RecurringCharge>, DomainError> {
        let rows: Vec<RecurringChargeRow> = sqlx::query_as(&format!(
            "SELECT {} FROM recurring_charges WHERE charge_token = $1 ORDER BY seq DESC",
            COLUMNS
        ))
        .bind(charge_token)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to load recurring charge history", e))?;

        rows.into_iter().map(RecurringCharge::try_from).collect()
    }

    async fn latest(&self, charge_token: &str) -> Result<Option<RecurringCharge>, DomainError> {
        let row: Option<RecurringChargeRow> = sqlx::query_as(&format!(
            "SELECT {} FROM recurring_charges WHERE charge_token = $1 ORDER BY seq DESC LIMIT 1",
            COLUMNS
        ))
        .bind(charge_token)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to find recurring charge", e))?;

        row.map(RecurringCharge::try_from).transpose()
    }

    async fn latest_in_state(
        &self,
        charge_token: &str,
        state: RecurringChargeState,
    ) -> Result<Option<RecurringCharge>, DomainError> {
        let row: Option<RecurringChargeRow> = sqlx::query_as(&format!(
            r#"
            SELECT {} FROM recurring_charges
            WHERE charge_token = $1 AND state = $2
            ORDER BY seq DESC
            LIMIT 1
            "#,
            COLUMNS
        ))
        .bind(charge_token)
        .bind(state.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to find recurring charge", e))?;

        row.map(RecurringCharge::try_from).transpose()
    }
}

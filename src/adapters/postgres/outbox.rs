//! PostgreSQL implementation of the job outbox.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::foundation::{DomainError, ErrorCode};
use crate::ports::{JobMessage, OutboxEntry, OutboxStatus, OutboxWriter};

use super::db_error;

pub struct PostgresOutbox {
    pool: PgPool,
}

impl PostgresOutbox {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OutboxRow {
    id: Uuid,
    message: serde_json::Value,
    status: String,
    created_at: DateTime<Utc>,
    available_at: DateTime<Utc>,
    processed_at: Option<DateTime<Utc>>,
    attempts: i32,
    last_error: Option<String>,
}

impl TryFrom<OutboxRow> for OutboxEntry {
    type Error = DomainError;

    fn try_from(row: OutboxRow) -> Result<Self, Self::Error> {
        let message: JobMessage = serde_json::from_value(row.message).map_err(|e| {
            DomainError::new(ErrorCode::DatabaseError, format!("Invalid job message: {}", e))
        })?;
        let status = OutboxStatus::parse(&row.status).ok_or_else(|| {
            DomainError::new(
                ErrorCode::DatabaseError,
                format!("Invalid outbox status: {}", row.status),
            )
        })?;

        Ok(OutboxEntry {
            id: row.id,
            message,
            status,
            created_at: row.created_at,
            available_at: row.available_at,
            processed_at: row.processed_at,
            attempts: u32::try_from(row.attempts).unwrap_or(0),
            last_error: row.last_error,
        })
    }
}

impl PostgresOutbox {
    async fn finish(
        &self,
        id: Uuid,
        status: OutboxStatus,
        error: Option<&str>,
        available_at: Option<DateTime<Utc>>,
    ) -> Result<(), DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE job_outbox SET
                status = $2,
                last_error = COALESCE($3, last_error),
                available_at = COALESCE($4, available_at),
                processed_at = NOW(),
                attempts = attempts + 1
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .bind(error)
        .bind(available_at)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to update outbox entry", e))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::new(ErrorCode::InternalError, "Outbox entry not found")
                .with_detail("outbox_id", id.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl OutboxWriter for PostgresOutbox {
    async fn write(
        &self,
        message: &JobMessage,
        available_at: DateTime<Utc>,
    ) -> Result<OutboxEntry, DomainError> {
        let entry = OutboxEntry::new(message.clone(), available_at);
        let payload = serde_json::to_value(&entry.message).map_err(|e| {
            DomainError::new(ErrorCode::InternalError, format!("Failed to encode job: {}", e))
        })?;

        sqlx::query(
            r#"
            INSERT INTO job_outbox (id, job, message, status, created_at, available_at, attempts)
            VALUES ($1, $2, $3, $4, $5, $6, 0)
            "#,
        )
        .bind(entry.id)
        .bind(entry.message.kind())
        .bind(payload)
        .bind(entry.status.as_str())
        .bind(entry.created_at)
        .bind(entry.available_at)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to write outbox entry", e))?;

        Ok(entry)
    }

    async fn get_due(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<OutboxEntry>, DomainError> {
        let rows: Vec<OutboxRow> = sqlx::query_as(
            r#"
            SELECT id, message, status, created_at, available_at, processed_at, attempts, last_error
            FROM job_outbox
            WHERE status = 'pending' AND available_at <= $1
            ORDER BY available_at ASC, created_at ASC
            LIMIT $2
            "#,
        )
        .bind(now)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to fetch due jobs", e))?;

        rows.into_iter().map(OutboxEntry::try_from).collect()
    }

    async fn mark_published(&self, id: Uuid) -> Result<(), DomainError> {
        self.finish(id, OutboxStatus::Published, None, None).await
    }

    async fn schedule_retry(
        &self,
        id: Uuid,
        error: &str,
        retry_at: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        self.finish(id, OutboxStatus::Pending, Some(error), Some(retry_at))
            .await
    }

    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<(), DomainError> {
        self.finish(id, OutboxStatus::Failed, Some(error), None).await
    }

    async fn cleanup_old(&self, older_than_hours: u32) -> Result<u64, DomainError> {
        let cutoff = Utc::now() - Duration::hours(i64::from(older_than_hours));
        let result = sqlx::query(
            "DELETE FROM job_outbox WHERE status = 'published' AND processed_at < $1",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to clean up outbox", e))?;

        Ok(result.rows_affected())
    }
}

//! PostgreSQL implementation of UserRepository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::domain::foundation::{DomainError, ErrorCode, Timestamp, UserId};
use crate::domain::ledger::User;
use crate::ports::UserRepository;

use super::{db_error, metadata_from_json, metadata_to_json};

pub struct PostgresUserRepository {
    pool: PgPool,
}

impl PostgresUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: String,
    external_account_id: Option<String>,
    is_anonymous: bool,
    realm: Option<String>,
    metadata: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = DomainError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(User {
            id: UserId::new(row.id).map_err(|e| {
                DomainError::new(ErrorCode::DatabaseError, format!("Invalid user id: {}", e))
            })?,
            external_account_id: row.external_account_id,
            is_anonymous: row.is_anonymous,
            realm: row.realm,
            metadata: metadata_from_json(row.metadata)?,
            created_at: Timestamp::from_datetime(row.created_at),
        })
    }
}

const COLUMNS: &str = "id, external_account_id, is_anonymous, realm, metadata, created_at";

#[async_trait]
impl UserRepository for PostgresUserRepository {
    async fn create(&self, user: &User) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO users (id, external_account_id, is_anonymous, realm, metadata, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(user.id.as_str())
        .bind(&user.external_account_id)
        .bind(user.is_anonymous)
        .bind(&user.realm)
        .bind(metadata_to_json(&user.metadata)?)
        .bind(user.created_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(db_err) = &e {
                if db_err.constraint() == Some("users_external_account_id_key") {
                    return DomainError::new(
                        ErrorCode::Conflict,
                        "A user already exists for this external account id",
                    );
                }
            }
            db_error("Failed to create user", e)
        })?;

        Ok(())
    }

    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, DomainError> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("SELECT {} FROM users WHERE id = $1", COLUMNS))
                .bind(id.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| db_error("Failed to find user", e))?;

        row.map(User::try_from).transpose()
    }

    async fn find_by_external_account_id(
        &self,
        external_account_id: &str,
    ) -> Result<Option<User>, DomainError> {
        let row: Option<UserRow> = sqlx::query_as(&format!(
            "SELECT {} FROM users WHERE external_account_id = $1",
            COLUMNS
        ))
        .bind(external_account_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to find user", e))?;

        row.map(User::try_from).transpose()
    }

    async fn find_by_metadata(&self, key: &str, value: &str) -> Result<Vec<User>, DomainError> {
        let rows: Vec<UserRow> = sqlx::query_as(&format!(
            "SELECT {} FROM users WHERE metadata->>$1 = $2 ORDER BY created_at ASC",
            COLUMNS
        ))
        .bind(key)
        .bind(value)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to find users by metadata", e))?;

        rows.into_iter().map(User::try_from).collect()
    }
}

//! PostgreSQL adapters - Database implementations for repository ports.
//!
//! - `PostgresPurchaseTokenRepository` - Purchase token identity anchor
//! - `PostgresNotificationLog` - Developer and voided-purchase notification logs
//! - `PostgresSubscriptionTypeRepository` - Product id mappings
//! - `PostgresPaymentRepository`, `PostgresSubscriptionRepository`,
//!   `PostgresRecurringChargeRepository`, `PostgresUserRepository` - The ledger
//! - `PostgresOutbox` - Job outbox
//!
//! Metadata maps are stored as JSONB objects.

mod notification_log;
mod outbox;
mod payment_repository;
mod pool;
mod purchase_token_repository;
mod recurring_charge_repository;
mod subscription_repository;
mod subscription_type_repository;
mod user_repository;

pub use notification_log::PostgresNotificationLog;
pub use outbox::PostgresOutbox;
pub use payment_repository::PostgresPaymentRepository;
pub use pool::{connect, run_migrations};
pub use purchase_token_repository::PostgresPurchaseTokenRepository;
pub use recurring_charge_repository::PostgresRecurringChargeRepository;
pub use subscription_repository::PostgresSubscriptionRepository;
pub use subscription_type_repository::PostgresSubscriptionTypeRepository;
pub use user_repository::PostgresUserRepository;

use crate::domain::foundation::{DomainError, ErrorCode};
use crate::domain::purchase::Metadata;

fn db_error(context: &str, err: sqlx::Error) -> DomainError {
    DomainError::new(ErrorCode::DatabaseError, format!("{}: {}", context, err))
}

fn metadata_to_json(metadata: &Metadata) -> Result<serde_json::Value, DomainError> {
    serde_json::to_value(metadata).map_err(|e| {
        DomainError::new(ErrorCode::InternalError, format!("Failed to encode metadata: {}", e))
    })
}

fn metadata_from_json(value: serde_json::Value) -> Result<Metadata, DomainError> {
    serde_json::from_value(value).map_err(|e| {
        DomainError::new(ErrorCode::DatabaseError, format!("Invalid metadata: {}", e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::purchase::metadata;

    #[test]
    fn metadata_is_stored_as_flat_object() {
        let mut meta = Metadata::new();
        meta.insert(metadata::PURCHASE_TOKEN.to_string(), "tok".to_string());
        meta.insert(metadata::GRACE_PERIOD.to_string(), metadata::FLAG_TRUE.to_string());

        let json = metadata_to_json(&meta).unwrap();

        assert_eq!(json["purchase_token"], "tok");
        assert_eq!(metadata_from_json(json).unwrap(), meta);
    }

    #[test]
    fn non_string_metadata_is_rejected() {
        let err = metadata_from_json(serde_json::json!({ "order_id": 7 })).unwrap_err();
        assert_eq!(err.code, ErrorCode::DatabaseError);
    }
}

use sea_orm::{DbErr, SqlErr};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

/// Failures of `IngestionPipeline::ingest`
///
/// `Unauthorized`, `InvalidPayload` and `QuotaExceeded` are terminal and go
/// straight back to the SDK. `Conflict` is retried inside the pipeline before
/// it surfaces.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Unknown or missing DSN")]
    Unauthorized,

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Event quota exceeded ({current}/{limit})")]
    QuotaExceeded { current: i64, limit: i64 },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage conflict: {0}")]
    Conflict(String),

    #[error("Ingestion deadline exceeded")]
    Timeout,

    #[error("Database error: {0}")]
    Database(DbErr),
}

impl IngestError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, IngestError::Conflict(_))
    }
}

/// Transient storage errors become `Conflict`, everything else stays a
/// database error.
impl From<DbErr> for IngestError {
    fn from(err: DbErr) -> Self {
        if is_transient(&err) {
            IngestError::Conflict(err.to_string())
        } else {
            IngestError::Database(err)
        }
    }
}

/// Races the database resolved by aborting one side: unique-index collisions,
/// SQLite lock contention, Postgres serialization failures and deadlocks.
pub fn is_transient(err: &DbErr) -> bool {
    if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) {
        return true;
    }
    let message = err.to_string().to_lowercase();
    message.contains("database is locked")
        || message.contains("database table is locked")
        || message.contains("could not serialize")
        || message.contains("deadlock detected")
}

pub fn is_foreign_key_violation(err: &DbErr) -> bool {
    if matches!(err.sql_err(), Some(SqlErr::ForeignKeyConstraintViolation(_))) {
        return true;
    }
    let message = err.to_string().to_lowercase();
    message.contains("foreign key constraint")
}

/// Errors of the dashboard query service
#[derive(Error, Debug)]
pub enum ErrorTrackingError {
    #[error("Database error: {0}")]
    Database(#[from] DbErr),

    #[error("Error group not found")]
    GroupNotFound,

    #[error("Project not found")]
    ProjectNotFound,

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Outcome of a successful ingest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct IngestResult {
    pub event_id: i32,
    pub group_id: i32,
    pub is_new_group: bool,
    /// Group occurrence count right after this event
    pub count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_contention_is_transient() {
        let err = DbErr::Custom("error returned from database: database is locked".to_string());
        assert!(is_transient(&err));
        assert!(IngestError::from(err).is_retryable());
    }

    #[test]
    fn test_serialization_failure_is_transient() {
        let err = DbErr::Custom(
            "could not serialize access due to concurrent update".to_string(),
        );
        assert!(matches!(IngestError::from(err), IngestError::Conflict(_)));
    }

    #[test]
    fn test_other_errors_are_not_transient() {
        let err = DbErr::RecordNotFound("error_groups".to_string());
        assert!(!is_transient(&err));
        assert!(matches!(IngestError::from(err), IngestError::Database(_)));
    }

    #[test]
    fn test_quota_message_includes_counts() {
        let err = IngestError::QuotaExceeded {
            current: 100,
            limit: 100,
        };
        assert_eq!(err.to_string(), "Event quota exceeded (100/100)");
    }
}

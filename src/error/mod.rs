//! Centralized storage error handling for the engine
//!
//! Infrastructure failures are typed here and bubble up through anyhow;
//! business precondition failures (blocked lead, exhausted pool, ...) are
//! plain return values on the service APIs and never appear as errors.

use thiserror::Error;
use uuid::Uuid;

/// Record store error type
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("document not found: {0}")]
    NotFound(Uuid),

    #[error("version conflict on {id}: expected version {expected}")]
    VersionConflict { id: Uuid, expected: i64 },

    #[error("duplicate key: {0}")]
    Duplicate(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    /// Get the error code string
    pub fn error_code(&self) -> &'static str {
        match self {
            StoreError::NotFound(_) => "NOT_FOUND",
            StoreError::VersionConflict { .. } => "VERSION_CONFLICT",
            StoreError::Duplicate(_) => "DUPLICATE",
            StoreError::Database(_) => "DATABASE_ERROR",
            StoreError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Whether a redelivery of the same work may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StoreError::VersionConflict { .. } | StoreError::Database(_)
        )
    }
}

// Convenience conversions from common error types

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Result type alias using StoreError
pub type StoreResult<T> = Result<T, StoreError>;

/// Classify a job error: true when the queue should redeliver.
///
/// Version conflicts and database hiccups are transient; everything else
/// (bad payloads, duplicates, validation) will fail the same way again.
pub fn is_retryable(err: &anyhow::Error) -> bool {
    match err.downcast_ref::<StoreError>() {
        Some(store_err) => store_err.is_retryable(),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let id = Uuid::new_v4();
        assert_eq!(StoreError::NotFound(id).error_code(), "NOT_FOUND");
        assert_eq!(
            StoreError::VersionConflict { id, expected: 3 }.error_code(),
            "VERSION_CONFLICT"
        );
        assert_eq!(
            StoreError::Duplicate("123".to_string()).error_code(),
            "DUPLICATE"
        );
        assert_eq!(
            StoreError::Database("down".to_string()).error_code(),
            "DATABASE_ERROR"
        );
    }

    #[test]
    fn test_retryable_classification() {
        let id = Uuid::new_v4();
        assert!(StoreError::VersionConflict { id, expected: 1 }.is_retryable());
        assert!(StoreError::Database("timeout".to_string()).is_retryable());
        assert!(!StoreError::NotFound(id).is_retryable());
        assert!(!StoreError::Duplicate("123".to_string()).is_retryable());
        assert!(!StoreError::Serialization("bad json".to_string()).is_retryable());
    }

    #[test]
    fn test_retryable_through_anyhow_chain() {
        let id = Uuid::new_v4();
        let err = anyhow::Error::from(StoreError::VersionConflict { id, expected: 2 })
            .context("failed to persist lead");
        assert!(is_retryable(&err), "context wrapping must not hide the source");

        let err = anyhow::anyhow!("payload does not match queue");
        assert!(!is_retryable(&err));
    }

    #[test]
    fn test_version_conflict_display() {
        let id = Uuid::new_v4();
        let msg = StoreError::VersionConflict { id, expected: 5 }.to_string();
        assert!(msg.contains(&id.to_string()));
        assert!(msg.contains('5'));
    }
}

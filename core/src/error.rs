//! Core error types for the BI migration service

use thiserror::Error;

/// Core error type for all operations
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("{entity} with id {id} not found")]
    NotFound { entity: &'static str, id: i32 },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("BI tool adapter error: {0}")]
    Adapter(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub fn connection_not_found(id: i32) -> Self {
        CoreError::NotFound {
            entity: "Connection",
            id,
        }
    }

    pub fn migration_job_not_found(id: i32) -> Self {
        CoreError::NotFound {
            entity: "Migration job",
            id,
        }
    }

    pub fn stale_migration_job(id: i32) -> Self {
        CoreError::InvalidState(format!(
            "Migration job {} was changed by another request; reload it and retry",
            id
        ))
    }
}

/// Result type alias using CoreError
pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display() {
        let err = CoreError::connection_not_found(42);
        assert_eq!(err.to_string(), "Connection with id 42 not found");

        let err = CoreError::migration_job_not_found(999999);
        assert_eq!(err.to_string(), "Migration job with id 999999 not found");
    }

    #[test]
    fn test_validation_display() {
        let err = CoreError::Validation("The following asset IDs do not exist: 999, 1000".into());
        assert!(err.to_string().contains("999, 1000"));
    }

    #[test]
    fn test_invalid_state_display() {
        let err = CoreError::InvalidState("Connection 3 is not active (status: inactive)".into());
        assert!(err.to_string().starts_with("Invalid state:"));
        assert!(err.to_string().contains("inactive"));
    }
}

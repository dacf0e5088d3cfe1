//! Error types for the storefront stores

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Record not found")]
    NotFound,

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("Store backend error: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            sqlx::Error::Database(db_err) => {
                // PostgreSQL foreign key / unique violations
                let code = db_err.code().map(|c| c.into_owned());
                match code.as_deref() {
                    Some("23503") | Some("23505") => StoreError::Constraint(db_err.to_string()),
                    _ => StoreError::Database(sqlx::Error::Database(db_err)),
                }
            }
            other => StoreError::Database(other),
        }
    }
}

impl StoreError {
    /// Timeouts and connectivity failures, as opposed to "no such record"
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StoreError::Timeout(_) | StoreError::Database(_) | StoreError::Backend(_)
        )
    }
}

//! Error types for the database layer

use taskhub_realtime::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Database connection error: {0}")]
    ConnectionError(String),

    #[error("Database query error: {0}")]
    QueryError(String),

    #[error("Database migration error: {0}")]
    MigrationError(String),

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Receiver not found: {0}")]
    ReceiverNotFound(String),

    #[error("Duplicate entity: {0}")]
    Duplicate(String),

    #[error("Corrupt row: {0}")]
    InvalidRow(String),
}

impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                DatabaseError::Duplicate(db.message().to_string())
            }
            _ => DatabaseError::QueryError(err.to_string()),
        }
    }
}

impl From<DatabaseError> for StoreError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::UserNotFound(id) => StoreError::UserNotFound(id),
            DatabaseError::ReceiverNotFound(id) => StoreError::ReceiverNotFound(id),
            other => StoreError::Backend(other.to_string()),
        }
    }
}

use scylla::transport::errors::{DbError, QueryError};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] QueryError),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Comment not found: {0}")]
    NotFound(Uuid),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Row mapping error: {0}")]
    RowMapping(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Operation panicked: {0}")]
    Panicked(String),

    #[error("Operation cancelled")]
    Cancelled,
}

impl StoreError {
    /// Whether the statement that produced this error may succeed if sent again.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::DatabaseError(err) => is_transient_query_error(err),
            StoreError::ConnectionError(_) => true,
            _ => false,
        }
    }
}

fn is_transient_query_error(err: &QueryError) -> bool {
    match err {
        QueryError::IoError(_)
        | QueryError::TimeoutError
        | QueryError::RequestTimeout(_)
        | QueryError::UnableToAllocStreamId => true,
        QueryError::DbError(db_err, _) => matches!(
            db_err,
            DbError::Unavailable { .. }
                | DbError::Overloaded
                | DbError::IsBootstrapping
                | DbError::ReadTimeout { .. }
                | DbError::WriteTimeout { .. }
                | DbError::ServerError
        ),
        _ => false,
    }
}

/// Outcome of a failed [`crate::retry`] run.
#[derive(Error, Debug)]
pub enum RetryError<E> {
    #[error("{0}")]
    Failed(E),

    #[error("Operation panicked: {0}")]
    Panicked(String),

    #[error("Operation cancelled")]
    Cancelled,
}

impl From<RetryError<StoreError>> for StoreError {
    fn from(err: RetryError<StoreError>) -> Self {
        match err {
            RetryError::Failed(err) => err,
            RetryError::Panicked(msg) => StoreError::Panicked(msg),
            RetryError::Cancelled => StoreError::Cancelled,
        }
    }
}

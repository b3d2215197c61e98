//! Storage-level errors and their mapping into the core error type.

use crm_replica_core::errors::{DatabaseError, Error};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Query failed: {0}")]
    Query(#[from] diesel::result::Error),

    #[error("Connection pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),

    #[error("Connection failed: {0}")]
    Connection(#[from] diesel::ConnectionError),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database writer is not running")]
    WriterClosed,
}

impl From<StorageError> for Error {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Query(e) => Error::Database(DatabaseError::QueryFailed(e.to_string())),
            StorageError::Pool(e) => {
                Error::Database(DatabaseError::ConnectionFailed(e.to_string()))
            }
            StorageError::Connection(e) => {
                Error::Database(DatabaseError::ConnectionFailed(e.to_string()))
            }
            StorageError::Migration(message) => {
                Error::Database(DatabaseError::MigrationFailed(message))
            }
            StorageError::Serialization(message) => Error::Serialization(message),
            StorageError::Io(e) => Error::Database(DatabaseError::Internal(e.to_string())),
            StorageError::WriterClosed => {
                Error::Database(DatabaseError::Internal(StorageError::WriterClosed.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_errors_become_database_errors() {
        let err: Error = StorageError::Query(diesel::result::Error::NotFound).into();
        assert!(matches!(
            err,
            Error::Database(DatabaseError::QueryFailed(_))
        ));
    }

    #[test]
    fn closed_writer_is_reported() {
        let err: Error = StorageError::WriterClosed.into();
        assert!(err.to_string().contains("writer is not running"));
    }
}

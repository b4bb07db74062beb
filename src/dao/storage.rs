use std::error::Error;
use thiserror::Error;

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error raised by storage backends regardless of the underlying database.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend could not be reached or rejected the operation.
    #[error("storage unavailable: {message}")]
    Unavailable {
        /// Backend specific description.
        message: String,
        /// Underlying driver error.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// A stored record could not be mapped back to a domain entity.
    #[error("stored record `{record}` is corrupted: {reason}")]
    Corrupted {
        /// Identifier of the offending record.
        record: String,
        /// What could not be decoded.
        reason: String,
    },
}

impl StorageError {
    /// Construct an unavailable error from any backend failure.
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        StorageError::Unavailable {
            message,
            source: Box::new(source),
        }
    }

    /// Construct a corruption error for a record that failed to decode.
    pub fn corrupted(record: impl Into<String>, reason: impl Into<String>) -> Self {
        StorageError::Corrupted {
            record: record.into(),
            reason: reason.into(),
        }
    }
}

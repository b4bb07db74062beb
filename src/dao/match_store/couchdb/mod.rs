mod config;
mod error;
mod models;
mod store;

pub use config::CouchConfig;
pub use error::CouchError;
pub use store::CouchMatchStore;

use crate::dao::storage::StorageError;

impl From<CouchError> for StorageError {
    fn from(err: CouchError) -> Self {
        match err {
            CouchError::MalformedId { doc_id, kind } => StorageError::corrupted(doc_id, kind),
            other => StorageError::unavailable(other.to_string(), other),
        }
    }
}

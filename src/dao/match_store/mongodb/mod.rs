mod config;
mod connection;
mod error;
mod models;
mod store;

pub use config::MongoConfig;
pub use error::MongoDaoError;
pub use store::MongoMatchStore;

use crate::dao::storage::StorageError;

impl From<MongoDaoError> for StorageError {
    fn from(err: MongoDaoError) -> Self {
        match err {
            MongoDaoError::MalformedId { id } => StorageError::corrupted(id, "malformed identifier"),
            other => StorageError::unavailable(other.to_string(), other),
        }
    }
}

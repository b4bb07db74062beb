use mongodb::error::Error as MongoError;
use thiserror::Error;
use uuid::Uuid;

/// Result alias for MongoDB operations.
pub type MongoResult<T> = std::result::Result<T, MongoDaoError>;

/// Failures raised by the MongoDB backend.
#[derive(Debug, Error)]
pub enum MongoDaoError {
    #[error("missing MongoDB environment variable `{var}`")]
    MissingEnvVar { var: &'static str },
    #[error("failed to parse MongoDB connection URI `{uri}`")]
    InvalidUri {
        uri: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        #[source]
        source: MongoError,
    },
    #[error("MongoDB did not answer a ping on `{database}`")]
    InitialPing {
        database: String,
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping health check failed")]
    HealthPing {
        #[source]
        source: MongoError,
    },
    #[error("failed to ensure index `{index}` on collection `{collection}`")]
    EnsureIndex {
        collection: &'static str,
        index: &'static str,
        #[source]
        source: MongoError,
    },
    #[error("failed to save match `{id}`")]
    SaveMatch {
        id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to load match `{id}`")]
    LoadMatch {
        id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to list matches")]
    ListMatches {
        #[source]
        source: MongoError,
    },
    #[error("failed to delete match `{id}`")]
    DeleteMatch {
        id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to save point `{id}`")]
    SavePoint {
        id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to load points of match `{match_id}`")]
    LoadPoints {
        match_id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to load recent points")]
    RecentPoints {
        #[source]
        source: MongoError,
    },
    #[error("failed to delete point `{id}`")]
    DeletePoint {
        id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to save coaching report")]
    SaveReport {
        #[source]
        source: MongoError,
    },
    #[error("failed to load coaching report")]
    LoadReport {
        #[source]
        source: MongoError,
    },
    #[error("stored document `{id}` has a malformed identifier")]
    MalformedId { id: String },
}

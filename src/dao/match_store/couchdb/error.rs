use reqwest::StatusCode;
use thiserror::Error;

pub type CouchResult<T> = Result<T, CouchError>;

/// What went wrong talking to CouchDB. `target` is the database name or the
/// document path the request was aimed at.
#[derive(Debug, Error)]
pub enum CouchError {
    #[error("`{var}` must be set to use the CouchDB match store")]
    Env { var: &'static str },
    #[error("could not build the CouchDB HTTP client")]
    Client(#[source] reqwest::Error),
    #[error("CouchDB unreachable while calling `{target}`")]
    Transport {
        target: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("CouchDB answered {status} for `{target}`")]
    Status { target: String, status: StatusCode },
    #[error("CouchDB body for `{target}` is not valid JSON")]
    Body {
        target: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("CouchDB document under `{target}` has an unexpected shape")]
    Document {
        target: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("{failed} document(s) refused by _bulk_docs")]
    BulkRejected { failed: usize },
    /// Document ids are `<kind>::<uuid>` or `<kind>::<match uuid>::<point uuid>`.
    #[error("malformed document id `{doc_id}` ({kind})")]
    MalformedId { doc_id: String, kind: &'static str },
}

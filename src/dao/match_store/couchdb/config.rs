use std::env;

use super::error::{CouchError, CouchResult};

const DEFAULT_DATABASE: &str = "sabre_logger";

/// Where the CouchDB match store lives and how to log into it.
#[derive(Debug, Clone)]
pub struct CouchConfig {
    /// Server root such as `http://localhost:5984`.
    pub base_url: String,
    /// Database holding matches, points and reports.
    pub database: String,
    /// Basic-auth user.
    pub username: Option<String>,
    /// Basic-auth password.
    pub password: Option<String>,
}

impl CouchConfig {
    /// Read `COUCH_BASE_URL` (required), `COUCH_DB`, and the optional
    /// `COUCH_USERNAME`/`COUCH_PASSWORD` pair. A lone username or password is ignored.
    pub fn from_env() -> CouchResult<Self> {
        let base_url = env::var("COUCH_BASE_URL").map_err(|_| CouchError::Env {
            var: "COUCH_BASE_URL",
        })?;
        let database = env::var("COUCH_DB")
            .ok()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_DATABASE.to_owned());

        let (username, password) =
            match (env::var("COUCH_USERNAME").ok(), env::var("COUCH_PASSWORD").ok()) {
                (Some(user), Some(password)) => (Some(user), Some(password)),
                _ => (None, None),
            };

        Ok(Self {
            base_url,
            database,
            username,
            password,
        })
    }
}

use std::time::Duration;

use mongodb::{Client, Database, bson::doc, options::ClientOptions};
use tracing::debug;

use super::error::{MongoDaoError, MongoResult};

/// Upper bound on server selection for the opening ping. Longer outages are
/// retried by the storage supervisor, not here.
const SELECTION_TIMEOUT: Duration = Duration::from_secs(5);

/// Open a client on `database_name` and confirm the deployment answers a ping.
pub async fn open_database(
    options: &ClientOptions,
    database_name: &str,
) -> MongoResult<(Client, Database)> {
    let mut options = options.clone();
    options.server_selection_timeout = Some(
        options
            .server_selection_timeout
            .map_or(SELECTION_TIMEOUT, |configured| configured.min(SELECTION_TIMEOUT)),
    );

    let client = Client::with_options(options)
        .map_err(|source| MongoDaoError::ClientConstruction { source })?;
    let database = client.database(database_name);

    database
        .run_command(doc! { "ping": 1 })
        .await
        .map_err(|source| MongoDaoError::InitialPing {
            database: database_name.to_owned(),
            source,
        })?;
    debug!(database = database_name, "MongoDB answered the opening ping");

    Ok((client, database))
}

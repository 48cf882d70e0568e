use std::time::Duration;

use mongodb::{Client, Database, bson::doc, options::ClientOptions};
use tokio::time::sleep;
use tracing::debug;

use super::error::{MongoDaoError, MongoResult};

/// Pings attempted before giving the connection up to the storage supervisor.
const PING_ATTEMPTS: u32 = 3;
const PING_BACKOFF: [Duration; 2] = [Duration::from_millis(250), Duration::from_millis(750)];

/// Build a client for `database_name` and wait for the first successful ping.
pub(super) async fn establish_connection(
    options: &ClientOptions,
    database_name: &str,
) -> MongoResult<(Client, Database)> {
    let client = Client::with_options(options.clone())
        .map_err(|source| MongoDaoError::ClientConstruction { source })?;
    let database = client.database(database_name);

    let mut attempt = 1;
    loop {
        match database.run_command(doc! { "ping": 1 }).await {
            Ok(_) => return Ok((client, database)),
            Err(source) if attempt >= PING_ATTEMPTS => {
                return Err(MongoDaoError::InitialPing {
                    attempts: attempt,
                    source,
                });
            }
            Err(err) => {
                let delay = PING_BACKOFF[(attempt as usize - 1).min(PING_BACKOFF.len() - 1)];
                debug!(attempt, ?delay, error = %err, database = database_name, "MongoDB not reachable yet");
                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

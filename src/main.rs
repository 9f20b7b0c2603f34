use std::env;
use std::sync::Arc;

use anyhow::Context;
use evlog::{meta, LogEventConsolePrinter, Logger};

use easyvote_events::config::Config;
use easyvote_events::db::dbclient::DBClient;
use easyvote_events::runtime::{get_logger, set_logger};
use easyvote_events::store::PgStorage;
use easyvote_events::support::clock::SystemClock;
use easyvote_events::{EngineSettings, VoteEngine};

/// Prints the results of every closed event whose id is passed on the command line.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let mut logger = Logger::default();
    logger.register(LogEventConsolePrinter::default());
    set_logger(logger);

    let config = Config::from_env()?;

    let event_ids = env::args().skip(1)
        .map(|v| v.parse::<i32>().with_context(|| format!("event id '{}' is not a number", v)))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let db_client = DBClient::new(&config.database_url, config.max_connections).await
        .context("failed to connect to database")?;

    let engine = VoteEngine::new(
        Arc::new(PgStorage::new(db_client)),
        Arc::new(SystemClock),
        EngineSettings::from(&config),
    );

    for id_event in event_ids {
        match engine.results(id_event).await {
            Ok(results) => println!("{}", results.render()),
            Err(e) => {
                get_logger().error("Failed to compute results.", meta! {
                    "EventID" => id_event,
                    "Error" => e,
                });
            }
        }
    }

    Ok(())
}

//! thread-store CLI - inspect and manage stored conversation threads

use clap::Parser;
use std::sync::Arc;
use thread_checkpoint::ThreadQueries;
use thread_checkpoint_sqlite::ConnectionManager;
use thread_store::{execute, logging, open_saver, Cli, ConfigLoader};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = ConfigLoader::new()
        .load(cli.config.as_deref())
        .await?
        .with_overrides(cli.backend, cli.url);
    logging::init(&config.logging.level);

    let manager = Arc::new(ConnectionManager::new(config.pool_settings(), config.retry.clone()));
    let saver = open_saver(&config, &manager)?;
    let queries = ThreadQueries::new(saver);

    let outcome = execute(&queries, cli.command).await;
    manager.close_all().await;

    match outcome {
        Ok(value) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(())
        }
        Err(err) => {
            eprintln!("{}", serde_json::to_string_pretty(&err.to_response())?);
            std::process::exit(1);
        }
    }
}

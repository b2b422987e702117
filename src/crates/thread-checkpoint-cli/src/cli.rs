//! Command-line surface over the query layer
//!
//! Every command prints one JSON document: the response shape on success, the
//! `{error, message, code}` body on failure.

use crate::config::BackendKind;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;
use thread_checkpoint::api::DEFAULT_PAGE_SIZE;
use thread_checkpoint::{
    ApiError, CheckpointError, DeleteThreadRequest, HistoryRequest, ListThreadsRequest,
    MessagesRequest, PageRequest, SortOrder, ThreadQueries,
};

#[derive(Debug, Parser)]
#[command(name = "thread-store")]
#[command(about = "Inspect and manage stored conversation threads", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Config file applied after the user and project files
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Backend override: memory, sqlite
    #[arg(long, global = true)]
    pub backend: Option<BackendKind>,

    /// SQLite connection URL override
    #[arg(long, global = true, env = "THREAD_STORE_URL")]
    pub url: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Pagination flags shared by the listing commands
#[derive(Debug, Clone, Args)]
pub struct PageArgs {
    /// Page number, starting at 1
    #[arg(long, default_value_t = 1)]
    pub page: u32,

    /// Items per page (1-100)
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
    pub page_size: u32,

    /// Sort order: asc, desc
    #[arg(long, default_value = "desc")]
    pub order: SortOrder,
}

impl From<PageArgs> for PageRequest {
    fn from(args: PageArgs) -> Self {
        PageRequest::new(args.page, args.page_size, args.order)
    }
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// List threads, optionally for one owner
    Threads {
        /// Owner (first segment of the thread id)
        #[arg(long)]
        owner: Option<String>,

        #[command(flatten)]
        page: PageArgs,
    },

    /// Checkpoint history of a thread
    History {
        /// Thread ID
        thread_id: String,

        #[command(flatten)]
        page: PageArgs,
    },

    /// Flattened, de-duplicated messages of a thread
    Messages {
        /// Thread ID
        thread_id: String,

        /// Config id to report instead of the one derived from the thread id
        #[arg(long)]
        config_id: Option<String>,

        #[command(flatten)]
        page: PageArgs,
    },

    /// Summary of the latest (or a given) checkpoint
    Show {
        /// Thread ID
        thread_id: String,

        /// Checkpoint ID
        #[arg(long)]
        checkpoint: Option<String>,
    },

    /// Delete a thread and everything stored for it
    Delete {
        /// Thread ID
        thread_id: String,
    },
}

fn to_json<T: Serialize>(value: &T) -> Result<Value, ApiError> {
    Ok(serde_json::to_value(value).map_err(CheckpointError::from)?)
}

/// Run one command against the query layer
pub async fn execute(queries: &ThreadQueries, command: Commands) -> Result<Value, ApiError> {
    match command {
        Commands::Threads { owner, page } => {
            let request = ListThreadsRequest {
                owner,
                page: page.into(),
            };
            to_json(&queries.list_threads(&request).await?)
        }
        Commands::History { thread_id, page } => {
            let request = HistoryRequest {
                thread_id,
                page: page.into(),
            };
            to_json(&queries.history(&request).await?)
        }
        Commands::Messages {
            thread_id,
            config_id,
            page,
        } => {
            let request = MessagesRequest {
                thread_id,
                config_id,
                page: page.into(),
            };
            to_json(&queries.messages(&request).await?)
        }
        Commands::Show {
            thread_id,
            checkpoint,
        } => to_json(&queries.show(&thread_id, checkpoint.as_deref()).await?),
        Commands::Delete { thread_id } => {
            to_json(&queries.delete_thread(&DeleteThreadRequest { thread_id }).await?)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_threads_defaults() {
        let cli = Cli::try_parse_from(["thread-store", "threads"]).unwrap();
        match cli.command {
            Commands::Threads { owner, page } => {
                assert_eq!(owner, None);
                assert_eq!(PageRequest::from(page), PageRequest::default());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_global_overrides() {
        let cli = Cli::try_parse_from([
            "thread-store",
            "history",
            "alice_1",
            "--backend",
            "sqlite",
            "--url",
            "sqlite:threads.db",
            "--order",
            "asc",
        ])
        .unwrap();

        assert_eq!(cli.backend, Some(BackendKind::Sqlite));
        assert_eq!(cli.url.as_deref(), Some("sqlite:threads.db"));
        match cli.command {
            Commands::History { thread_id, page } => {
                assert_eq!(thread_id, "alice_1");
                assert_eq!(page.order, SortOrder::Asc);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_rejects_unknown_values() {
        assert!(Cli::try_parse_from(["thread-store", "threads", "--order", "sideways"]).is_err());
        assert!(Cli::try_parse_from(["thread-store", "threads", "--backend", "mongo"]).is_err());
        assert!(Cli::try_parse_from(["thread-store", "delete"]).is_err());
    }
}

//! # thread-checkpoint-sqlite - Durable Checkpoint Backend
//!
//! SQLite implementation of [`CheckpointSaver`](thread_checkpoint::CheckpointSaver)
//! plus the connection manager that owns its pools.
//!
//! - [`ConnectionManager`] - one lazily created, probed and migrated pool per URL
//! - [`SqliteCheckpointSaver`] - the store contract on top of a pool
//! - [`RetryConfig`] / [`with_retry`] - exponential backoff for transient failures
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use thread_checkpoint::ThreadQueries;
//! use thread_checkpoint_sqlite::{ConnectionManager, SqliteCheckpointSaver};
//!
//! #[tokio::main]
//! async fn main() -> thread_checkpoint::Result<()> {
//!     let manager = Arc::new(ConnectionManager::default());
//!     let saver = SqliteCheckpointSaver::new(manager.clone(), "sqlite:threads.db");
//!     let queries = ThreadQueries::new(Arc::new(saver));
//!     // ... serve requests ...
//!     manager.close_all().await;
//!     Ok(())
//! }
//! ```

pub mod connection;
pub mod error;
pub mod retry;
pub mod saver;

pub use connection::{sqlite_url, ConnectionManager, PoolSettings};
pub use error::map_sqlx_error;
pub use retry::{with_retry, RetryConfig};
pub use saver::SqliteCheckpointSaver;

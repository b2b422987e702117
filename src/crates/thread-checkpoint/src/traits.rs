//! Storage contract shared by every checkpoint backend
//!
//! This module defines the **[`CheckpointSaver`]** trait, the single abstraction the
//! execution engine and the query layer talk to. The ephemeral
//! [`InMemoryCheckpointSaver`](crate::memory::InMemoryCheckpointSaver) and the durable
//! SQLite backend both implement it and both pass the same
//! [`conformance`](crate::conformance) suite.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐     ┌──────────────────────┐
//! │  Execution engine    │     │  Query layer         │
//! │  put / get / writes  │     │  threads / history   │
//! └──────────┬───────────┘     └──────────┬───────────┘
//!            │   Arc<dyn CheckpointSaver>  │
//!            └──────────────┬──────────────┘
//!                           ↓
//!            ┌──────────────────────────────┐
//!            │  Backend                     │
//!            │  • InMemoryCheckpointSaver   │
//!            │  • SqliteCheckpointSaver     │
//!            └──────────────────────────────┘
//! ```
//!
//! # Method Reference
//!
//! | Method | Semantics |
//! |--------|-----------|
//! | [`put`](CheckpointSaver::put) | Upsert keyed by `(thread_id, checkpoint_id)`; assigns an id when empty |
//! | [`get_tuple`](CheckpointSaver::get_tuple) | Exact checkpoint, or the greatest id when none is given |
//! | [`list`](CheckpointSaver::list) | Newest first; `before` is a strict cursor; filter is exact-match |
//! | [`put_writes`](CheckpointSaver::put_writes) | Pending writes per task; a resubmitted task replaces its writes |
//! | [`delete_thread`](CheckpointSaver::delete_thread) | Removes checkpoints and writes; no stale reads afterwards |
//! | [`thread_stats`](CheckpointSaver::thread_stats) | Checkpoint count, latest id and last update per thread |
//!
//! # Error Handling
//!
//! - Not-found is `Ok(None)` or an empty stream, never an error.
//! - A blank `thread_id` fails with
//!   [`InvalidReference`](crate::CheckpointError::InvalidReference) before the backend is touched.
//! - Codec failures carry the offending thread and checkpoint ids.
//!
//! # Ordering
//!
//! Checkpoint ids are compared as strings. Ids produced by
//! [`next_checkpoint_id`](crate::checkpoint::next_checkpoint_id) sort in creation order,
//! so "latest" and "newest first" hold across process restarts.

use crate::{
    checkpoint::{
        ChannelVersions, Checkpoint, CheckpointConfig, CheckpointMetadata, CheckpointTuple,
        PendingWrite, ThreadStats,
    },
    error::Result,
    thread_id::owner_of,
};
use async_trait::async_trait;
use futures::stream::{Stream, TryStreamExt};
use serde_json::Value;
use std::collections::HashMap;
use std::pin::Pin;

/// Type alias for async stream of checkpoint tuples
pub type CheckpointStream =
    Pin<Box<dyn Stream<Item = Result<CheckpointTuple>> + Send + 'static>>;

/// Core trait for implementing checkpoint storage backends
///
/// Implementations must be `Send + Sync`; one instance is shared by every
/// concurrent request handler.
#[async_trait]
pub trait CheckpointSaver: Send + Sync {
    /// Fetch a checkpoint using the given configuration
    async fn get(&self, config: &CheckpointConfig) -> Result<Option<Checkpoint>> {
        Ok(self.get_tuple(config).await?.map(|tuple| tuple.checkpoint))
    }

    /// Retrieve a checkpoint together with its metadata, parent link and pending writes
    ///
    /// With `checkpoint_id` set the exact checkpoint is returned; otherwise the one with
    /// the greatest id in the thread. Returns `Ok(None)` when nothing matches.
    async fn get_tuple(&self, config: &CheckpointConfig) -> Result<Option<CheckpointTuple>>;

    /// Stream checkpoints newest first
    ///
    /// * `config` - restricts to one thread; `None` scans all threads
    /// * `filter` - metadata fields that must all be equal
    /// * `before` - only checkpoints with an id strictly lower than this reference's id
    /// * `limit` - maximum number of results
    async fn list(
        &self,
        config: Option<&CheckpointConfig>,
        filter: Option<HashMap<String, Value>>,
        before: Option<&CheckpointConfig>,
        limit: Option<usize>,
    ) -> Result<CheckpointStream>;

    /// Store a checkpoint
    ///
    /// `config.checkpoint_id`, when set, names the checkpoint this one was derived from
    /// and becomes its parent. The returned config references the stored checkpoint.
    async fn put(
        &self,
        config: &CheckpointConfig,
        checkpoint: Checkpoint,
        metadata: CheckpointMetadata,
        new_versions: ChannelVersions,
    ) -> Result<CheckpointConfig>;

    /// Store intermediate writes linked to a checkpoint
    ///
    /// `writes` are `(channel, value)` pairs kept in the given order. Submitting the
    /// same `task_id` again for the same checkpoint replaces the earlier writes.
    async fn put_writes(
        &self,
        config: &CheckpointConfig,
        writes: Vec<(String, Value)>,
        task_id: String,
    ) -> Result<()>;

    /// Pending writes recorded for one checkpoint, ordered by task id then write order
    async fn get_writes(&self, config: &CheckpointConfig) -> Result<Vec<PendingWrite>>;

    /// Delete all checkpoints and writes associated with a specific thread ID
    async fn delete_thread(&self, thread_id: &str) -> Result<()>;

    /// Per-thread aggregates, optionally restricted to one owner
    ///
    /// The default walks every checkpoint through [`list`](CheckpointSaver::list) and so
    /// decodes each one; backends that can aggregate without decoding should override it.
    async fn thread_stats(&self, owner: Option<&str>) -> Result<Vec<ThreadStats>> {
        let tuples: Vec<CheckpointTuple> = self.list(None, None, None, None).await?.try_collect().await?;
        let mut stats: HashMap<String, ThreadStats> = HashMap::new();
        for tuple in tuples {
            if owner.is_some() && owner_of(tuple.thread_id()) != owner {
                continue;
            }
            match stats.get_mut(tuple.thread_id()) {
                Some(entry) => {
                    entry.checkpoint_count += 1;
                    entry.last_updated = entry.last_updated.max(tuple.updated_at);
                    if tuple.checkpoint_id() > entry.latest_checkpoint_id.as_str() {
                        entry.latest_checkpoint_id = tuple.checkpoint_id().to_string();
                    }
                }
                None => {
                    stats.insert(
                        tuple.thread_id().to_string(),
                        ThreadStats {
                            thread_id: tuple.thread_id().to_string(),
                            latest_checkpoint_id: tuple.checkpoint_id().to_string(),
                            checkpoint_count: 1,
                            last_updated: tuple.updated_at,
                        },
                    );
                }
            }
        }
        Ok(stats.into_values().collect())
    }
}

//! In-memory checkpoint storage for development and testing
//!
//! This module provides **[`InMemoryCheckpointSaver`]**, the ephemeral implementation of
//! the [`CheckpointSaver`] trait. It satisfies exactly the same contract as the durable
//! backend and runs the same [`conformance`](crate::conformance) suite, so tests written
//! against it carry over unchanged.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │  InMemoryCheckpointSaver                                   │
//! │  Arc<RwLock<Arena>>                                        │
//! │  ┌──────────────────────────────────────────────────────┐  │
//! │  │  records: Vec<Option<Record>>   (free slots reused)  │  │
//! │  │    [0] alice_1 / 0006..-a1  state bytes, metadata    │  │
//! │  │    [1] alice_1 / 0006..-b7  parent 0006..-a1         │  │
//! │  │    [2] None                                          │  │
//! │  │    [3] bob_1   / 0006..-c4                           │  │
//! │  │                                                      │  │
//! │  │  by_thread: thread_id → BTreeMap<checkpoint_id, slot>│  │
//! │  │    "alice_1" → {0006..-a1: 0, 0006..-b7: 1}          │  │
//! │  │    "bob_1"   → {0006..-c4: 3}                        │  │
//! │  │                                                      │  │
//! │  │  writes: thread_id → checkpoint_id →                 │  │
//! │  │          BTreeMap<(task_id, idx), (channel, bytes)>  │  │
//! │  └──────────────────────────────────────────────────────┘  │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! Checkpoint state and metadata are kept encoded, so a value that cannot round-trip
//! through the serializer fails here exactly as it would against a database.
//!
//! # Performance Characteristics
//!
//! | Operation | Complexity | Notes |
//! |-----------|------------|-------|
//! | `put()` | O(log n) | Ordered index insert |
//! | `get_tuple()` | O(log n) | Latest is the last index entry |
//! | `list()` one thread | O(n) | Index already in id order |
//! | `list()` all threads | O(n log n) | Merged and sorted |
//! | `delete_thread()` | O(n) | n = checkpoints in the thread |
//! | `thread_stats()` | O(n) | Reads the indexes, decodes nothing |
//!
//! Writers take the lock exclusively, so `delete_thread` is atomic to readers.

use crate::{
    checkpoint::{
        next_checkpoint_id, ChannelVersions, Checkpoint, CheckpointConfig, CheckpointId,
        CheckpointMetadata, CheckpointTuple, PendingWrite, ThreadStats,
    },
    error::{CheckpointError, Result},
    serializer::{JsonSerializer, SerializerProtocol},
    thread_id::owner_of,
    traits::{CheckpointSaver, CheckpointStream},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// One stored checkpoint
#[derive(Debug, Clone)]
struct Record {
    thread_id: String,
    checkpoint_id: CheckpointId,
    parent_checkpoint_id: Option<CheckpointId>,
    state: Vec<u8>,
    metadata: Vec<u8>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

type TaskWrites = BTreeMap<(String, usize), (String, Vec<u8>)>;

#[derive(Debug, Default)]
struct Arena {
    records: Vec<Option<Record>>,
    free: Vec<usize>,
    by_thread: HashMap<String, BTreeMap<CheckpointId, usize>>,
    writes: HashMap<String, HashMap<CheckpointId, TaskWrites>>,
}

impl Arena {
    fn slot(&self, thread_id: &str, checkpoint_id: &str) -> Option<usize> {
        self.by_thread.get(thread_id)?.get(checkpoint_id).copied()
    }

    fn latest_slot(&self, thread_id: &str) -> Option<usize> {
        self.by_thread.get(thread_id)?.values().next_back().copied()
    }

    fn record(&self, slot: usize) -> Option<&Record> {
        self.records.get(slot)?.as_ref()
    }

    fn allocate(&mut self, record: Record) -> usize {
        match self.free.pop() {
            Some(slot) => {
                self.records[slot] = Some(record);
                slot
            }
            None => {
                self.records.push(Some(record));
                self.records.len() - 1
            }
        }
    }

    /// Insert or replace; a replaced record keeps its `created_at`
    fn upsert(&mut self, mut record: Record) {
        match self.slot(&record.thread_id, &record.checkpoint_id) {
            Some(slot) => {
                if let Some(existing) = self.records[slot].as_mut() {
                    record.created_at = existing.created_at;
                    *existing = record;
                }
            }
            None => {
                let thread_id = record.thread_id.clone();
                let checkpoint_id = record.checkpoint_id.clone();
                let slot = self.allocate(record);
                self.by_thread
                    .entry(thread_id)
                    .or_default()
                    .insert(checkpoint_id, slot);
            }
        }
    }

    /// Whether `target` is `from` or one of its ancestors
    fn chain_contains<'a>(&'a self, thread_id: &str, from: &'a str, target: &str) -> bool {
        let mut cursor = Some(from);
        while let Some(checkpoint_id) = cursor {
            if checkpoint_id == target {
                return true;
            }
            cursor = self
                .slot(thread_id, checkpoint_id)
                .and_then(|slot| self.record(slot))
                .and_then(|record| record.parent_checkpoint_id.as_deref());
        }
        false
    }

    fn remove_thread(&mut self, thread_id: &str) -> usize {
        self.writes.remove(thread_id);
        let Some(index) = self.by_thread.remove(thread_id) else {
            return 0;
        };
        for slot in index.values() {
            self.records[*slot] = None;
            self.free.push(*slot);
        }
        index.len()
    }

    fn live_count(&self) -> usize {
        self.by_thread.values().map(|index| index.len()).sum()
    }
}

/// In-memory checkpoint saver implementation
///
/// Clones share the same storage.
///
/// # Example
///
/// ```rust
/// use thread_checkpoint::{Checkpoint, CheckpointConfig, CheckpointMetadata, CheckpointSaver, InMemoryCheckpointSaver};
/// use std::collections::HashMap;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let saver = InMemoryCheckpointSaver::new();
///     let config = CheckpointConfig::for_thread("alice_1");
///
///     let stored = saver
///         .put(&config, Checkpoint::empty(), CheckpointMetadata::new(), HashMap::new())
///         .await?;
///
///     let latest = saver.get_tuple(&config).await?.expect("stored above");
///     assert_eq!(Some(latest.checkpoint.id), stored.checkpoint_id);
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct InMemoryCheckpointSaver<S = JsonSerializer> {
    arena: Arc<RwLock<Arena>>,
    serializer: S,
}

impl InMemoryCheckpointSaver<JsonSerializer> {
    /// Create a new in-memory checkpoint saver
    pub fn new() -> Self {
        Self::with_serializer(JsonSerializer::new())
    }
}

impl Default for InMemoryCheckpointSaver<JsonSerializer> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: SerializerProtocol> InMemoryCheckpointSaver<S> {
    /// Create a saver that encodes state with the given serializer
    pub fn with_serializer(serializer: S) -> Self {
        Self {
            arena: Arc::new(RwLock::new(Arena::default())),
            serializer,
        }
    }

    /// Get the number of threads being tracked
    pub async fn thread_count(&self) -> usize {
        self.arena.read().await.by_thread.len()
    }

    /// Get the total number of checkpoints across all threads
    pub async fn checkpoint_count(&self) -> usize {
        self.arena.read().await.live_count()
    }

    /// Clear all checkpoints (useful for testing)
    pub async fn clear(&self) {
        *self.arena.write().await = Arena::default();
    }

    fn decode_tuple(&self, arena: &Arena, record: &Record) -> Result<CheckpointTuple> {
        let ids = |err: CheckpointError| {
            CheckpointError::serialization(&record.thread_id, &record.checkpoint_id, err)
        };
        let checkpoint: Checkpoint = self.serializer.loads(&record.state).map_err(ids)?;
        let metadata: CheckpointMetadata = self.serializer.loads(&record.metadata).map_err(ids)?;
        let pending_writes = self.decode_writes(arena, &record.thread_id, &record.checkpoint_id)?;

        let config = CheckpointConfig::for_thread(&record.thread_id)
            .with_checkpoint_id(record.checkpoint_id.clone());
        let mut tuple = CheckpointTuple::new(config, checkpoint, metadata)
            .with_pending_writes(pending_writes)
            .with_timestamps(record.created_at, record.updated_at);
        if let Some(parent) = &record.parent_checkpoint_id {
            tuple = tuple.with_parent_config(
                CheckpointConfig::for_thread(&record.thread_id).with_checkpoint_id(parent.clone()),
            );
        }
        Ok(tuple)
    }

    fn decode_writes(
        &self,
        arena: &Arena,
        thread_id: &str,
        checkpoint_id: &str,
    ) -> Result<Vec<PendingWrite>> {
        let Some(writes) = arena
            .writes
            .get(thread_id)
            .and_then(|by_checkpoint| by_checkpoint.get(checkpoint_id))
        else {
            return Ok(Vec::new());
        };
        writes
            .iter()
            .map(|((task_id, _), (channel, bytes))| {
                let value: Value = self
                    .serializer
                    .loads(bytes)
                    .map_err(|err| CheckpointError::serialization(thread_id, checkpoint_id, err))?;
                Ok((task_id.clone(), channel.clone(), value))
            })
            .collect()
    }

    fn metadata_matches(
        &self,
        record: &Record,
        filter: &HashMap<String, Value>,
    ) -> Result<bool> {
        if filter.is_empty() {
            return Ok(true);
        }
        let metadata: CheckpointMetadata = self.serializer.loads(&record.metadata).map_err(|err| {
            CheckpointError::serialization(&record.thread_id, &record.checkpoint_id, err)
        })?;
        Ok(metadata.matches(filter))
    }
}

#[async_trait]
impl<S> CheckpointSaver for InMemoryCheckpointSaver<S>
where
    S: SerializerProtocol + 'static,
{
    async fn get_tuple(&self, config: &CheckpointConfig) -> Result<Option<CheckpointTuple>> {
        let thread_id = config.require_thread_id()?;
        let arena = self.arena.read().await;

        let slot = match config.checkpoint_id.as_deref() {
            Some(checkpoint_id) => arena.slot(thread_id, checkpoint_id),
            None => arena.latest_slot(thread_id),
        };
        match slot.and_then(|slot| arena.record(slot)) {
            Some(record) => self.decode_tuple(&arena, record).map(Some),
            None => Ok(None),
        }
    }

    async fn list(
        &self,
        config: Option<&CheckpointConfig>,
        filter: Option<HashMap<String, Value>>,
        before: Option<&CheckpointConfig>,
        limit: Option<usize>,
    ) -> Result<CheckpointStream> {
        let thread_id = match config {
            Some(config) if config.thread_id.is_some() => Some(config.require_thread_id()?),
            _ => None,
        };
        let before_id = before.and_then(|before| before.checkpoint_id.as_deref());
        let filter = filter.unwrap_or_default();
        let arena = self.arena.read().await;

        let candidates: Vec<&Record> = match thread_id {
            Some(thread_id) => arena
                .by_thread
                .get(thread_id)
                .into_iter()
                .flat_map(|index| index.values().rev())
                .filter_map(|slot| arena.record(*slot))
                .collect(),
            None => {
                let mut all: Vec<&Record> = arena.records.iter().flatten().collect();
                all.sort_by(|a, b| {
                    b.checkpoint_id
                        .cmp(&a.checkpoint_id)
                        .then_with(|| b.thread_id.cmp(&a.thread_id))
                });
                all
            }
        };

        let mut results = Vec::new();
        for record in candidates {
            if limit.is_some_and(|limit| results.len() >= limit) {
                break;
            }
            if before_id.is_some_and(|before_id| record.checkpoint_id.as_str() >= before_id) {
                continue;
            }
            match self.metadata_matches(record, &filter) {
                Ok(true) => results.push(self.decode_tuple(&arena, record)),
                Ok(false) => {}
                Err(err) => results.push(Err(err)),
            }
        }

        Ok(Box::pin(stream::iter(results)))
    }

    async fn put(
        &self,
        config: &CheckpointConfig,
        mut checkpoint: Checkpoint,
        metadata: CheckpointMetadata,
        _new_versions: ChannelVersions,
    ) -> Result<CheckpointConfig> {
        let thread_id = config.require_thread_id()?.to_string();
        if checkpoint.id.trim().is_empty() {
            checkpoint.id = next_checkpoint_id();
        }
        let checkpoint_id = checkpoint.id.clone();
        let parent_checkpoint_id = config
            .checkpoint_id
            .clone()
            .filter(|parent| !parent.trim().is_empty() && *parent != checkpoint_id);

        let state = self
            .serializer
            .dumps(&checkpoint)
            .map_err(|err| CheckpointError::serialization(&thread_id, &checkpoint_id, err))?;
        let metadata = self
            .serializer
            .dumps(&metadata)
            .map_err(|err| CheckpointError::serialization(&thread_id, &checkpoint_id, err))?;

        let mut arena = self.arena.write().await;
        if let Some(parent) = &parent_checkpoint_id {
            if arena.slot(&thread_id, parent).is_none() {
                return Err(CheckpointError::InvalidReference(format!(
                    "parent checkpoint {} not found in thread {}",
                    parent, thread_id
                )));
            }
            if arena.chain_contains(&thread_id, parent, &checkpoint_id) {
                return Err(CheckpointError::InvalidReference(format!(
                    "checkpoint {} cannot descend from its own descendant {}",
                    checkpoint_id, parent
                )));
            }
        }

        let now = Utc::now();
        arena.upsert(Record {
            thread_id: thread_id.clone(),
            checkpoint_id: checkpoint_id.clone(),
            parent_checkpoint_id,
            state,
            metadata,
            created_at: now,
            updated_at: now,
        });
        debug!(thread_id = %thread_id, checkpoint_id = %checkpoint_id, "Stored checkpoint");

        Ok(CheckpointConfig {
            thread_id: Some(thread_id),
            checkpoint_id: Some(checkpoint_id),
            extra: config.extra.clone(),
        })
    }

    async fn put_writes(
        &self,
        config: &CheckpointConfig,
        writes: Vec<(String, Value)>,
        task_id: String,
    ) -> Result<()> {
        let thread_id = config.require_thread_id()?;
        let checkpoint_id = config.require_checkpoint_id()?;

        let encoded = writes
            .into_iter()
            .enumerate()
            .map(|(idx, (channel, value))| {
                let bytes = self
                    .serializer
                    .dumps(&value)
                    .map_err(|err| CheckpointError::serialization(thread_id, checkpoint_id, err))?;
                Ok(((task_id.clone(), idx), (channel, bytes)))
            })
            .collect::<Result<Vec<_>>>()?;
        let count = encoded.len();

        let mut arena = self.arena.write().await;
        let task_writes = arena
            .writes
            .entry(thread_id.to_string())
            .or_default()
            .entry(checkpoint_id.to_string())
            .or_default();
        task_writes.retain(|(task, _), _| *task != task_id);
        task_writes.extend(encoded);

        debug!(
            thread_id = %thread_id,
            checkpoint_id = %checkpoint_id,
            task_id = %task_id,
            count,
            "Stored pending writes"
        );
        Ok(())
    }

    async fn get_writes(&self, config: &CheckpointConfig) -> Result<Vec<PendingWrite>> {
        let thread_id = config.require_thread_id()?;
        let checkpoint_id = config.require_checkpoint_id()?;
        let arena = self.arena.read().await;
        self.decode_writes(&arena, thread_id, checkpoint_id)
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<()> {
        let thread_id = CheckpointConfig::for_thread(thread_id)
            .require_thread_id()?
            .to_string();
        let removed = self.arena.write().await.remove_thread(&thread_id);
        debug!(thread_id = %thread_id, removed, "Deleted thread");
        Ok(())
    }

    async fn thread_stats(&self, owner: Option<&str>) -> Result<Vec<ThreadStats>> {
        let arena = self.arena.read().await;
        let stats = arena
            .by_thread
            .iter()
            .filter(|(thread_id, _)| owner.is_none() || owner_of(thread_id) == owner)
            .filter_map(|(thread_id, index)| {
                let records: Vec<&Record> = index.values().filter_map(|slot| arena.record(*slot)).collect();
                let last_updated = records.iter().map(|record| record.updated_at).max()?;
                Some(ThreadStats {
                    thread_id: thread_id.clone(),
                    latest_checkpoint_id: index.keys().next_back()?.clone(),
                    checkpoint_count: records.len(),
                    last_updated,
                })
            })
            .collect();
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::CheckpointSource;
    use futures::TryStreamExt;
    use serde_json::json;

    async fn put_empty(saver: &InMemoryCheckpointSaver, config: &CheckpointConfig) -> CheckpointConfig {
        saver
            .put(config, Checkpoint::empty(), CheckpointMetadata::new(), HashMap::new())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_save_and_load_checkpoint() {
        let saver = InMemoryCheckpointSaver::new();
        let checkpoint = Checkpoint::empty();
        let metadata = CheckpointMetadata::new().with_source(CheckpointSource::Input);
        let config = CheckpointConfig::for_thread("thread-1");

        let saved_config = saver
            .put(&config, checkpoint.clone(), metadata, HashMap::new())
            .await
            .unwrap();

        assert_eq!(saved_config.checkpoint_id.as_deref(), Some(checkpoint.id.as_str()));

        let tuple = saver.get_tuple(&saved_config).await.unwrap().unwrap();
        assert_eq!(tuple.checkpoint, checkpoint);
        assert_eq!(tuple.metadata.source, Some(CheckpointSource::Input));
        assert!(tuple.parent_config.is_none());
    }

    #[tokio::test]
    async fn test_empty_id_is_assigned() {
        let saver = InMemoryCheckpointSaver::new();
        let mut checkpoint = Checkpoint::empty();
        checkpoint.id = String::new();

        let saved = saver
            .put(&CheckpointConfig::for_thread("t"), checkpoint, CheckpointMetadata::new(), HashMap::new())
            .await
            .unwrap();

        let id = saved.checkpoint_id.unwrap();
        assert!(!id.is_empty());
        let tuple = saver.get_tuple(&CheckpointConfig::for_thread("t")).await.unwrap().unwrap();
        assert_eq!(tuple.checkpoint.id, id);
    }

    #[tokio::test]
    async fn test_parent_linkage_follows_config() {
        let saver = InMemoryCheckpointSaver::new();
        let first = put_empty(&saver, &CheckpointConfig::for_thread("t")).await;
        let second = put_empty(&saver, &first).await;

        let tuple = saver.get_tuple(&second).await.unwrap().unwrap();
        assert_eq!(tuple.parent_checkpoint_id(), first.checkpoint_id.as_deref());
    }

    #[tokio::test]
    async fn test_missing_parent_is_invalid_reference() {
        let saver = InMemoryCheckpointSaver::new();
        let config = CheckpointConfig::for_thread("t").with_checkpoint_id("nope");

        let err = saver
            .put(&config, Checkpoint::empty(), CheckpointMetadata::new(), HashMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CheckpointError::InvalidReference(_)));
        assert_eq!(saver.checkpoint_count().await, 0);
    }

    #[tokio::test]
    async fn test_upsert_cannot_create_cycle() {
        let saver = InMemoryCheckpointSaver::new();
        let c1 = put_empty(&saver, &CheckpointConfig::for_thread("t")).await;
        let c2 = put_empty(&saver, &c1).await;

        let mut again = Checkpoint::empty();
        again.id = c1.checkpoint_id.clone().unwrap();
        let err = saver
            .put(&c2, again, CheckpointMetadata::new(), HashMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CheckpointError::InvalidReference(_)));
    }

    #[tokio::test]
    async fn test_upsert_keeps_created_at() {
        let saver = InMemoryCheckpointSaver::new();
        let checkpoint = Checkpoint::empty();
        let config = CheckpointConfig::for_thread("t");

        let saved = saver
            .put(&config, checkpoint.clone(), CheckpointMetadata::new().with_step(0), HashMap::new())
            .await
            .unwrap();
        let first = saver.get_tuple(&saved).await.unwrap().unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        saver
            .put(&config, checkpoint, CheckpointMetadata::new().with_step(1), HashMap::new())
            .await
            .unwrap();
        let second = saver.get_tuple(&saved).await.unwrap().unwrap();

        assert_eq!(saver.checkpoint_count().await, 1);
        assert_eq!(second.created_at, first.created_at);
        assert!(second.updated_at > first.updated_at);
        assert_eq!(second.metadata.step, Some(1));
    }

    #[tokio::test]
    async fn test_list_all_threads_newest_first() {
        let saver = InMemoryCheckpointSaver::new();
        put_empty(&saver, &CheckpointConfig::for_thread("a")).await;
        put_empty(&saver, &CheckpointConfig::for_thread("b")).await;
        put_empty(&saver, &CheckpointConfig::for_thread("a")).await;

        let tuples: Vec<_> = saver
            .list(None, None, None, None)
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();

        let ids: Vec<_> = tuples.iter().map(|t| t.checkpoint.id.clone()).collect();
        let mut sorted = ids.clone();
        sorted.sort_by(|a, b| b.cmp(a));
        assert_eq!(ids, sorted);
        assert_eq!(tuples[1].thread_id(), "b");
    }

    #[tokio::test]
    async fn test_delete_thread_frees_slots() {
        let saver = InMemoryCheckpointSaver::new();
        put_empty(&saver, &CheckpointConfig::for_thread("thread-1")).await;
        put_empty(&saver, &CheckpointConfig::for_thread("thread-2")).await;

        saver.delete_thread("thread-1").await.unwrap();
        assert_eq!(saver.thread_count().await, 1);

        put_empty(&saver, &CheckpointConfig::for_thread("thread-3")).await;
        assert_eq!(saver.arena.read().await.records.len(), 2);
        assert_eq!(saver.checkpoint_count().await, 2);
    }

    #[tokio::test]
    async fn test_put_writes_replaces_task() {
        let saver = InMemoryCheckpointSaver::new();
        let saved = put_empty(&saver, &CheckpointConfig::for_thread("thread-1")).await;

        saver
            .put_writes(
                &saved,
                vec![("channel1".to_string(), json!(42)), ("channel2".to_string(), json!("hello"))],
                "task-b".to_string(),
            )
            .await
            .unwrap();
        saver
            .put_writes(&saved, vec![("channel1".to_string(), json!(1))], "task-a".to_string())
            .await
            .unwrap();
        saver
            .put_writes(&saved, vec![("channel3".to_string(), json!(null))], "task-b".to_string())
            .await
            .unwrap();

        let writes = saver.get_writes(&saved).await.unwrap();
        assert_eq!(
            writes,
            vec![
                ("task-a".to_string(), "channel1".to_string(), json!(1)),
                ("task-b".to_string(), "channel3".to_string(), json!(null)),
            ]
        );
        let tuple = saver.get_tuple(&saved).await.unwrap().unwrap();
        assert_eq!(tuple.pending_writes, writes);
    }

    #[tokio::test]
    async fn test_clear() {
        let saver = InMemoryCheckpointSaver::new();
        put_empty(&saver, &CheckpointConfig::for_thread("thread-1")).await;

        assert_eq!(saver.checkpoint_count().await, 1);

        saver.clear().await;

        assert_eq!(saver.checkpoint_count().await, 0);
    }

    #[tokio::test]
    async fn test_thread_stats_ignore_state_bytes() {
        let saver = InMemoryCheckpointSaver::new();
        let first = put_empty(&saver, &CheckpointConfig::for_thread("alice_1")).await;
        let latest = put_empty(&saver, &first).await;
        put_empty(&saver, &CheckpointConfig::for_thread("bob_1")).await;

        {
            let mut arena = saver.arena.write().await;
            for record in arena.records.iter_mut().flatten() {
                record.state = vec![0xff, 0x00];
            }
        }

        let mut stats = saver.thread_stats(None).await.unwrap();
        stats.sort_by(|a, b| a.thread_id.cmp(&b.thread_id));
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].thread_id, "alice_1");
        assert_eq!(stats[0].checkpoint_count, 2);
        assert_eq!(Some(stats[0].latest_checkpoint_id.clone()), latest.checkpoint_id);

        let alice = saver.thread_stats(Some("alice")).await.unwrap();
        assert_eq!(alice.len(), 1);
        assert!(saver.thread_stats(Some("carol")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_conformance() {
        crate::conformance::run_all(&InMemoryCheckpointSaver::new()).await.unwrap();
    }
}

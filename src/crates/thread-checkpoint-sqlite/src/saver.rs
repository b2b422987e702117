//! Durable checkpoint storage on SQLite
//!
//! Rows live in two tables created by the bundled migrations:
//!
//! ```text
//! checkpoints        (thread_id, checkpoint_id) PK
//!                    parent_checkpoint_id, owner, state BLOB, metadata TEXT,
//!                    created_at, updated_at
//! checkpoint_writes  (thread_id, checkpoint_id, task_id, idx) PK
//!                    channel, value BLOB
//! ```
//!
//! Checkpoint state goes through the configured [`SerializerProtocol`]. Metadata is
//! always stored as JSON text so `list` can filter on it with SQLite's JSON functions.
//! Timestamps are RFC 3339 strings in UTC with microsecond precision, which sort
//! lexicographically.
//!
//! Reads are retried on transient failures. Writes are not; `put` is an upsert, so
//! callers may retry it safely.

use crate::connection::ConnectionManager;
use crate::error::map_sqlx_error;
use crate::retry::{with_retry, RetryConfig};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use futures::stream;
use serde_json::Value;
use sqlx::sqlite::SqlitePool;
use sqlx::{FromRow, QueryBuilder, Sqlite};
use std::collections::HashMap;
use std::sync::Arc;
use thread_checkpoint::{
    next_checkpoint_id, owner_of, ChannelVersions, Checkpoint, CheckpointConfig,
    CheckpointError, CheckpointMetadata, CheckpointSaver, CheckpointStream, CheckpointTuple,
    JsonSerializer, PendingWrite, Result, SerializerProtocol, ThreadStats,
};
use tracing::debug;

/// Rows per pending-writes lookup, kept under SQLite's bound-parameter limit
const WRITES_BATCH: usize = 400;

const CHECKPOINT_COLUMNS: &str = "thread_id, checkpoint_id, parent_checkpoint_id, state, \
     metadata, created_at, updated_at";

#[derive(Debug, FromRow)]
struct CheckpointRow {
    thread_id: String,
    checkpoint_id: String,
    parent_checkpoint_id: Option<String>,
    state: Vec<u8>,
    metadata: String,
    created_at: String,
    updated_at: String,
}

#[derive(Debug, FromRow)]
struct ThreadStatsRow {
    thread_id: String,
    latest_checkpoint_id: String,
    checkpoint_count: i64,
    last_updated: String,
}

#[derive(Debug, FromRow)]
struct WriteRow {
    thread_id: String,
    checkpoint_id: String,
    task_id: String,
    channel: String,
    value: Vec<u8>,
}

/// Rows selected by `list`
#[derive(Debug, Default, Clone)]
struct Selection {
    thread_id: Option<String>,
    before: Option<String>,
    filter: Vec<(String, Value)>,
    limit: Option<usize>,
}

impl Selection {
    fn query(&self) -> QueryBuilder<'_, Sqlite> {
        let mut query = QueryBuilder::new(format!(
            "SELECT {} FROM checkpoints WHERE 1 = 1",
            CHECKPOINT_COLUMNS
        ));
        if let Some(thread_id) = &self.thread_id {
            query.push(" AND thread_id = ").push_bind(thread_id.as_str());
        }
        if let Some(before) = &self.before {
            query.push(" AND checkpoint_id < ").push_bind(before.as_str());
        }
        // JSON equality: the type check keeps `true` apart from `1` and a missing key
        // apart from `null`; `IS` lets two nulls compare equal.
        for (key, value) in &self.filter {
            let literal = value.to_string();
            query
                .push(" AND json_type(metadata, ")
                .push_bind(json_path(key))
                .push(") = json_type(")
                .push_bind(literal.clone())
                .push(") AND json_extract(metadata, ")
                .push_bind(json_path(key))
                .push(") IS json_extract(")
                .push_bind(literal)
                .push(", '$')");
        }
        query.push(" ORDER BY checkpoint_id DESC, thread_id DESC");
        if let Some(limit) = self.limit {
            query.push(" LIMIT ").push_bind(i64::try_from(limit).unwrap_or(i64::MAX));
        }
        query
    }
}

fn json_path(key: &str) -> String {
    format!("$.\"{}\"", key.replace('"', "\\\""))
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(value: &str) -> std::result::Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(value).map(|at| at.with_timezone(&Utc))
}

/// SQLite-backed checkpoint saver
///
/// Savers created from the same [`ConnectionManager`] and URL share one pool.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use thread_checkpoint_sqlite::{sqlite_url, ConnectionManager, SqliteCheckpointSaver};
///
/// # fn main() -> thread_checkpoint::Result<()> {
/// let manager = Arc::new(ConnectionManager::default());
/// let saver = SqliteCheckpointSaver::new(manager, sqlite_url("data/threads.db")?);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct SqliteCheckpointSaver<S = JsonSerializer> {
    manager: Arc<ConnectionManager>,
    url: String,
    retry: RetryConfig,
    serializer: S,
}

impl SqliteCheckpointSaver<JsonSerializer> {
    /// Create a saver for `url`, retrying reads per the manager's policy
    pub fn new(manager: Arc<ConnectionManager>, url: impl Into<String>) -> Self {
        Self::with_serializer(manager, url, JsonSerializer::new())
    }
}

impl<S: SerializerProtocol> SqliteCheckpointSaver<S> {
    /// Create a saver that encodes checkpoint state with the given serializer
    pub fn with_serializer(manager: Arc<ConnectionManager>, url: impl Into<String>, serializer: S) -> Self {
        let retry = manager.retry_config().clone();
        Self {
            manager,
            url: url.into(),
            retry,
            serializer,
        }
    }

    /// Override the retry policy for reads
    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn pool(&self) -> Result<SqlitePool> {
        self.manager.pool(&self.url).await
    }

    async fn fetch_one(&self, thread_id: &str, checkpoint_id: Option<&str>) -> Result<Option<CheckpointRow>> {
        let pool = self.pool().await?;
        let row = match checkpoint_id {
            Some(checkpoint_id) => {
                sqlx::query_as::<_, CheckpointRow>(&format!(
                    "SELECT {} FROM checkpoints WHERE thread_id = ? AND checkpoint_id = ?",
                    CHECKPOINT_COLUMNS
                ))
                .bind(thread_id)
                .bind(checkpoint_id)
                .fetch_optional(&pool)
                .await
            }
            None => {
                sqlx::query_as::<_, CheckpointRow>(&format!(
                    "SELECT {} FROM checkpoints WHERE thread_id = ? \
                     ORDER BY checkpoint_id DESC LIMIT 1",
                    CHECKPOINT_COLUMNS
                ))
                .bind(thread_id)
                .fetch_optional(&pool)
                .await
            }
        };
        row.map_err(map_sqlx_error)
    }

    async fn fetch_selection(&self, selection: &Selection) -> Result<Vec<CheckpointRow>> {
        let pool = self.pool().await?;
        let mut query = selection.query();
        query
            .build_query_as::<CheckpointRow>()
            .fetch_all(&pool)
            .await
            .map_err(map_sqlx_error)
    }

    /// Pending writes for a set of checkpoints, fetched in batches
    async fn fetch_writes(&self, keys: &[(&str, &str)]) -> Result<Vec<WriteRow>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let pool = self.pool().await?;
        let mut rows = Vec::new();
        for batch in keys.chunks(WRITES_BATCH) {
            let mut query = QueryBuilder::<Sqlite>::new(
                "SELECT thread_id, checkpoint_id, task_id, channel, value \
                 FROM checkpoint_writes WHERE ",
            );
            for (i, (thread_id, checkpoint_id)) in batch.iter().enumerate() {
                if i > 0 {
                    query.push(" OR ");
                }
                query
                    .push("(thread_id = ")
                    .push_bind(*thread_id)
                    .push(" AND checkpoint_id = ")
                    .push_bind(*checkpoint_id)
                    .push(")");
            }
            query.push(" ORDER BY thread_id, checkpoint_id, task_id, idx");
            let mut batch_rows = query
                .build_query_as::<WriteRow>()
                .fetch_all(&pool)
                .await
                .map_err(map_sqlx_error)?;
            rows.append(&mut batch_rows);
        }
        Ok(rows)
    }

    /// Rows plus their pending writes, read under the retry policy
    async fn read_tuples(&self, selection: &Selection) -> Result<Vec<Result<CheckpointTuple>>> {
        let (rows, writes) = with_retry(&self.retry, "list", || async move {
            let rows = self.fetch_selection(selection).await?;
            let writes = {
                let keys: Vec<(&str, &str)> = rows
                    .iter()
                    .map(|row| (row.thread_id.as_str(), row.checkpoint_id.as_str()))
                    .collect();
                self.fetch_writes(&keys).await?
            };
            Ok((rows, writes))
        })
        .await?;

        let mut by_checkpoint: HashMap<(String, String), Vec<WriteRow>> = HashMap::new();
        for write in writes {
            by_checkpoint
                .entry((write.thread_id.clone(), write.checkpoint_id.clone()))
                .or_default()
                .push(write);
        }

        Ok(rows
            .into_iter()
            .map(|row| {
                let writes = by_checkpoint
                    .remove(&(row.thread_id.clone(), row.checkpoint_id.clone()))
                    .unwrap_or_default();
                self.decode_tuple(row, writes)
            })
            .collect())
    }

    fn decode_tuple(&self, row: CheckpointRow, writes: Vec<WriteRow>) -> Result<CheckpointTuple> {
        let CheckpointRow {
            thread_id,
            checkpoint_id,
            parent_checkpoint_id,
            state,
            metadata,
            created_at,
            updated_at,
        } = row;
        let ids = |err: &dyn std::fmt::Display| CheckpointError::serialization(&thread_id, &checkpoint_id, err);

        let checkpoint: Checkpoint = self.serializer.loads(&state).map_err(|e| ids(&e))?;
        let metadata: CheckpointMetadata = serde_json::from_str(&metadata).map_err(|e| ids(&e))?;
        let created_at = parse_timestamp(&created_at).map_err(|e| ids(&e))?;
        let updated_at = parse_timestamp(&updated_at).map_err(|e| ids(&e))?;
        let pending_writes = self.decode_writes(writes)?;

        let mut tuple = CheckpointTuple::new(
            CheckpointConfig::for_thread(&thread_id).with_checkpoint_id(checkpoint_id.clone()),
            checkpoint,
            metadata,
        )
        .with_pending_writes(pending_writes)
        .with_timestamps(created_at, updated_at);
        if let Some(parent) = parent_checkpoint_id {
            tuple = tuple.with_parent_config(CheckpointConfig::for_thread(&thread_id).with_checkpoint_id(parent));
        }
        Ok(tuple)
    }

    fn decode_writes(&self, writes: Vec<WriteRow>) -> Result<Vec<PendingWrite>> {
        writes
            .into_iter()
            .map(|write| {
                let value: Value = self.serializer.loads(&write.value).map_err(|err| {
                    CheckpointError::serialization(&write.thread_id, &write.checkpoint_id, err)
                })?;
                Ok((write.task_id, write.channel, value))
            })
            .collect()
    }
}

#[async_trait]
impl<S> CheckpointSaver for SqliteCheckpointSaver<S>
where
    S: SerializerProtocol + 'static,
{
    async fn get_tuple(&self, config: &CheckpointConfig) -> Result<Option<CheckpointTuple>> {
        let thread_id = config.require_thread_id()?;
        let checkpoint_id = config.checkpoint_id.as_deref();

        let found = with_retry(&self.retry, "get_tuple", || async move {
            let Some(row) = self.fetch_one(thread_id, checkpoint_id).await? else {
                return Ok(None);
            };
            let writes = self
                .fetch_writes(&[(row.thread_id.as_str(), row.checkpoint_id.as_str())])
                .await?;
            Ok(Some((row, writes)))
        })
        .await?;

        match found {
            Some((row, writes)) => self.decode_tuple(row, writes).map(Some),
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
            Some(config) if config.thread_id.is_some() => Some(config.require_thread_id()?.to_string()),
            _ => None,
        };
        let mut filter: Vec<(String, Value)> = filter.unwrap_or_default().into_iter().collect();
        filter.sort_by(|a, b| a.0.cmp(&b.0));

        let selection = Selection {
            thread_id,
            before: before.and_then(|before| before.checkpoint_id.clone()),
            filter,
            limit,
        };
        let tuples = self.read_tuples(&selection).await?;
        Ok(Box::pin(stream::iter(tuples)))
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
        let metadata = serde_json::to_string(&metadata)
            .map_err(|err| CheckpointError::serialization(&thread_id, &checkpoint_id, err))?;
        let now = timestamp(Utc::now());

        let pool = self.pool().await?;
        let mut tx = pool.begin().await.map_err(map_sqlx_error)?;

        // The upsert runs first so the transaction holds the write lock before it reads;
        // under WAL a read-first transaction cannot upgrade once another writer commits.
        sqlx::query(
            "INSERT INTO checkpoints \
                 (thread_id, checkpoint_id, parent_checkpoint_id, owner, state, metadata, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT (thread_id, checkpoint_id) DO UPDATE SET \
                 parent_checkpoint_id = excluded.parent_checkpoint_id, \
                 state = excluded.state, \
                 metadata = excluded.metadata, \
                 updated_at = excluded.updated_at",
        )
        .bind(&thread_id)
        .bind(&checkpoint_id)
        .bind(parent_checkpoint_id.as_deref())
        .bind(owner_of(&thread_id))
        .bind(&state)
        .bind(&metadata)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        // Returning early drops `tx`, which rolls the upsert back
        if let Some(parent) = &parent_checkpoint_id {
            let ancestors: Vec<(String,)> = sqlx::query_as(
                "WITH RECURSIVE chain(id) AS ( \
                     SELECT checkpoint_id FROM checkpoints WHERE thread_id = ? AND checkpoint_id = ? \
                     UNION \
                     SELECT c.parent_checkpoint_id FROM checkpoints c JOIN chain ON c.checkpoint_id = chain.id \
                     WHERE c.thread_id = ? AND c.parent_checkpoint_id IS NOT NULL \
                 ) SELECT id FROM chain",
            )
            .bind(&thread_id)
            .bind(parent)
            .bind(&thread_id)
            .fetch_all(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

            if ancestors.is_empty() {
                return Err(CheckpointError::InvalidReference(format!(
                    "parent checkpoint {} not found in thread {}",
                    parent, thread_id
                )));
            }
            if ancestors.iter().any(|(id,)| *id == checkpoint_id) {
                return Err(CheckpointError::InvalidReference(format!(
                    "checkpoint {} cannot descend from its own descendant {}",
                    checkpoint_id, parent
                )));
            }
        }

        tx.commit().await.map_err(map_sqlx_error)?;
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
            .map(|(channel, value)| {
                let bytes = self
                    .serializer
                    .dumps(&value)
                    .map_err(|err| CheckpointError::serialization(thread_id, checkpoint_id, err))?;
                Ok((channel, bytes))
            })
            .collect::<Result<Vec<_>>>()?;
        let count = encoded.len();

        let pool = self.pool().await?;
        let mut tx = pool.begin().await.map_err(map_sqlx_error)?;

        sqlx::query("DELETE FROM checkpoint_writes WHERE thread_id = ? AND checkpoint_id = ? AND task_id = ?")
            .bind(thread_id)
            .bind(checkpoint_id)
            .bind(&task_id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        for (idx, (channel, bytes)) in encoded.iter().enumerate() {
            sqlx::query(
                "INSERT INTO checkpoint_writes (thread_id, checkpoint_id, task_id, idx, channel, value) \
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(thread_id)
            .bind(checkpoint_id)
            .bind(&task_id)
            .bind(idx as i64)
            .bind(channel)
            .bind(bytes)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        }

        tx.commit().await.map_err(map_sqlx_error)?;
        debug!(
            thread_id = %thread_id,
            checkpoint_id = %checkpoint_id,
            task_id = %task_id,
            count = count,
            "Stored pending writes"
        );
        Ok(())
    }

    async fn get_writes(&self, config: &CheckpointConfig) -> Result<Vec<PendingWrite>> {
        let thread_id = config.require_thread_id()?;
        let checkpoint_id = config.require_checkpoint_id()?;

        let rows = with_retry(&self.retry, "get_writes", || async move {
            self.fetch_writes(&[(thread_id, checkpoint_id)]).await
        })
        .await?;
        self.decode_writes(rows)
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<()> {
        let thread_id = CheckpointConfig::for_thread(thread_id)
            .require_thread_id()?
            .to_string();

        let pool = self.pool().await?;
        let mut tx = pool.begin().await.map_err(map_sqlx_error)?;

        sqlx::query("DELETE FROM checkpoint_writes WHERE thread_id = ?")
            .bind(&thread_id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        let removed = sqlx::query("DELETE FROM checkpoints WHERE thread_id = ?")
            .bind(&thread_id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?
            .rows_affected();

        tx.commit().await.map_err(map_sqlx_error)?;
        debug!(thread_id = %thread_id, checkpoints = removed, "Deleted thread rows");
        Ok(())
    }

    async fn thread_stats(&self, owner: Option<&str>) -> Result<Vec<ThreadStats>> {
        let rows = with_retry(&self.retry, "thread_stats", || async move {
            let pool = self.pool().await?;
            let mut query = QueryBuilder::<Sqlite>::new(
                "SELECT thread_id, MAX(checkpoint_id) AS latest_checkpoint_id, \
                 COUNT(*) AS checkpoint_count, MAX(updated_at) AS last_updated \
                 FROM checkpoints",
            );
            if let Some(owner) = owner {
                query.push(" WHERE owner = ").push_bind(owner);
            }
            query.push(" GROUP BY thread_id");
            query
                .build_query_as::<ThreadStatsRow>()
                .fetch_all(&pool)
                .await
                .map_err(map_sqlx_error)
        })
        .await?;

        rows.into_iter()
            .map(|row| {
                let last_updated = parse_timestamp(&row.last_updated).map_err(|err| {
                    CheckpointError::serialization(&row.thread_id, &row.latest_checkpoint_id, err)
                })?;
                Ok(ThreadStats {
                    checkpoint_count: usize::try_from(row.checkpoint_count).unwrap_or_default(),
                    thread_id: row.thread_id,
                    latest_checkpoint_id: row.latest_checkpoint_id,
                    last_updated,
                })
            })
            .collect()
    }
}

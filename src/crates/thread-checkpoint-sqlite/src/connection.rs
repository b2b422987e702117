//! Backend connection management
//!
//! [`ConnectionManager`] owns one SQLite pool per connection URL. A pool is created
//! lazily on first use, checked with a `SELECT 1` probe, migrated, and then shared by
//! every saver pointing at the same URL. Pools that stop answering the probe are
//! replaced on the next request.
//!
//! Each URL has its own slot lock. Connecting to or probing one destination never
//! holds up requests for another.
//!
//! The manager is an explicit value: create one at startup, hand an `Arc` of it to the
//! savers, and call [`ConnectionManager::close_all`] on shutdown.

use crate::error::{map_migrate_error, map_sqlx_error};
use crate::retry::{with_retry, RetryConfig};
use serde::{Deserialize, Serialize};
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thread_checkpoint::{CheckpointError, Result};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Pool tuning shared by every URL the manager opens
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolSettings {
    /// Maximum number of concurrent connections per pool
    pub max_connections: u32,

    /// How long to wait for a free connection (in milliseconds)
    pub acquire_timeout_ms: u64,

    /// How long SQLite waits on a locked database (in milliseconds)
    pub busy_timeout_ms: u64,

    /// Create the database file when it does not exist
    pub create_if_missing: bool,

    /// Minimum time between liveness probes of a cached pool (in milliseconds)
    pub probe_interval_ms: u64,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 5,
            acquire_timeout_ms: 5_000,
            busy_timeout_ms: 5_000,
            create_if_missing: true,
            probe_interval_ms: 30_000,
        }
    }
}

#[derive(Debug)]
struct PoolEntry {
    pool: SqlitePool,
    verified_at: Instant,
}

/// Per-URL slot; empty until the first successful connect
type PoolSlot = Arc<Mutex<Option<PoolEntry>>>;

/// Shared pool registry keyed by connection URL
#[derive(Debug)]
pub struct ConnectionManager {
    settings: PoolSettings,
    retry: RetryConfig,
    pools: Mutex<HashMap<String, PoolSlot>>,
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new(PoolSettings::default(), RetryConfig::default())
    }
}

impl ConnectionManager {
    /// Create a manager with the given pool settings and connection retry policy
    pub fn new(settings: PoolSettings, retry: RetryConfig) -> Self {
        Self {
            settings,
            retry,
            pools: Mutex::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &PoolSettings {
        &self.settings
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    /// Get the pool for `url`, creating and migrating it on first use
    ///
    /// Concurrent first calls for the same URL create exactly one pool.
    pub async fn pool(&self, url: &str) -> Result<SqlitePool> {
        let slot = self.slot(url).await;
        let mut entry = slot.lock().await;

        if let Some(current) = entry.as_mut() {
            if !current.pool.is_closed() {
                if current.verified_at.elapsed() < Duration::from_millis(self.settings.probe_interval_ms) {
                    return Ok(current.pool.clone());
                }
                match probe(&current.pool).await {
                    Ok(()) => {
                        current.verified_at = Instant::now();
                        return Ok(current.pool.clone());
                    }
                    Err(e) => {
                        warn!(url = %url, error = %e, "Liveness probe failed, reconnecting");
                    }
                }
            }
            if let Some(stale) = entry.take() {
                tokio::spawn(async move { stale.pool.close().await });
            }
        }

        let pool = with_retry(&self.retry, "connect", || self.connect(url)).await?;
        *entry = Some(PoolEntry {
            pool: pool.clone(),
            verified_at: Instant::now(),
        });
        Ok(pool)
    }

    /// Number of live pools
    pub async fn pool_count(&self) -> usize {
        let mut count = 0;
        for slot in self.slots().await {
            if slot.lock().await.is_some() {
                count += 1;
            }
        }
        count
    }

    /// Close the pool for `url`; returns whether one was open
    pub async fn close(&self, url: &str) -> bool {
        let slot = self.pools.lock().await.remove(url);
        let Some(slot) = slot else {
            return false;
        };
        let entry = slot.lock().await.take();
        match entry {
            Some(entry) => {
                entry.pool.close().await;
                info!(url = %url, "Connection pool closed");
                true
            }
            None => false,
        }
    }

    /// Close every pool
    pub async fn close_all(&self) {
        let slots: Vec<(String, PoolSlot)> = self.pools.lock().await.drain().collect();
        for (url, slot) in slots {
            let entry = slot.lock().await.take();
            if let Some(entry) = entry {
                entry.pool.close().await;
                debug!(url = %url, "Connection pool closed");
            }
        }
    }

    /// The slot for `url`; the registry lock is held only for the lookup
    async fn slot(&self, url: &str) -> PoolSlot {
        self.pools
            .lock()
            .await
            .entry(url.to_string())
            .or_default()
            .clone()
    }

    async fn slots(&self) -> Vec<PoolSlot> {
        self.pools.lock().await.values().cloned().collect()
    }

    async fn connect(&self, url: &str) -> Result<SqlitePool> {
        let in_memory = url.contains(":memory:");

        let mut options = SqliteConnectOptions::from_str(url)
            .map_err(map_sqlx_error)?
            .create_if_missing(self.settings.create_if_missing)
            .busy_timeout(Duration::from_millis(self.settings.busy_timeout_ms));
        if !in_memory {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        let mut pool_options = SqlitePoolOptions::new()
            .max_connections(self.settings.max_connections)
            .acquire_timeout(Duration::from_millis(self.settings.acquire_timeout_ms));
        // An in-memory database lives only as long as its connection, and shared-cache
        // table locks ignore the busy timeout, so it gets exactly one.
        if in_memory {
            pool_options = pool_options
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }

        debug!(url = %url, "Connecting to checkpoint database");
        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(map_sqlx_error)?;

        if let Err(e) = prepare(&pool).await {
            pool.close().await;
            return Err(e);
        }

        info!(
            url = %url,
            max_connections = self.settings.max_connections,
            "Checkpoint database ready"
        );
        Ok(pool)
    }
}

/// Connection URL for a database file, creating its directory if needed
pub fn sqlite_url<P: AsRef<Path>>(database_path: P) -> Result<String> {
    let path = database_path.as_ref();
    let path_str = path
        .to_str()
        .ok_or_else(|| CheckpointError::Config(format!("Invalid database path: {}", path.display())))?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }

    Ok(format!("sqlite:{}", path_str))
}

async fn probe(pool: &SqlitePool) -> Result<()> {
    sqlx::query("SELECT 1")
        .fetch_one(pool)
        .await
        .map(|_| ())
        .map_err(map_sqlx_error)
}

async fn prepare(pool: &SqlitePool) -> Result<()> {
    probe(pool).await?;
    MIGRATOR.run(pool).await.map_err(map_migrate_error)
}

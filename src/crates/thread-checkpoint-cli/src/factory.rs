//! Backend selection from configuration

use crate::config::{BackendKind, StoreConfig};
use std::sync::Arc;
use thread_checkpoint::{CheckpointError, CheckpointSaver, InMemoryCheckpointSaver, Result};
use thread_checkpoint_sqlite::{ConnectionManager, SqliteCheckpointSaver};
use tracing::debug;

/// Build the configured backend
///
/// No I/O happens here; the SQLite pool is opened on first use through `manager`.
pub fn open_saver(
    config: &StoreConfig,
    manager: &Arc<ConnectionManager>,
) -> Result<Arc<dyn CheckpointSaver>> {
    match config.store.backend {
        BackendKind::Memory => {
            debug!("Using in-memory checkpoint backend");
            Ok(Arc::new(InMemoryCheckpointSaver::new()))
        }
        BackendKind::Sqlite => {
            let url = config.sqlite.url.trim();
            if url.is_empty() {
                return Err(CheckpointError::Config("sqlite.url must not be empty".to_string()));
            }
            if url.starts_with("${") {
                return Err(CheckpointError::Config(format!(
                    "sqlite.url references an unset environment variable: {}",
                    url
                )));
            }
            debug!(url = %url, "Using SQLite checkpoint backend");
            let saver = SqliteCheckpointSaver::new(manager.clone(), url)
                .with_retry_config(config.retry.clone());
            Ok(Arc::new(saver))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;
    use thread_checkpoint::{Checkpoint, CheckpointConfig, CheckpointMetadata};
    use thread_checkpoint_sqlite::sqlite_url;

    #[tokio::test]
    async fn test_memory_backend() {
        let mut config = StoreConfig::default();
        config.store.backend = BackendKind::Memory;
        let manager = Arc::new(ConnectionManager::default());
        let saver = open_saver(&config, &manager).unwrap();

        saver
            .put(&CheckpointConfig::for_thread("a_1"), Checkpoint::empty(), CheckpointMetadata::new(), HashMap::new())
            .await
            .unwrap();
        assert!(saver.get_tuple(&CheckpointConfig::for_thread("a_1")).await.unwrap().is_some());
        assert_eq!(manager.pool_count().await, 0);
    }

    #[tokio::test]
    async fn test_sqlite_backend_opens_lazily() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = StoreConfig::default();
        assert_eq!(config.store.backend, BackendKind::Sqlite);
        config.sqlite.url = sqlite_url(temp_dir.path().join("threads.db")).unwrap();
        let manager = Arc::new(ConnectionManager::default());

        let saver = open_saver(&config, &manager).unwrap();
        assert_eq!(manager.pool_count().await, 0);

        saver
            .put(&CheckpointConfig::for_thread("a_1"), Checkpoint::empty(), CheckpointMetadata::new(), HashMap::new())
            .await
            .unwrap();
        assert_eq!(manager.pool_count().await, 1);
        manager.close_all().await;
    }

    #[test]
    fn test_unresolved_url_is_rejected() {
        let mut config = StoreConfig::default();
        config.store.backend = BackendKind::Sqlite;
        config.sqlite.url = "${THREAD_STORE_FACTORY_UNSET}".to_string();

        let manager = Arc::new(ConnectionManager::default());
        assert!(matches!(open_saver(&config, &manager), Err(CheckpointError::Config(_))));

        config.sqlite.url = "  ".to_string();
        assert!(matches!(open_saver(&config, &manager), Err(CheckpointError::Config(_))));
    }
}

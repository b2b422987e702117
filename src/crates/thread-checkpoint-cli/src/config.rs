//! Configuration loader with layered file support
//!
//! Loads configuration from:
//! 1. Default values
//! 2. User-level config: ~/.thread-store/config.toml
//! 3. Project-level config: ./.thread-store/config.toml
//! 4. An explicit file given with `--config`
//!
//! Later layers replace whole sections. `sqlite.url` may be written as `${VAR}` to read
//! it from the environment.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thread_checkpoint::{CheckpointError, Result};
use thread_checkpoint_sqlite::{PoolSettings, RetryConfig};
use tokio::fs;
use tracing::{debug, info};

/// Directory holding the config file, under the home and project directories
pub const CONFIG_DIR: &str = ".thread-store";

/// Config file name
pub const CONFIG_FILE: &str = "config.toml";

/// Storage backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Memory,
    #[default]
    Sqlite,
}

impl FromStr for BackendKind {
    type Err = CheckpointError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "memory" => Ok(BackendKind::Memory),
            "sqlite" => Ok(BackendKind::Sqlite),
            other => Err(CheckpointError::Config(format!(
                "Unknown backend '{}', expected 'memory' or 'sqlite'",
                other
            ))),
        }
    }
}

/// `[store]` section
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    pub backend: BackendKind,
}

/// `[sqlite]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SqliteSection {
    /// Connection URL (supports environment variable interpolation)
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
    pub busy_timeout_secs: u64,
    pub create_if_missing: bool,
}

impl Default for SqliteSection {
    fn default() -> Self {
        Self {
            url: "sqlite:thread-store.db".to_string(),
            max_connections: 5,
            acquire_timeout_secs: 5,
            busy_timeout_secs: 5,
            create_if_missing: true,
        }
    }
}

/// `[logging]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Default filter when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Complete store configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub store: StoreSection,
    pub sqlite: SqliteSection,
    pub retry: RetryConfig,
    pub logging: LoggingSection,
}

/// One config file; absent sections leave earlier layers untouched
#[derive(Debug, Clone, Default, Deserialize)]
struct ConfigLayer {
    store: Option<StoreSection>,
    sqlite: Option<SqliteSection>,
    retry: Option<RetryConfig>,
    logging: Option<LoggingSection>,
}

impl StoreConfig {
    /// Parse a single TOML document on top of the defaults
    pub fn from_toml(content: &str) -> Result<Self> {
        let mut config = Self::default();
        config.merge(parse_layer(content)?);
        config.resolve_env_vars();
        Ok(config)
    }

    fn merge(&mut self, layer: ConfigLayer) {
        if let Some(store) = layer.store {
            self.store = store;
        }
        if let Some(sqlite) = layer.sqlite {
            self.sqlite = sqlite;
        }
        if let Some(retry) = layer.retry {
            self.retry = retry;
        }
        if let Some(logging) = layer.logging {
            self.logging = logging;
        }
    }

    /// Resolve environment variables in configuration values
    ///
    /// Supports ${VAR_NAME} syntax; unset variables are left as written.
    pub fn resolve_env_vars(&mut self) {
        self.sqlite.url = expand_env_var(&self.sqlite.url);
    }

    /// Apply command-line overrides
    pub fn with_overrides(mut self, backend: Option<BackendKind>, url: Option<String>) -> Self {
        if let Some(backend) = backend {
            self.store.backend = backend;
        }
        if let Some(url) = url {
            self.sqlite.url = expand_env_var(&url);
        }
        self
    }

    /// Pool tuning for the connection manager
    pub fn pool_settings(&self) -> PoolSettings {
        PoolSettings {
            max_connections: self.sqlite.max_connections,
            acquire_timeout_ms: self.sqlite.acquire_timeout_secs.saturating_mul(1_000),
            busy_timeout_ms: self.sqlite.busy_timeout_secs.saturating_mul(1_000),
            create_if_missing: self.sqlite.create_if_missing,
            ..PoolSettings::default()
        }
    }
}

fn expand_env_var(value: &str) -> String {
    if value.starts_with("${") && value.ends_with('}') {
        let var_name = &value[2..value.len() - 1];
        std::env::var(var_name).unwrap_or_else(|_| value.to_string())
    } else {
        value.to_string()
    }
}

fn parse_layer(content: &str) -> Result<ConfigLayer> {
    toml::from_str(content).map_err(|e| CheckpointError::Config(format!("Failed to parse config: {}", e)))
}

/// Configuration loader that walks the user, project and explicit layers
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    user_config_path: Option<PathBuf>,
    project_config_path: PathBuf,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Loader for the standard locations
    pub fn new() -> Self {
        Self {
            user_config_path: dirs::home_dir().map(|home| home.join(CONFIG_DIR).join(CONFIG_FILE)),
            project_config_path: PathBuf::from(CONFIG_DIR).join(CONFIG_FILE),
        }
    }

    /// Loader with explicit user and project locations
    pub fn with_paths(user_config_path: Option<PathBuf>, project_config_path: PathBuf) -> Self {
        Self {
            user_config_path,
            project_config_path,
        }
    }

    pub fn user_config_path(&self) -> Option<&Path> {
        self.user_config_path.as_deref()
    }

    pub fn project_config_path(&self) -> &Path {
        &self.project_config_path
    }

    /// Load configuration, with `explicit` applied last
    ///
    /// Missing user and project files are skipped; a missing explicit file is an error.
    pub async fn load(&self, explicit: Option<&Path>) -> Result<StoreConfig> {
        let mut config = StoreConfig::default();

        if let Some(user_path) = &self.user_config_path {
            self.apply_optional(&mut config, user_path).await?;
        }
        self.apply_optional(&mut config, &self.project_config_path).await?;

        if let Some(path) = explicit {
            config.merge(read_layer(path).await?);
            debug!(path = %path.display(), "Loaded explicit config");
        }

        config.resolve_env_vars();
        info!(backend = ?config.store.backend, "Configuration loaded");
        Ok(config)
    }

    async fn apply_optional(&self, config: &mut StoreConfig, path: &Path) -> Result<()> {
        if !path.exists() {
            debug!(path = %path.display(), "Config file not found, skipping");
            return Ok(());
        }
        config.merge(read_layer(path).await?);
        debug!(path = %path.display(), "Loaded config layer");
        Ok(())
    }
}

async fn read_layer(path: &Path) -> Result<ConfigLayer> {
    let content = fs::read_to_string(path).await.map_err(|e| {
        CheckpointError::Config(format!("Failed to read config {}: {}", path.display(), e))
    })?;
    parse_layer(&content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = StoreConfig::default();
        assert_eq!(config.store.backend, BackendKind::Sqlite);
        assert_eq!(config.sqlite.url, "sqlite:thread-store.db");
        assert_eq!(config.sqlite.max_connections, 5);
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_partial_sections_fill_defaults() {
        let config = StoreConfig::from_toml(
            r#"
            [store]
            backend = "sqlite"

            [retry]
            max_retries = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.store.backend, BackendKind::Sqlite);
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.retry.initial_delay_ms, 100);
        assert_eq!(config.sqlite, SqliteSection::default());
    }

    #[test]
    fn test_unknown_backend_is_config_error() {
        let err = StoreConfig::from_toml("[store]\nbackend = \"mongo\"\n").unwrap_err();
        assert!(matches!(err, CheckpointError::Config(_)));

        let err = "mongo".parse::<BackendKind>().unwrap_err();
        assert!(matches!(err, CheckpointError::Config(_)));
    }

    #[test]
    fn test_env_var_expansion() {
        std::env::set_var("THREAD_STORE_CONFIG_TEST_URL", "sqlite:/tmp/from-env.db");
        let config = StoreConfig::from_toml("[sqlite]\nurl = \"${THREAD_STORE_CONFIG_TEST_URL}\"\n").unwrap();
        assert_eq!(config.sqlite.url, "sqlite:/tmp/from-env.db");

        let config = StoreConfig::from_toml("[sqlite]\nurl = \"${THREAD_STORE_CONFIG_UNSET_VAR}\"\n").unwrap();
        assert_eq!(config.sqlite.url, "${THREAD_STORE_CONFIG_UNSET_VAR}");
    }

    #[test]
    fn test_pool_settings() {
        let mut config = StoreConfig::default();
        config.sqlite.max_connections = 2;
        config.sqlite.acquire_timeout_secs = 3;

        let settings = config.pool_settings();
        assert_eq!(settings.max_connections, 2);
        assert_eq!(settings.acquire_timeout_ms, 3_000);
        assert_eq!(settings.busy_timeout_ms, 5_000);
    }

    #[test]
    fn test_overrides() {
        let config = StoreConfig::default().with_overrides(Some(BackendKind::Sqlite), Some("sqlite:x.db".to_string()));
        assert_eq!(config.store.backend, BackendKind::Sqlite);
        assert_eq!(config.sqlite.url, "sqlite:x.db");
    }

    #[tokio::test]
    async fn test_layers_replace_whole_sections() {
        let temp_dir = TempDir::new().unwrap();
        let user = temp_dir.path().join("user.toml");
        let project = temp_dir.path().join("project.toml");
        std::fs::write(
            &user,
            "[sqlite]\nurl = \"sqlite:user.db\"\nmax_connections = 9\n\n[logging]\nlevel = \"debug\"\n",
        )
        .unwrap();
        std::fs::write(&project, "[sqlite]\nurl = \"sqlite:project.db\"\n").unwrap();

        let config = ConfigLoader::with_paths(Some(user), project).load(None).await.unwrap();

        assert_eq!(config.sqlite.url, "sqlite:project.db");
        assert_eq!(config.sqlite.max_connections, 5);
        assert_eq!(config.logging.level, "debug");
    }

    #[tokio::test]
    async fn test_explicit_file_applies_last() {
        let temp_dir = TempDir::new().unwrap();
        let project = temp_dir.path().join("project.toml");
        let explicit = temp_dir.path().join("explicit.toml");
        std::fs::write(&project, "[store]\nbackend = \"sqlite\"\n").unwrap();
        std::fs::write(&explicit, "[store]\nbackend = \"memory\"\n").unwrap();

        let loader = ConfigLoader::with_paths(None, project);
        let config = loader.load(Some(&explicit)).await.unwrap();
        assert_eq!(config.store.backend, BackendKind::Memory);

        let missing = temp_dir.path().join("missing.toml");
        let err = loader.load(Some(&missing)).await.unwrap_err();
        assert!(matches!(err, CheckpointError::Config(_)));
    }

    #[tokio::test]
    async fn test_missing_layers_are_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let loader = ConfigLoader::with_paths(
            Some(temp_dir.path().join("nope.toml")),
            temp_dir.path().join("also-nope.toml"),
        );
        assert_eq!(loader.load(None).await.unwrap(), StoreConfig::default());
    }

    #[tokio::test]
    async fn test_malformed_layer_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let project = temp_dir.path().join("project.toml");
        std::fs::write(&project, "[sqlite\nurl = ").unwrap();

        let err = ConfigLoader::with_paths(None, project).load(None).await.unwrap_err();
        assert!(matches!(err, CheckpointError::Config(_)));
    }
}

//! Mapping from sqlx errors to the store taxonomy
//!
//! Transient conditions (I/O, pool exhaustion, locked or unopenable database files)
//! become [`CheckpointError::BackendUnavailable`] so the retry layer can act on them.

use sqlx::migrate::MigrateError;
use thread_checkpoint::CheckpointError;

/// SQLite primary result codes that indicate a temporarily unusable database.
const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;
const SQLITE_CANTOPEN: i32 = 14;

/// Convert a sqlx error into a [`CheckpointError`]
pub fn map_sqlx_error(err: sqlx::Error) -> CheckpointError {
    match err {
        sqlx::Error::Io(err) => CheckpointError::BackendUnavailable(format!("IO error: {}", err)),
        sqlx::Error::Tls(err) => CheckpointError::BackendUnavailable(format!("TLS error: {}", err)),
        sqlx::Error::PoolTimedOut => {
            CheckpointError::BackendUnavailable("Connection pool timed out".to_string())
        }
        sqlx::Error::PoolClosed => {
            CheckpointError::BackendUnavailable("Connection pool is closed".to_string())
        }
        sqlx::Error::Configuration(msg) => CheckpointError::Config(msg.to_string()),
        sqlx::Error::Database(db) if is_transient_code(db.code().as_deref()) => {
            CheckpointError::BackendUnavailable(db.message().to_string())
        }
        sqlx::Error::ColumnDecode { index, source } => {
            CheckpointError::Storage(format!("Error decoding column {}: {}", index, source))
        }
        sqlx::Error::Migrate(err) => map_migrate_error(*err),
        err => CheckpointError::Storage(err.to_string()),
    }
}

/// Convert a migration failure into a [`CheckpointError`]
pub fn map_migrate_error(err: MigrateError) -> CheckpointError {
    match err {
        MigrateError::Execute(inner) => map_sqlx_error(inner),
        other => CheckpointError::Storage(format!("Migration failed: {}", other)),
    }
}

// Extended result codes carry the primary code in the low byte.
fn is_transient_code(code: Option<&str>) -> bool {
    code.and_then(|c| c.parse::<i32>().ok())
        .map(|c| matches!(c & 0xff, SQLITE_BUSY | SQLITE_LOCKED | SQLITE_CANTOPEN))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_errors_are_retryable() {
        assert!(map_sqlx_error(sqlx::Error::PoolTimedOut).is_retryable());
        assert!(map_sqlx_error(sqlx::Error::PoolClosed).is_retryable());
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        assert!(map_sqlx_error(sqlx::Error::Io(io)).is_retryable());
    }

    #[test]
    fn test_configuration_error() {
        let err = map_sqlx_error(sqlx::Error::Configuration("bad url".into()));
        assert!(matches!(err, CheckpointError::Config(ref m) if m == "bad url"));
    }

    #[test]
    fn test_row_not_found_is_storage() {
        let err = map_sqlx_error(sqlx::Error::RowNotFound);
        assert!(matches!(err, CheckpointError::Storage(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_transient_codes() {
        assert!(is_transient_code(Some("5")));
        assert!(is_transient_code(Some("517"))); // SQLITE_BUSY_SNAPSHOT
        assert!(is_transient_code(Some("14")));
        assert!(!is_transient_code(Some("19"))); // SQLITE_CONSTRAINT
        assert!(!is_transient_code(Some("2067"))); // SQLITE_CONSTRAINT_UNIQUE
        assert!(!is_transient_code(None));
    }
}

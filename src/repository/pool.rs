//! SQLite connection handling and the repository error type.

use std::path::{Path, PathBuf};

use diesel::sqlite::SqliteConnection;
use diesel_async::sync_connection_wrapper::SyncConnectionWrapper;
use diesel_async::AsyncConnection;

/// Async SQLite connection; the wrapper runs the blocking sqlite calls on
/// the runtime's blocking pool.
pub type AsyncSqliteConnection = SyncConnectionWrapper<SqliteConnection>;

/// Errors surfaced by the repository layer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to open database {path}: {source}")]
    Connect {
        path: String,
        source: diesel::ConnectionError,
    },
    #[error(transparent)]
    Query(#[from] diesel::result::Error),
}

/// Connection factory for the local database. A fresh connection is
/// established per operation, which keeps the pool trivially Clone and is
/// cheap enough for a file-backed database.
#[derive(Clone)]
pub struct AsyncSqlitePool {
    db_path: PathBuf,
}

impl AsyncSqlitePool {
    /// Accepts a bare filesystem path or a `sqlite:` URL.
    pub fn new(database_url: &str) -> Self {
        let path = database_url.strip_prefix("sqlite:").unwrap_or(database_url);
        Self {
            db_path: PathBuf::from(path),
        }
    }

    pub fn from_path(db_path: &Path) -> Self {
        Self {
            db_path: db_path.to_path_buf(),
        }
    }

    /// Open a new connection, tagging failures with the database path.
    pub async fn get(&self) -> Result<AsyncSqliteConnection, StoreError> {
        let path = self.db_path.display().to_string();
        AsyncSqliteConnection::establish(&path)
            .await
            .map_err(|source| StoreError::Connect { path, source })
    }

    pub fn database_path(&self) -> &Path {
        &self.db_path
    }
}

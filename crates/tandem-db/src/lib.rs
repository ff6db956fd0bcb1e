pub mod log;
pub mod migrations;
pub mod models;
pub mod queries;

use std::os::raw::c_int;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rusqlite::{Connection, ErrorCode, OpenFlags};
use thiserror::Error;
use tracing::info;

use tandem_types::error::ChatError;

const READER_POOL_SIZE: usize = 4;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Busy, locked or I/O failure. Retrying later may succeed.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("connection lock poisoned: {0}")]
    Poisoned(String),

    /// A foreign key pointed at a row that does not exist.
    #[error("referenced row does not exist: {0}")]
    MissingReference(String),

    #[error("blocking task failed: {0}")]
    Join(String),

    #[error(transparent)]
    Sqlite(rusqlite::Error),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        match e.sqlite_error_code() {
            Some(
                ErrorCode::DatabaseBusy
                | ErrorCode::DatabaseLocked
                | ErrorCode::SystemIoFailure
                | ErrorCode::CannotOpen,
            ) => Self::Unavailable(e.to_string()),
            _ => Self::Sqlite(e),
        }
    }
}

impl From<StoreError> for ChatError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Unavailable(_) | StoreError::Poisoned(_) => {
                ChatError::StoreUnavailable(e.to_string())
            }
            StoreError::Join(_) => ChatError::Internal(e.to_string()),
            StoreError::MissingReference(what) => ChatError::NotFound(what),
            StoreError::Sqlite(e) => ChatError::Internal(e.to_string()),
        }
    }
}

pub(crate) fn violates(e: &rusqlite::Error, extended_code: c_int) -> bool {
    e.sqlite_error()
        .is_some_and(|f| f.extended_code == extended_code)
}

#[derive(Debug, Clone, Copy)]
pub struct StoreConfig {
    /// How long a statement waits on a locked database before failing as
    /// `Unavailable`. This is the only timeout the stores apply.
    pub busy_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            busy_timeout: Duration::from_secs(5),
        }
    }
}

/// One writer plus a small round-robin pool of read-only connections.
struct ConnectionPool {
    writer: Mutex<Connection>,
    readers: Vec<Mutex<Connection>>,
    reader_idx: AtomicUsize,
}

impl ConnectionPool {
    fn open(
        path: &Path,
        config: StoreConfig,
        migrate: fn(&Connection) -> Result<(), StoreError>,
    ) -> Result<Self, StoreError> {
        let writer = Connection::open(path)?;
        writer.pragma_update(None, "journal_mode", "WAL")?;
        writer.pragma_update(None, "foreign_keys", "ON")?;
        writer.busy_timeout(config.busy_timeout)?;

        migrate(&writer)?;

        let mut readers = Vec::with_capacity(READER_POOL_SIZE);
        for _ in 0..READER_POOL_SIZE {
            let conn = Connection::open_with_flags(
                path,
                OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?;
            conn.busy_timeout(config.busy_timeout)?;
            readers.push(Mutex::new(conn));
        }

        Ok(Self {
            writer: Mutex::new(writer),
            readers,
            reader_idx: AtomicUsize::new(0),
        })
    }

    fn with_conn<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError>,
    {
        let idx = self.reader_idx.fetch_add(1, Ordering::Relaxed) % self.readers.len();
        let conn = self.readers[idx]
            .lock()
            .map_err(|e| StoreError::Poisoned(e.to_string()))?;
        f(&conn)
    }

    fn with_conn_mut<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError>,
    {
        let conn = self
            .writer
            .lock()
            .map_err(|e| StoreError::Poisoned(e.to_string()))?;
        f(&conn)
    }
}

/// Relational store: identities and the conversation directory.
pub struct Database {
    pool: ConnectionPool,
}

impl Database {
    pub fn open(path: &Path, config: StoreConfig) -> Result<Self, StoreError> {
        let pool = ConnectionPool::open(path, config, migrations::relational)?;
        info!(
            "Relational store opened at {} (1 writer + {} readers)",
            path.display(),
            READER_POOL_SIZE
        );
        Ok(Self { pool })
    }

    pub(crate) fn with_conn<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError>,
    {
        self.pool.with_conn(f)
    }

    pub(crate) fn with_conn_mut<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError>,
    {
        self.pool.with_conn_mut(f)
    }
}

/// Realtime log store: per-conversation message log and unread counters.
/// Lives in its own database file; nothing spans both stores transactionally.
pub struct LogStore {
    pool: ConnectionPool,
}

impl LogStore {
    pub fn open(path: &Path, config: StoreConfig) -> Result<Self, StoreError> {
        let pool = ConnectionPool::open(path, config, migrations::log)?;
        info!(
            "Log store opened at {} (1 writer + {} readers)",
            path.display(),
            READER_POOL_SIZE
        );
        Ok(Self { pool })
    }

    pub(crate) fn with_conn<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError>,
    {
        self.pool.with_conn(f)
    }

    pub(crate) fn with_conn_mut<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError>,
    {
        self.pool.with_conn_mut(f)
    }
}

/// Run a synchronous store call on the blocking pool so SQLite latency never
/// stalls the async executor.
pub async fn blocking<S, F, T>(store: &Arc<S>, f: F) -> Result<T, StoreError>
where
    S: Send + Sync + 'static,
    F: FnOnce(&S) -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    let store = store.clone();
    tokio::task::spawn_blocking(move || f(&store))
        .await
        .map_err(|e| StoreError::Join(e.to_string()))?
}


#[cfg(test)]
pub(crate) mod test_support {
    use std::path::PathBuf;

    pub fn temp_path(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("tandem_{}_{}.db", tag, uuid::Uuid::new_v4()))
    }
}

use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use tracing::{info, warn};

use shopguard_core::{CounterStore, CounterTxn, RateLimitCounter, StorageError, StoreResult};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS rate_limit_counters (
        id           TEXT PRIMARY KEY,
        count        INTEGER NOT NULL CHECK (count >= 1),
        last_request INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_rate_limit_last_request
        ON rate_limit_counters(last_request);";

/// Default time a writer waits for the database lock.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

enum Backing {
    /// One connection per unit of work; SQLite serializes writers.
    File(PathBuf),
    /// Memory databases are per-connection, so the single one is shared.
    Memory(Mutex<Connection>),
}

/// SQLite-backed counter table.
///
/// File databases run in WAL mode and may be shared by any number of
/// processes. Every transaction starts with `BEGIN IMMEDIATE`, which takes the
/// write lock up front so two attempts on the same key cannot interleave.
pub struct SqliteCounterStore {
    backing: Backing,
    busy_timeout: Duration,
}

impl SqliteCounterStore {
    /// Open or create the store at the given path.
    pub fn open(path: impl AsRef<Path>, busy_timeout: Duration) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open(&path).map_err(backend)?;
        conn.busy_timeout(busy_timeout).map_err(backend)?;
        let journal_mode: String = conn
            .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
            .map_err(|e| classify(e, busy_timeout))?;
        conn.execute_batch(SCHEMA)
            .map_err(|e| classify(e, busy_timeout))?;
        info!(path = %path.display(), journal_mode = %journal_mode, "Counter store opened");
        Ok(Self {
            backing: Backing::File(path),
            busy_timeout,
        })
    }

    /// Create an in-memory store (for testing).
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory().map_err(backend)?;
        conn.execute_batch(SCHEMA).map_err(backend)?;
        Ok(Self {
            backing: Backing::Memory(Mutex::new(conn)),
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        match &self.backing {
            Backing::File(path) => Some(path),
            Backing::Memory(_) => None,
        }
    }

    fn connect(&self) -> StoreResult<Conn<'_>> {
        match &self.backing {
            Backing::File(path) => {
                let conn = Connection::open(path).map_err(backend)?;
                conn.busy_timeout(self.busy_timeout).map_err(backend)?;
                Ok(Conn::Owned(conn))
            }
            Backing::Memory(conn) => conn
                .lock()
                .map(Conn::Shared)
                .map_err(|_| StorageError::Backend("in-memory connection poisoned".into())),
        }
    }
}

impl CounterStore for SqliteCounterStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn begin(&self) -> StoreResult<Box<dyn CounterTxn + '_>> {
        let conn = self.connect()?;
        conn.execute_batch("BEGIN IMMEDIATE")
            .map_err(|e| classify(e, self.busy_timeout))?;
        Ok(Box::new(SqliteTxn {
            conn,
            open: true,
            busy_timeout: self.busy_timeout,
        }))
    }

    fn delete_older_than(&self, threshold_ms: i64) -> StoreResult<usize> {
        let conn = self.connect()?;
        conn.execute(
            "DELETE FROM rate_limit_counters WHERE last_request < ?1",
            params![threshold_ms],
        )
        .map_err(|e| classify(e, self.busy_timeout))
    }

    fn count(&self) -> StoreResult<usize> {
        let conn = self.connect()?;
        let n: i64 = conn
            .query_row("SELECT COUNT(*) FROM rate_limit_counters", [], |row| row.get(0))
            .map_err(|e| classify(e, self.busy_timeout))?;
        Ok(n.max(0) as usize)
    }
}

enum Conn<'a> {
    Owned(Connection),
    Shared(MutexGuard<'a, Connection>),
}

impl Deref for Conn<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        match self {
            Conn::Owned(conn) => conn,
            Conn::Shared(guard) => &**guard,
        }
    }
}

/// An open `BEGIN IMMEDIATE` transaction. Rolls back on drop unless committed.
struct SqliteTxn<'a> {
    conn: Conn<'a>,
    open: bool,
    busy_timeout: Duration,
}

impl CounterTxn for SqliteTxn<'_> {
    fn get(&mut self, id: &str) -> StoreResult<Option<RateLimitCounter>> {
        self.conn
            .query_row(
                "SELECT id, count, last_request FROM rate_limit_counters WHERE id = ?1",
                params![id],
                |row| {
                    Ok(RateLimitCounter {
                        id: row.get(0)?,
                        count: row.get(1)?,
                        last_request: row.get(2)?,
                    })
                },
            )
            .optional()
            .map_err(|e| classify(e, self.busy_timeout))
    }

    fn put(&mut self, counter: &RateLimitCounter) -> StoreResult<()> {
        self.conn
            .execute(
                "INSERT INTO rate_limit_counters (id, count, last_request)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(id) DO UPDATE SET
                     count = excluded.count,
                     last_request = excluded.last_request",
                params![counter.id, counter.count, counter.last_request],
            )
            .map_err(|e| classify(e, self.busy_timeout))?;
        Ok(())
    }

    fn commit(mut self: Box<Self>) -> StoreResult<()> {
        self.conn
            .execute_batch("COMMIT")
            .map_err(|e| classify(e, self.busy_timeout))?;
        self.open = false;
        Ok(())
    }
}

impl Drop for SqliteTxn<'_> {
    fn drop(&mut self) {
        if self.open {
            if let Err(e) = self.conn.execute_batch("ROLLBACK") {
                warn!(error = %e, "Counter transaction rollback failed");
            }
        }
    }
}

fn backend(e: rusqlite::Error) -> StorageError {
    StorageError::Backend(e.to_string())
}

/// Lock waits that ran out of `busy_timeout` surface as timeouts.
fn classify(e: rusqlite::Error, busy_timeout: Duration) -> StorageError {
    match e.sqlite_error_code() {
        Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked) => {
            StorageError::Timeout(busy_timeout)
        }
        _ => backend(e),
    }
}

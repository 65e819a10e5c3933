pub mod limiter;
pub mod sqlite_store;
pub mod sweeper;

pub use limiter::{RateLimiter, DEFAULT_CALL_TIMEOUT};
pub use sqlite_store::SqliteCounterStore;
pub use sweeper::RetentionSweeper;

#[cfg(test)]
pub(crate) mod test_support {
    use std::path::PathBuf;

    /// A unique SQLite file path under the system temp dir.
    pub fn temp_db_path(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("shopguard-{tag}-{}.db", uuid::Uuid::new_v4()))
    }

    /// Remove a test database and its WAL side files.
    pub fn remove_db(path: &std::path::Path) {
        for suffix in ["", "-wal", "-shm"] {
            let mut p = path.as_os_str().to_owned();
            p.push(suffix);
            let _ = std::fs::remove_file(PathBuf::from(p));
        }
    }
}

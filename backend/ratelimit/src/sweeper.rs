//! Retention sweeper: garbage-collects counters nobody has touched lately.
//!
//! Every counter whose window started before `now - retention` is deleted,
//! whatever its window length. A later attempt on the same key simply opens a
//! new window. Scheduling is up to the caller; each call is one pass.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use shopguard_core::{Clock, CounterStore, StorageError, SystemClock, ThrottleError};

#[derive(Clone)]
pub struct RetentionSweeper {
    store: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
}

impl RetentionSweeper {
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Run one pass on a blocking worker. Returns the number of counters removed.
    pub async fn sweep(&self, retention: Duration) -> Result<usize, ThrottleError> {
        let sweeper = self.clone();
        tokio::task::spawn_blocking(move || sweeper.sweep_blocking(retention))
            .await
            .map_err(|e| ThrottleError::from(StorageError::Interrupted(e.to_string())))?
    }

    pub fn sweep_blocking(&self, retention: Duration) -> Result<usize, ThrottleError> {
        let retention_ms = i64::try_from(retention.as_millis()).unwrap_or(i64::MAX);
        let threshold = self.clock.now_ms().saturating_sub(retention_ms);

        match self.store.delete_older_than(threshold) {
            Ok(n) => {
                if n > 0 {
                    info!(deleted = n, threshold, "[Sweeper] Removed stale rate limit counters");
                } else {
                    debug!(threshold, "[Sweeper] No stale rate limit counters");
                }
                Ok(n)
            }
            Err(e) => {
                warn!(store = self.store.name(), error = %e, "[Sweeper] Sweep failed; stale counters kept");
                Err(e.into())
            }
        }
    }
}

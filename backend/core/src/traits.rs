use crate::counter::RateLimitCounter;
use crate::error::StoreResult;

/// A scoped read-modify-write unit against the counter table.
///
/// Implementations hold the store's write lock from creation until commit or
/// drop. Dropping without calling [`CounterTxn::commit`] rolls back.
pub trait CounterTxn {
    /// Read the counter stored under `id`.
    fn get(&mut self, id: &str) -> StoreResult<Option<RateLimitCounter>>;

    /// Insert or overwrite the counter keyed by `counter.id`.
    fn put(&mut self, counter: &RateLimitCounter) -> StoreResult<()>;

    fn commit(self: Box<Self>) -> StoreResult<()>;
}

/// Persistent storage for rate-limit counters.
///
/// Calls block; async callers run them on a blocking worker.
pub trait CounterStore: Send + Sync {
    /// Backend name for logs (e.g., "sqlite").
    fn name(&self) -> &str;

    /// Open a transaction that serializes against every other writer.
    fn begin(&self) -> StoreResult<Box<dyn CounterTxn + '_>>;

    /// Delete every counter with `last_request < threshold_ms`.
    /// Returns the number of rows removed.
    fn delete_older_than(&self, threshold_ms: i64) -> StoreResult<usize>;

    /// Number of stored counters.
    fn count(&self) -> StoreResult<usize>;
}

//! Fixed-window rate limiter over a persistent counter store.
//!
//! Each check is one store transaction: read the counter, evaluate the
//! attempt, write back on admission. All coordination between concurrent
//! callers happens in the store; the limiter keeps no shared mutable state.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, warn};

use shopguard_core::{
    counter_key, evaluate, Clock, CounterStore, Decision, RateLimitPolicy, StorageError,
    SystemClock, ThrottleError,
};
use shopguard_logging::mask_identity;

/// Upper bound on one async check, including time queued for a blocking worker.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
    call_timeout: Duration,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    /// Decide one attempt by `identity` at `policy.action_key` and record it
    /// if admitted.
    ///
    /// The transaction runs on a blocking worker. Dropping the returned future
    /// does not cancel it; it still commits or rolls back on its own. Past
    /// `call_timeout` the caller gets [`StorageError::Timeout`].
    pub async fn check_and_record(
        &self,
        identity: &str,
        policy: &RateLimitPolicy,
    ) -> Result<Decision, ThrottleError> {
        validate(identity, policy)?;

        let store = Arc::clone(&self.store);
        let clock = Arc::clone(&self.clock);
        let identity = identity.to_string();
        let policy = policy.clone();
        let task = tokio::task::spawn_blocking(move || {
            record_attempt(store.as_ref(), clock.as_ref(), &identity, &policy)
        });

        let joined = match tokio::time::timeout(self.call_timeout, task).await {
            Ok(joined) => joined,
            Err(_) => {
                error!(timeout = ?self.call_timeout, "Rate limit check timed out");
                return Err(StorageError::Timeout(self.call_timeout).into());
            }
        };
        joined.map_err(|e| {
            error!(error = %e, "Rate limit worker failed");
            ThrottleError::from(StorageError::Interrupted(e.to_string()))
        })?
    }

    /// Same as [`RateLimiter::check_and_record`] on the calling thread.
    pub fn check_and_record_blocking(
        &self,
        identity: &str,
        policy: &RateLimitPolicy,
    ) -> Result<Decision, ThrottleError> {
        validate(identity, policy)?;
        record_attempt(self.store.as_ref(), self.clock.as_ref(), identity, policy)
    }
}

fn validate(identity: &str, policy: &RateLimitPolicy) -> Result<(), ThrottleError> {
    if identity.trim().is_empty() {
        return Err(ThrottleError::InvalidPolicy("identity cannot be empty".into()));
    }
    policy.validate()
}

fn record_attempt(
    store: &dyn CounterStore,
    clock: &dyn Clock,
    identity: &str,
    policy: &RateLimitPolicy,
) -> Result<Decision, ThrottleError> {
    let key = counter_key(identity, &policy.action_key);

    let result = (|| {
        let mut txn = store.begin()?;
        // read after the write lock is held so timestamps follow commit order
        let now = clock.now_ms();
        let existing = txn.get(&key)?;
        let evaluation = evaluate(&key, existing.as_ref(), policy, now);
        if let Some(counter) = &evaluation.write {
            txn.put(counter)?;
            txn.commit()?;
        }
        Ok::<_, StorageError>(evaluation)
    })();

    let evaluation = result.map_err(|e| {
        error!(
            store = store.name(),
            action = %policy.action_key,
            identity = %mask_identity(identity),
            error = %e,
            "Rate limit check failed"
        );
        ThrottleError::Storage(e)
    })?;

    match evaluation.decision {
        Decision::Allowed { remaining } => debug!(
            action = %policy.action_key,
            identity = %mask_identity(identity),
            transition = evaluation.transition.as_str(),
            remaining,
            "Rate limit OK"
        ),
        Decision::Denied { retry_after_secs } => warn!(
            action = %policy.action_key,
            identity = %mask_identity(identity),
            retry_after_secs,
            "Rate limit exceeded"
        ),
    }
    Ok(evaluation.decision)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite_store::{SqliteCounterStore, DEFAULT_BUSY_TIMEOUT};
    use crate::test_support::{remove_db, temp_db_path};
    use shopguard_core::{CounterTxn, ManualClock, StoreResult};

    const T0: i64 = 1_700_000_000_000;
    const IP: &str = "203.0.113.7";

    fn sign_in() -> RateLimitPolicy {
        RateLimitPolicy::new("sign-in/email", 300, 5)
    }

    fn limiter_at(start: i64) -> (RateLimiter, Arc<ManualClock>, Arc<SqliteCounterStore>) {
        let store = Arc::new(SqliteCounterStore::in_memory().unwrap());
        let clock = Arc::new(ManualClock::new(start));
        let limiter = RateLimiter::new(store.clone()).with_clock(clock.clone());
        (limiter, clock, store)
    }

    #[tokio::test]
    async fn sign_in_scenario() {
        let (limiter, clock, _store) = limiter_at(T0);
        let policy = sign_in();

        for expected in [4, 3, 2, 1, 0] {
            let decision = limiter.check_and_record(IP, &policy).await.unwrap();
            assert_eq!(decision, Decision::Allowed { remaining: expected });
            clock.advance_ms(100);
        }

        clock.set(T0 + 1_000);
        let denied = limiter.check_and_record(IP, &policy).await.unwrap();
        assert_eq!(denied, Decision::Denied { retry_after_secs: 299 });
        assert_eq!(denied.wait_message().unwrap(), "try again in 5 minutes");

        clock.set(T0 + 301_000);
        let allowed = limiter.check_and_record(IP, &policy).await.unwrap();
        assert_eq!(allowed, Decision::Allowed { remaining: 4 });
    }

    #[tokio::test]
    async fn waiting_retry_after_is_enough() {
        let (limiter, clock, _store) = limiter_at(T0);
        let policy = RateLimitPolicy::new("password-reset/request", 3600, 3);
        for _ in 0..3 {
            assert!(limiter.check_and_record(IP, &policy).await.unwrap().is_allowed());
        }
        clock.advance_ms(42_250);
        let retry = limiter
            .check_and_record(IP, &policy)
            .await
            .unwrap()
            .retry_after_secs()
            .unwrap();
        assert!(retry > 0);

        clock.advance_secs(retry as i64);
        assert!(limiter.check_and_record(IP, &policy).await.unwrap().is_allowed());
    }

    #[test]
    fn never_more_than_max_per_window() {
        let (limiter, clock, _store) = limiter_at(T0);
        let policy = RateLimitPolicy::new("wishlist/share", 60, 4);
        let mut allowed = 0;
        // 40 attempts spread across one 60s window
        for _ in 0..40 {
            if limiter.check_and_record_blocking(IP, &policy).unwrap().is_allowed() {
                allowed += 1;
            }
            clock.advance_ms(1_500);
        }
        assert_eq!(allowed, 4);
    }

    #[test]
    fn denial_does_not_touch_the_counter() {
        let (limiter, clock, store) = limiter_at(T0);
        let policy = RateLimitPolicy::new("admin/address-key", 900, 1);
        limiter.check_and_record_blocking(IP, &policy).unwrap();
        clock.advance_secs(10);
        assert!(!limiter.check_and_record_blocking(IP, &policy).unwrap().is_allowed());

        let mut txn = store.begin().unwrap();
        let stored = txn.get(&counter_key(IP, "admin/address-key")).unwrap().unwrap();
        assert_eq!(stored.count, 1);
        assert_eq!(stored.last_request, T0);
    }

    #[test]
    fn boundary_attempt_stays_in_old_window() {
        let (limiter, clock, _store) = limiter_at(T0);
        let policy = RateLimitPolicy::new("sign-in/email", 300, 1);
        limiter.check_and_record_blocking(IP, &policy).unwrap();

        clock.set(T0 + 300_000);
        assert_eq!(
            limiter.check_and_record_blocking(IP, &policy).unwrap(),
            Decision::Denied { retry_after_secs: 1 }
        );

        clock.set(T0 + 300_001);
        assert_eq!(
            limiter.check_and_record_blocking(IP, &policy).unwrap(),
            Decision::Allowed { remaining: 0 }
        );
    }

    #[test]
    fn identities_and_actions_are_isolated() {
        let (limiter, _clock, store) = limiter_at(T0);
        let once = |action: &str| RateLimitPolicy::new(action, 60, 1);
        assert!(limiter.check_and_record_blocking(IP, &once("sign-in/email")).unwrap().is_allowed());
        assert!(limiter.check_and_record_blocking(IP, &once("sign-up/email")).unwrap().is_allowed());
        assert!(limiter
            .check_and_record_blocking("198.51.100.2", &once("sign-in/email"))
            .unwrap()
            .is_allowed());
        assert_eq!(store.count().unwrap(), 3);
    }

    #[tokio::test]
    async fn invalid_input_is_rejected_before_the_store() {
        let (limiter, _clock, store) = limiter_at(T0);
        let err = limiter.check_and_record("", &sign_in()).await.unwrap_err();
        assert!(matches!(err, ThrottleError::InvalidPolicy(_)));
        let err = limiter
            .check_and_record(IP, &RateLimitPolicy::new("sign-in/email", 300, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, ThrottleError::InvalidPolicy(_)));
        assert_eq!(store.count().unwrap(), 0);
    }

    struct BrokenStore;

    impl CounterStore for BrokenStore {
        fn name(&self) -> &str {
            "broken"
        }
        fn begin(&self) -> StoreResult<Box<dyn CounterTxn + '_>> {
            Err(StorageError::Backend("unable to open database file".into()))
        }
        fn delete_older_than(&self, _threshold_ms: i64) -> StoreResult<usize> {
            Err(StorageError::Backend("unable to open database file".into()))
        }
        fn count(&self) -> StoreResult<usize> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn storage_failure_is_never_allowed() {
        let limiter = RateLimiter::new(Arc::new(BrokenStore));
        let err = limiter.check_and_record(IP, &sign_in()).await.unwrap_err();
        assert!(err.is_storage());
    }

    struct StalledStore;

    impl CounterStore for StalledStore {
        fn name(&self) -> &str {
            "stalled"
        }
        fn begin(&self) -> StoreResult<Box<dyn CounterTxn + '_>> {
            std::thread::sleep(Duration::from_millis(300));
            Err(StorageError::Backend("gave up".into()))
        }
        fn delete_older_than(&self, _threshold_ms: i64) -> StoreResult<usize> {
            Ok(0)
        }
        fn count(&self) -> StoreResult<usize> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn slow_store_hits_call_timeout() {
        let limiter = RateLimiter::new(Arc::new(StalledStore))
            .with_call_timeout(Duration::from_millis(20));
        let err = limiter.check_and_record(IP, &sign_in()).await.unwrap_err();
        assert!(matches!(
            err,
            ThrottleError::Storage(StorageError::Timeout(t)) if t == Duration::from_millis(20)
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_attempts_admit_exactly_max() {
        let path = temp_db_path("concurrent");
        let policy = RateLimitPolicy::new("sign-in/email", 300, 5);
        let attempts = 24;

        let mut handles = Vec::new();
        for _ in 0..attempts {
            // separate store handles mimic separate worker processes
            let store = Arc::new(SqliteCounterStore::open(&path, DEFAULT_BUSY_TIMEOUT).unwrap());
            let limiter = RateLimiter::new(store);
            let policy = policy.clone();
            handles.push(tokio::spawn(async move {
                limiter.check_and_record(IP, &policy).await.unwrap()
            }));
        }

        let mut allowed = Vec::new();
        let mut denied = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Decision::Allowed { remaining } => allowed.push(remaining),
                Decision::Denied { retry_after_secs } => {
                    assert!(retry_after_secs > 0);
                    denied += 1;
                }
            }
        }

        allowed.sort_unstable();
        assert_eq!(allowed, vec![0, 1, 2, 3, 4]);
        assert_eq!(denied, attempts - 5);
        remove_db(&path);
    }

    #[test]
    fn concurrent_threads_share_one_store() {
        let path = temp_db_path("threads");
        let store = Arc::new(SqliteCounterStore::open(&path, DEFAULT_BUSY_TIMEOUT).unwrap());
        let limiter = RateLimiter::new(store.clone());
        let policy = RateLimitPolicy::new("password-reset/request", 3600, 3);

        let admitted: usize = std::thread::scope(|scope| {
            let workers: Vec<_> = (0..12)
                .map(|_| {
                    let limiter = limiter.clone();
                    let policy = policy.clone();
                    scope.spawn(move || {
                        limiter.check_and_record_blocking(IP, &policy).unwrap().is_allowed() as usize
                    })
                })
                .collect();
            workers.into_iter().map(|w| w.join().unwrap()).sum()
        });

        assert_eq!(admitted, 3);
        let mut txn = store.begin().unwrap();
        let stored = txn.get(&counter_key(IP, "password-reset/request")).unwrap().unwrap();
        assert_eq!(stored.count, 3);
        drop(txn);
        remove_db(&path);
    }
}

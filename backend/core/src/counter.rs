//! Persistent fixed-window counters and the admit/deny transition.
//!
//! [`evaluate`] is pure: it looks at the stored counter (if any), the policy
//! and the current time, and says what to answer and what to write back. The
//! store adapter runs it inside a transaction.

use serde::{Deserialize, Serialize};

use crate::decision::Decision;
use crate::policy::RateLimitPolicy;

/// One row per (identity, action) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitCounter {
    /// Composite key from [`crate::counter_key`]; the storage primary key.
    pub id: String,
    /// Attempts recorded in the current window. Always >= 1.
    pub count: u32,
    /// Start of the current window, ms since the Unix epoch.
    pub last_request: i64,
}

impl RateLimitCounter {
    /// A counter opening a new window at `now_ms`.
    pub fn first(id: impl Into<String>, now_ms: i64) -> Self {
        Self {
            id: id.into(),
            count: 1,
            last_request: now_ms,
        }
    }
}

/// Which edge of the per-counter state machine an attempt took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Created,
    Reset,
    Incremented,
    Rejected,
}

impl Transition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transition::Created => "created",
            Transition::Reset => "reset",
            Transition::Incremented => "incremented",
            Transition::Rejected => "rejected",
        }
    }
}

/// Result of evaluating one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub decision: Decision,
    pub transition: Transition,
    /// Row to upsert. `None` exactly when the attempt was rejected.
    pub write: Option<RateLimitCounter>,
}

/// Decide one attempt against `existing` at time `now_ms`.
///
/// The window is still open when `elapsed == window`; it resets only once
/// `elapsed > window`. A clock that stepped backwards counts as zero elapsed.
pub fn evaluate(
    key: &str,
    existing: Option<&RateLimitCounter>,
    policy: &RateLimitPolicy,
    now_ms: i64,
) -> Evaluation {
    let fresh_remaining = policy.max_count.saturating_sub(1);

    let Some(counter) = existing else {
        return Evaluation {
            decision: Decision::Allowed { remaining: fresh_remaining },
            transition: Transition::Created,
            write: Some(RateLimitCounter::first(key, now_ms)),
        };
    };

    let window_ms = policy.window_ms();
    let elapsed = now_ms.saturating_sub(counter.last_request).max(0);

    if elapsed > window_ms {
        return Evaluation {
            decision: Decision::Allowed { remaining: fresh_remaining },
            transition: Transition::Reset,
            write: Some(RateLimitCounter::first(key, now_ms)),
        };
    }

    if counter.count >= policy.max_count {
        return Evaluation {
            decision: Decision::Denied {
                retry_after_secs: retry_after_secs(window_ms - elapsed),
            },
            transition: Transition::Rejected,
            write: None,
        };
    }

    let count = counter.count + 1;
    Evaluation {
        decision: Decision::Allowed {
            remaining: policy.max_count - count,
        },
        transition: Transition::Incremented,
        write: Some(RateLimitCounter {
            id: counter.id.clone(),
            count,
            last_request: counter.last_request,
        }),
    }
}

/// Whole seconds until the window closes, rounded up, never below one.
fn retry_after_secs(remaining_ms: i64) -> u64 {
    let secs = (remaining_ms.max(0) as u64).div_ceil(1000);
    secs.max(1)
}

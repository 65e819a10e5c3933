//! Rate-limit policies declared by each protected action.

use serde::{Deserialize, Serialize};

use crate::error::ThrottleError;
use crate::key::KEY_SEPARATOR;

/// A fixed-window limit for one action: at most `max_count` attempts per
/// `window_seconds`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitPolicy {
    pub action_key: String,
    pub window_seconds: u64,
    pub max_count: u32,
}

impl RateLimitPolicy {
    pub fn new(action_key: impl Into<String>, window_seconds: u64, max_count: u32) -> Self {
        Self {
            action_key: action_key.into(),
            window_seconds,
            max_count,
        }
    }

    /// Window length in milliseconds, saturating at `i64::MAX`.
    pub fn window_ms(&self) -> i64 {
        i64::try_from(self.window_seconds.saturating_mul(1000)).unwrap_or(i64::MAX)
    }

    pub fn validate(&self) -> Result<(), ThrottleError> {
        if self.action_key.trim().is_empty() {
            return Err(ThrottleError::InvalidPolicy("action key cannot be empty".into()));
        }
        if self.action_key.contains(KEY_SEPARATOR) {
            return Err(ThrottleError::InvalidPolicy(format!(
                "action key '{}' cannot contain '{KEY_SEPARATOR}'",
                self.action_key
            )));
        }
        if self.window_seconds == 0 {
            return Err(ThrottleError::InvalidPolicy(format!(
                "window_seconds must be positive for '{}'",
                self.action_key
            )));
        }
        if self.max_count == 0 {
            return Err(ThrottleError::InvalidPolicy(format!(
                "max_count must be positive for '{}'",
                self.action_key
            )));
        }
        Ok(())
    }
}

/// What a call site does with a check that failed on the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureMode {
    /// Treat the unresolved check as a denial.
    #[default]
    Closed,
    /// Let the action through.
    Open,
}

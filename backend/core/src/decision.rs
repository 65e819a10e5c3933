//! Admit/deny outcomes and how callers present them.

use serde::{Deserialize, Serialize};

use crate::error::ThrottleError;
use crate::policy::FailureMode;

/// Outcome of one `check_and_record` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The attempt was recorded; `remaining` more fit in this window.
    Allowed { remaining: u32 },
    /// Over the limit; nothing was recorded.
    Denied { retry_after_secs: u64 },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed { .. })
    }

    pub fn remaining(&self) -> Option<u32> {
        match self {
            Decision::Allowed { remaining } => Some(*remaining),
            Decision::Denied { .. } => None,
        }
    }

    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Decision::Allowed { .. } => None,
            Decision::Denied { retry_after_secs } => Some(*retry_after_secs),
        }
    }

    /// User-facing wait text for a denial, e.g. "try again in 5 minutes".
    pub fn wait_message(&self) -> Option<String> {
        self.retry_after_secs().map(format_wait)
    }

    pub fn body(&self) -> DecisionBody {
        match *self {
            Decision::Allowed { remaining } => DecisionBody {
                allowed: true,
                remaining: Some(remaining),
                retry_after_seconds: None,
                message: None,
            },
            Decision::Denied { retry_after_secs } => DecisionBody {
                allowed: false,
                remaining: None,
                retry_after_seconds: Some(retry_after_secs),
                message: Some(format_wait(retry_after_secs)),
            },
        }
    }
}

/// Wire shape of a [`Decision`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionBody {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_seconds: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Render a wait in the largest unit that fits, rounding up.
pub fn format_wait(secs: u64) -> String {
    let (amount, unit) = if secs < 60 {
        (secs.max(1), "second")
    } else if secs < 3600 {
        (secs.div_ceil(60), "minute")
    } else {
        (secs.div_ceil(3600), "hour")
    };
    let plural = if amount == 1 { "" } else { "s" };
    format!("try again in {amount} {unit}{plural}")
}

/// Apply a call site's failure mode to an unresolved check.
///
/// Storage errors become a one-second denial under [`FailureMode::Closed`]
/// and an admission under [`FailureMode::Open`]. Invalid policies are
/// returned unchanged.
pub fn resolve_outcome(
    result: Result<Decision, ThrottleError>,
    mode: FailureMode,
) -> Result<Decision, ThrottleError> {
    match result {
        Err(ThrottleError::Storage(_)) => Ok(match mode {
            FailureMode::Closed => Decision::Denied { retry_after_secs: 1 },
            FailureMode::Open => Decision::Allowed { remaining: 0 },
        }),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StorageError;

    #[test]
    fn wait_messages() {
        assert_eq!(format_wait(0), "try again in 1 second");
        assert_eq!(format_wait(30), "try again in 30 seconds");
        assert_eq!(format_wait(60), "try again in 1 minute");
        assert_eq!(format_wait(299), "try again in 5 minutes");
        assert_eq!(format_wait(3600), "try again in 1 hour");
        assert_eq!(format_wait(3601), "try again in 2 hours");
    }

    #[test]
    fn allowed_body_omits_retry() {
        let json = serde_json::to_value(Decision::Allowed { remaining: 3 }.body()).unwrap();
        assert_eq!(json, serde_json::json!({"allowed": true, "remaining": 3}));
    }

    #[test]
    fn denied_body_carries_wait() {
        let json = serde_json::to_value(Decision::Denied { retry_after_secs: 299 }.body()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "allowed": false,
                "retryAfterSeconds": 299,
                "message": "try again in 5 minutes"
            })
        );
    }

    #[test]
    fn fail_closed_denies_storage_errors() {
        let err = Err(StorageError::Backend("disk I/O error".into()).into());
        let decision = resolve_outcome(err, FailureMode::Closed).unwrap();
        assert_eq!(decision, Decision::Denied { retry_after_secs: 1 });
    }

    #[test]
    fn fail_open_admits_storage_errors() {
        let err = Err(StorageError::Timeout(std::time::Duration::from_secs(1)).into());
        assert!(resolve_outcome(err, FailureMode::Open).unwrap().is_allowed());
    }

    #[test]
    fn invalid_policy_is_never_resolved() {
        let err = Err(ThrottleError::InvalidPolicy("empty identity".into()));
        assert!(resolve_outcome(err, FailureMode::Open).is_err());
    }
}

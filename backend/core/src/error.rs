use std::time::Duration;

use thiserror::Error;

/// Top-level error type for rate-limit checks and sweeps.
///
/// A denial is not an error; see [`crate::Decision::Denied`].
#[derive(Debug, Error)]
pub enum ThrottleError {
    #[error("invalid policy: {0}")]
    InvalidPolicy(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ThrottleError {
    pub fn is_storage(&self) -> bool {
        matches!(self, ThrottleError::Storage(_))
    }
}

/// Failures of the backing counter store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("storage error: {0}")]
    Backend(String),

    #[error("storage timed out after {0:?}")]
    Timeout(Duration),

    #[error("storage task interrupted: {0}")]
    Interrupted(String),
}

pub type StoreResult<T> = Result<T, StorageError>;

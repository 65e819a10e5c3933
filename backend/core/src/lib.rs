pub mod clock;
pub mod counter;
pub mod decision;
pub mod error;
pub mod key;
pub mod policy;
pub mod traits;

pub use clock::{Clock, ManualClock, SystemClock};
pub use counter::{evaluate, Evaluation, RateLimitCounter, Transition};
pub use decision::{format_wait, resolve_outcome, Decision, DecisionBody};
pub use error::{StorageError, StoreResult, ThrottleError};
pub use key::{counter_key, KEY_SEPARATOR};
pub use policy::{FailureMode, RateLimitPolicy};
pub use traits::{CounterStore, CounterTxn};

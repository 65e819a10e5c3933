//! Structured logging setup for ShopGuard.
//!
//! Console output, an optional daily-rolling JSON file, and masking helpers for
//! caller identities and credentials that end up in log fields.

pub mod logger;
pub mod redact;

pub use logger::init_logger;
pub use redact::{mask_identity, redact_sensitive_data};

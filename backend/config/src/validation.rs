//! Config validation with field paths in every message.

use crate::schema::ShopGuardConfig;
use shopguard_core::KEY_SEPARATOR;
use thiserror::Error;

/// Secrets shorter than this are accepted with a warning.
const MIN_SECRET_LEN: usize = 16;

/// A config validation error with field path and message.
#[derive(Debug, Error)]
#[error("Config validation error at '{path}': {message}")]
pub struct ConfigValidationError {
    pub path: String,
    pub message: String,
}

/// All errors and warnings found in one pass.
#[derive(Debug, Default)]
pub struct ValidationReport {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            path: path.into(),
            message: message.into(),
        });
    }

    fn warn(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            path: path.into(),
            message: message.into(),
        });
    }
}

/// Validate the config and return a report of all errors and warnings.
pub fn validate(config: &ShopGuardConfig) -> ValidationReport {
    let mut report = ValidationReport::default();
    validate_server(config, &mut report);
    validate_store(config, &mut report);
    validate_sweep(config, &mut report);
    validate_policies(config, &mut report);
    report
}

fn validate_server(config: &ShopGuardConfig, report: &mut ValidationReport) {
    if config.server.port == 0 {
        report.error("server.port", "port must be non-zero");
    }
    if config.server.bind_address.trim().is_empty() {
        report.error("server.bind_address", "bind address cannot be empty");
    }
}

fn validate_store(config: &ShopGuardConfig, report: &mut ValidationReport) {
    if config.store.path.trim().is_empty() {
        report.error("store.path", "database path cannot be empty");
    }
    if config.store.timeout_ms == 0 {
        report.error("store.timeout_ms", "timeout must be > 0");
    }
}

fn validate_sweep(config: &ShopGuardConfig, report: &mut ValidationReport) {
    if config.sweep.retention_hours == 0 {
        report.error("sweep.retention_hours", "retention must be > 0");
    }
    match config.sweep.trigger_secret.as_deref() {
        None => report.warn(
            "sweep.trigger_secret",
            "No trigger secret configured; the HTTP sweep trigger is disabled",
        ),
        Some(secret) if secret.len() < MIN_SECRET_LEN => report.warn(
            "sweep.trigger_secret",
            format!("Trigger secret is shorter than {MIN_SECRET_LEN} characters"),
        ),
        Some(_) => {}
    }
}

fn validate_policies(config: &ShopGuardConfig, report: &mut ValidationReport) {
    let retention_secs = config.sweep.retention_hours.saturating_mul(3600);
    for (key, policy) in &config.policies {
        let path = format!("policies.{key}");
        if key.trim().is_empty() {
            report.error("policies", "Action key cannot be empty");
        }
        if key.contains(KEY_SEPARATOR) {
            report.error(&path, format!("Action key cannot contain '{KEY_SEPARATOR}'"));
        }
        if policy.window_seconds == 0 {
            report.error(format!("{path}.window_seconds"), "window_seconds must be > 0");
        }
        if policy.max_count == 0 {
            report.error(format!("{path}.max_count"), "max_count must be > 0");
        }
        if retention_secs > 0 && policy.window_seconds > retention_secs {
            report.warn(
                format!("{path}.window_seconds"),
                "Window is longer than the sweep retention; counters may be swept mid-window",
            );
        }
    }
}

//! `shopguard-config`: ShopGuard runtime configuration.
//!
//! Provides:
//! - Typed config schema (server, store, sweep, logging, policy table)
//! - YAML read/write with a backup of the previous file
//! - `${ENV_VAR}` / `${ENV_VAR:-fallback}` substitution
//! - Default storefront policies
//! - Validation with path-qualified messages
//! - Redaction for printing

pub mod defaults;
pub mod env;
pub mod io;
pub mod redact;
pub mod schema;
pub mod validation;

pub use defaults::{apply_all_defaults, default_policies};
pub use env::{resolve_env_vars, resolve_env_vars_with, restore_env_refs, MissingEnvVarError};
pub use io::{config_dir, config_file_path, read_raw, write_config, write_config_value};
pub use redact::redact;
pub use schema::{LoggingConfig, PolicyConfig, ServerConfig, ShopGuardConfig, StoreConfig, SweepConfig};
pub use validation::{validate, ConfigValidationError, ValidationReport};

use anyhow::{bail, Context, Result};
use serde_json::Value;
use std::path::Path;

/// A validated config together with the file tree it was built from.
#[derive(Debug)]
pub struct LoadedConfig {
    pub config: ShopGuardConfig,
    /// Validation warnings; the load already failed if there were errors.
    pub warnings: Vec<ConfigValidationError>,
    raw: Value,
}

impl LoadedConfig {
    /// Write the effective config to `path`. Values that came from `${VAR}`
    /// references are written back as the reference.
    pub async fn write_to(&self, path: &Path) -> Result<()> {
        let mut value = serde_json::to_value(&self.config).context("Failed to serialize config")?;
        restore_env_refs(&mut value, &self.raw);
        write_config_value(&value, path).await
    }
}

/// Load, substitute env vars, apply defaults, and validate a config file.
///
/// This is the main entry point for loading a config at runtime. Any
/// validation error fails the load; warnings are returned for the caller to
/// log once its subscriber is up.
pub async fn load_and_prepare(path: &Path) -> Result<LoadedConfig> {
    let raw = read_raw(path).await?;
    let value = resolve_env_vars(&raw).context("Failed to resolve env vars in config")?;

    let config: ShopGuardConfig =
        serde_json::from_value(value).context("Failed to deserialize config")?;
    let config = apply_all_defaults(config);

    let report = validate(&config);
    if !report.is_valid() {
        let errors: Vec<String> = report.errors.iter().map(ToString::to_string).collect();
        bail!("{} config error(s): {}", errors.len(), errors.join("; "));
    }

    Ok(LoadedConfig {
        config,
        warnings: report.warnings,
        raw,
    })
}

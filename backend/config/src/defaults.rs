//! Config defaults: the storefront policy table and value normalization.

use std::collections::BTreeMap;

use crate::schema::{PolicyConfig, ShopGuardConfig};

/// Built-in policies for the storefront's sensitive actions.
///
/// Entries in the config file replace these key by key; keys not mentioned
/// keep the preset.
pub fn default_policies() -> BTreeMap<String, PolicyConfig> {
    [
        ("sign-in/email", PolicyConfig::new(300, 5)),
        ("sign-up/email", PolicyConfig::new(3600, 5)),
        ("password-reset/request", PolicyConfig::new(3600, 3)),
        ("admin/address-key", PolicyConfig::new(900, 10)),
        ("wishlist/share", PolicyConfig::new(60, 20)),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

/// Apply all defaults to a freshly loaded config.
pub fn apply_all_defaults(config: ShopGuardConfig) -> ShopGuardConfig {
    let config = apply_policy_defaults(config);
    let config = apply_sweep_defaults(config);
    apply_logging_defaults(config)
}

fn apply_policy_defaults(mut config: ShopGuardConfig) -> ShopGuardConfig {
    for (key, preset) in default_policies() {
        config.policies.entry(key).or_insert(preset);
    }
    config
}

/// `${VAR:-}` resolves to an empty secret; treat that as "not configured".
fn apply_sweep_defaults(mut config: ShopGuardConfig) -> ShopGuardConfig {
    if config
        .sweep
        .trigger_secret
        .as_deref()
        .is_some_and(|s| s.trim().is_empty())
    {
        config.sweep.trigger_secret = None;
    }
    config
}

fn apply_logging_defaults(mut config: ShopGuardConfig) -> ShopGuardConfig {
    if config.logging.level.trim().is_empty() {
        config.logging.level = "info".to_string();
    }
    if config.logging.dir.as_deref().is_some_and(|d| d.trim().is_empty()) {
        config.logging.dir = None;
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_fill_missing_policies() {
        let config = apply_all_defaults(ShopGuardConfig::default());
        assert_eq!(config.policies.len(), 5);
        assert_eq!(config.policies["sign-in/email"], PolicyConfig::new(300, 5));
        assert_eq!(config.policies["password-reset/request"], PolicyConfig::new(3600, 3));
    }

    #[test]
    fn file_entries_override_presets() {
        let mut config = ShopGuardConfig::default();
        config
            .policies
            .insert("sign-in/email".into(), PolicyConfig::new(600, 3));
        config
            .policies
            .insert("checkout/coupon".into(), PolicyConfig::new(60, 10));
        let config = apply_all_defaults(config);
        assert_eq!(config.policies["sign-in/email"], PolicyConfig::new(600, 3));
        assert!(config.policies.contains_key("checkout/coupon"));
        assert_eq!(config.policies.len(), 6);
    }

    #[test]
    fn blank_secret_and_level_are_normalized() {
        let mut config = ShopGuardConfig::default();
        config.sweep.trigger_secret = Some("  ".into());
        config.logging.level = String::new();
        let config = apply_all_defaults(config);
        assert!(config.sweep.trigger_secret.is_none());
        assert_eq!(config.logging.level, "info");
    }
}

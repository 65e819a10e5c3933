//! Environment variable substitution for config values.
//!
//! String values may reference `${VAR}` or `${VAR:-fallback}`. Only uppercase
//! `[A-Z_][A-Z0-9_]*` names are matched. An unset or empty variable with no
//! fallback is an error that names the config path it was found at.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;

static ENV_REF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}").unwrap());

#[derive(Debug, thiserror::Error)]
#[error("Missing env var \"{var_name}\" referenced at config path: {config_path}")]
pub struct MissingEnvVarError {
    pub var_name: String,
    pub config_path: String,
}

/// Substitute references using the process environment.
pub fn resolve_env_vars(value: &Value) -> Result<Value, MissingEnvVarError> {
    resolve_env_vars_with(value, &std::env::vars().collect())
}

/// Substitute references using the given map.
pub fn resolve_env_vars_with(
    value: &Value,
    env: &HashMap<String, String>,
) -> Result<Value, MissingEnvVarError> {
    resolve(value, env, "")
}

fn resolve(value: &Value, env: &HashMap<String, String>, path: &str) -> Result<Value, MissingEnvVarError> {
    Ok(match value {
        Value::String(s) => Value::String(resolve_str(s, env, path)?),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .enumerate()
                .map(|(i, v)| resolve(v, env, &format!("{path}[{i}]")))
                .collect::<Result<_, _>>()?,
        ),
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                let child = if path.is_empty() { k.clone() } else { format!("{path}.{k}") };
                out.insert(k.clone(), resolve(v, env, &child)?);
            }
            Value::Object(out)
        }
        other => other.clone(),
    })
}

fn resolve_str(s: &str, env: &HashMap<String, String>, path: &str) -> Result<String, MissingEnvVarError> {
    if !s.contains("${") {
        return Ok(s.to_string());
    }

    let mut out = String::with_capacity(s.len());
    let mut last = 0;
    for caps in ENV_REF.captures_iter(s) {
        let Some(whole) = caps.get(0) else { continue };
        out.push_str(&s[last..whole.start()]);

        let name = &caps[1];
        match (env.get(name).filter(|v| !v.is_empty()), caps.get(2)) {
            (Some(val), _) => out.push_str(val),
            (None, Some(fallback)) => out.push_str(fallback.as_str()),
            (None, None) => {
                return Err(MissingEnvVarError {
                    var_name: name.to_string(),
                    config_path: path.to_string(),
                })
            }
        }
        last = whole.end();
    }
    out.push_str(&s[last..]);
    Ok(out)
}

/// Put `${VAR}` references from `raw` back into `resolved` at the same paths.
///
/// Used before writing a loaded config to disk so values taken from the
/// environment are never persisted in resolved form.
pub fn restore_env_refs(resolved: &mut Value, raw: &Value) {
    match (resolved, raw) {
        (slot, Value::String(s)) if ENV_REF.is_match(s) => *slot = Value::String(s.clone()),
        (Value::Object(out), Value::Object(map)) => {
            for (k, v) in map {
                match out.get_mut(k) {
                    Some(slot) => restore_env_refs(slot, v),
                    // resolved to nothing and dropped; keep the reference
                    None if v.as_str().is_some_and(|s| ENV_REF.is_match(s)) => {
                        out.insert(k.clone(), v.clone());
                    }
                    None => {}
                }
            }
        }
        (Value::Array(out), Value::Array(items)) => {
            for (slot, v) in out.iter_mut().zip(items) {
                restore_env_refs(slot, v);
            }
        }
        _ => {}
    }
}

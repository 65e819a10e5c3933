//! Config redaction: safe-to-print snapshots with secrets masked.

use serde_json::Value;

/// Keys whose string values are never printed.
static SECRET_KEYS: &[&str] = &["trigger_secret", "secret", "password", "token", "api_key"];

const MASK: &str = "***";

fn is_secret_key(key: &str) -> bool {
    SECRET_KEYS.iter().any(|k| k.eq_ignore_ascii_case(key))
}

/// Replace every non-empty secret string in `value` with `"***"`.
pub fn redact(value: &Value) -> Value {
    redact_under(value, "")
}

fn redact_under(value: &Value, key: &str) -> Value {
    match value {
        Value::String(s) if !s.is_empty() && is_secret_key(key) => Value::String(MASK.to_string()),
        Value::Array(items) => Value::Array(items.iter().map(|v| redact_under(v, key)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), redact_under(v, k)))
                .collect(),
        ),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn masks_trigger_secret() {
        let v = json!({"sweep": {"retention_hours": 24, "trigger_secret": "s3cr3t-sweep-token"}});
        let out = redact(&v);
        assert_eq!(out["sweep"]["trigger_secret"], "***");
        assert_eq!(out["sweep"]["retention_hours"], 24);
    }

    #[test]
    fn leaves_other_values_alone() {
        let v = json!({"store": {"path": "shopguard.db"}, "policies": {"sign-in/email": {"max_count": 5}}});
        assert_eq!(redact(&v), v);
    }
}

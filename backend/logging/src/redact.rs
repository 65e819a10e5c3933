//! Log Redaction
//!
//! Caller identities are network addresses, so they are masked before they
//! reach a log line. Bearer credentials are scrubbed from free text.

use regex::Regex;
use std::net::IpAddr;
use std::sync::LazyLock;

static BEARER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)bearer\s+[a-zA-Z0-9\-\._~+/]+=*").unwrap());

/// Mask an identity for logging.
///
/// IPv4 keeps three octets (`203.0.113.*`), IPv6 keeps three groups
/// (`2001:db8:85a3:*`), anything else keeps a four-character prefix.
pub fn mask_identity(identity: &str) -> String {
    match identity.parse::<IpAddr>() {
        Ok(IpAddr::V4(v4)) => {
            let [a, b, c, _] = v4.octets();
            format!("{a}.{b}.{c}.*")
        }
        Ok(IpAddr::V6(v6)) => {
            let s = v6.segments();
            format!("{:x}:{:x}:{:x}:*", s[0], s[1], s[2])
        }
        Err(_) => {
            let prefix: String = identity.chars().take(4).collect();
            format!("{prefix}***")
        }
    }
}

/// Replace bearer tokens in `input` with a placeholder.
pub fn redact_sensitive_data(input: &str) -> String {
    BEARER_RE.replace_all(input, "[REDACTED_TOKEN]").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_ipv4_last_octet() {
        assert_eq!(mask_identity("203.0.113.7"), "203.0.113.*");
    }

    #[test]
    fn masks_ipv6_interface_bits() {
        assert_eq!(mask_identity("2001:db8:85a3::8a2e:370:7334"), "2001:db8:85a3:*");
    }

    #[test]
    fn masks_other_identities_to_prefix() {
        assert_eq!(mask_identity("user-42@example.com"), "user***");
        assert_eq!(mask_identity("ab"), "ab***");
    }

    #[test]
    fn scrubs_bearer_tokens() {
        let clean = redact_sensitive_data("rejected header: Bearer s3cr3t-sweep-token");
        assert!(!clean.contains("s3cr3t-sweep-token"));
        assert!(clean.contains("[REDACTED_TOKEN]"));
    }
}

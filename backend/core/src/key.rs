//! Counter key encoding.
//!
//! Every store lookup goes through [`counter_key`], so a backend that needs a
//! structured key only has to change this one function.

/// Separator between the identity and the action key.
pub const KEY_SEPARATOR: char = '|';

/// Build the storage id for an (identity, action) pair: `"{identity}|{action_key}"`.
pub fn counter_key(identity: &str, action_key: &str) -> String {
    format!("{identity}{KEY_SEPARATOR}{action_key}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_identity_and_action() {
        assert_eq!(counter_key("203.0.113.7", "sign-in/email"), "203.0.113.7|sign-in/email");
    }

    #[test]
    fn ipv6_identities_keep_their_colons() {
        assert_eq!(
            counter_key("2001:db8::1", "password-reset/request"),
            "2001:db8::1|password-reset/request"
        );
    }
}

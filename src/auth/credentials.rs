//! Credential list parsing and password checks
//!
//! Credentials arrive as a single environment string of the form
//! `user:pass,user2:pass2`. Parsing is strict about shape but tolerant
//! of surrounding whitespace; passwords may contain `:` since only the
//! first colon splits an entry.

use crate::error::ChatRelayError;
use std::collections::BTreeMap;

/// Parsed set of username/password pairs
#[derive(Debug, Clone, Default)]
pub struct CredentialSet {
    users: BTreeMap<String, String>,
}

impl CredentialSet {
    /// Parse a `user:pass,user2:pass2` credential string
    ///
    /// Empty entries (stray commas) are skipped. Duplicate usernames
    /// keep the last password given.
    ///
    /// # Errors
    ///
    /// Returns `ChatRelayError::Config` for an entry without a colon or
    /// with an empty username.
    pub fn parse(raw: &str) -> std::result::Result<Self, ChatRelayError> {
        let mut users = BTreeMap::new();
        for entry in raw.split(',') {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            let (username, password) = entry.split_once(':').ok_or_else(|| {
                ChatRelayError::Config(format!("credential entry '{}' is not user:pass", entry))
            })?;
            if username.is_empty() {
                return Err(ChatRelayError::Config(
                    "credential entry has empty username".to_string(),
                ));
            }
            users.insert(username.to_string(), password.to_string());
        }
        Ok(Self { users })
    }

    /// Whether the set contains any users at all
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Check a username/password pair
    pub fn verify(&self, username: &str, password: &str) -> bool {
        self.users
            .get(username)
            .map(|stored| stored == password)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_entry() {
        let set = CredentialSet::parse("alice:secret").unwrap();
        assert!(set.verify("alice", "secret"));
        assert!(!set.verify("alice", "wrong"));
        assert!(!set.verify("bob", "secret"));
    }

    #[test]
    fn test_parse_multiple_entries() {
        let set = CredentialSet::parse("alice:secret,bob:hunter2").unwrap();
        assert!(set.verify("alice", "secret"));
        assert!(set.verify("bob", "hunter2"));
    }

    #[test]
    fn test_password_may_contain_colon() {
        let set = CredentialSet::parse("alice:se:cr:et").unwrap();
        assert!(set.verify("alice", "se:cr:et"));
    }

    #[test]
    fn test_whitespace_and_stray_commas_tolerated() {
        let set = CredentialSet::parse(" alice:secret , ,bob:hunter2,").unwrap();
        assert!(set.verify("alice", "secret"));
        assert!(set.verify("bob", "hunter2"));
    }

    #[test]
    fn test_missing_colon_rejected() {
        assert!(CredentialSet::parse("alice-no-colon").is_err());
    }

    #[test]
    fn test_empty_username_rejected() {
        assert!(CredentialSet::parse(":secret").is_err());
    }

    #[test]
    fn test_empty_string_is_empty_set() {
        let set = CredentialSet::parse("").unwrap();
        assert!(set.is_empty());
        assert!(!set.verify("anyone", "anything"));
    }

    #[test]
    fn test_empty_password_allowed_but_must_match() {
        let set = CredentialSet::parse("alice:").unwrap();
        assert!(set.verify("alice", ""));
        assert!(!set.verify("alice", "x"));
    }
}

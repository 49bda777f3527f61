//! Session token minting and verification
//!
//! Tokens are self-contained and stateless:
//! `username|expiry|hex(sha256(username|expiry|secret))`, where
//! `expiry` is a unix timestamp in seconds. Verification recomputes
//! the signature over the claimed fields, so any alteration of the
//! username or expiry invalidates the token.

use crate::error::ChatRelayError;
use sha2::{Digest, Sha256};

/// Field separator inside a token. Usernames must not contain it.
const SEPARATOR: char = '|';

/// Compute the hex signature over the username and expiry fields
fn sign(username: &str, expiry: i64, secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(username.as_bytes());
    hasher.update([SEPARATOR as u8]);
    hasher.update(expiry.to_string().as_bytes());
    hasher.update([SEPARATOR as u8]);
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

/// Mint a session token for the given user
///
/// # Arguments
///
/// * `username` - Authenticated user; must not contain `|`
/// * `ttl_seconds` - Token lifetime from now
/// * `secret` - Server-side signing secret
///
/// # Errors
///
/// Returns `ChatRelayError::Authentication` if the username contains
/// the field separator.
pub fn mint(
    username: &str,
    ttl_seconds: u64,
    secret: &str,
) -> std::result::Result<String, ChatRelayError> {
    if username.contains(SEPARATOR) {
        return Err(ChatRelayError::Authentication(format!(
            "username must not contain '{}'",
            SEPARATOR
        )));
    }
    let expiry = chrono::Utc::now().timestamp() + ttl_seconds as i64;
    let signature = sign(username, expiry, secret);
    Ok(format!("{username}{SEPARATOR}{expiry}{SEPARATOR}{signature}"))
}

/// Verify a session token, returning the authenticated username
///
/// # Errors
///
/// Returns `ChatRelayError::Authentication` for a malformed token, a
/// bad signature, or an expired token. The reasons are distinguished
/// in the message for logging but all map to the same rejection.
pub fn verify(token: &str, secret: &str) -> std::result::Result<String, ChatRelayError> {
    let mut parts = token.splitn(3, SEPARATOR);
    let (username, expiry_raw, signature) = match (parts.next(), parts.next(), parts.next()) {
        (Some(u), Some(e), Some(s)) if !u.is_empty() => (u, e, s),
        _ => {
            return Err(ChatRelayError::Authentication(
                "malformed session token".to_string(),
            ))
        }
    };
    let expiry: i64 = expiry_raw
        .parse()
        .map_err(|_| ChatRelayError::Authentication("malformed token expiry".to_string()))?;

    let expected = sign(username, expiry, secret);
    if !constant_time_eq(signature.as_bytes(), expected.as_bytes()) {
        return Err(ChatRelayError::Authentication(
            "invalid token signature".to_string(),
        ));
    }
    if chrono::Utc::now().timestamp() >= expiry {
        return Err(ChatRelayError::Authentication(
            "session token expired".to_string(),
        ));
    }
    Ok(username.to_string())
}

/// Compare two byte strings without early exit on mismatch
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-signing-secret";

    #[test]
    fn test_mint_and_verify_round_trip() {
        let token = mint("alice", 3600, SECRET).unwrap();
        let username = verify(&token, SECRET).unwrap();
        assert_eq!(username, "alice");
    }

    #[test]
    fn test_token_shape() {
        let token = mint("alice", 3600, SECRET).unwrap();
        let parts: Vec<&str> = token.split('|').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "alice");
        assert!(parts[1].parse::<i64>().is_ok());
        // hex-encoded sha256 digest
        assert_eq!(parts[2].len(), 64);
        assert!(parts[2].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = mint("alice", 3600, SECRET).unwrap();
        assert!(verify(&token, "other-secret").is_err());
    }

    #[test]
    fn test_tampered_username_rejected() {
        let token = mint("alice", 3600, SECRET).unwrap();
        let tampered = token.replacen("alice", "admin", 1);
        assert!(verify(&tampered, SECRET).is_err());
    }

    #[test]
    fn test_tampered_expiry_rejected() {
        let token = mint("alice", 3600, SECRET).unwrap();
        let mut parts: Vec<String> = token.split('|').map(String::from).collect();
        let bumped: i64 = parts[1].parse::<i64>().unwrap() + 999_999;
        parts[1] = bumped.to_string();
        assert!(verify(&parts.join("|"), SECRET).is_err());
    }

    #[test]
    fn test_expired_token_rejected() {
        // Sign an already-past expiry directly.
        let expiry = chrono::Utc::now().timestamp() - 10;
        let signature = sign("alice", expiry, SECRET);
        let token = format!("alice|{expiry}|{signature}");
        let err = verify(&token, SECRET).unwrap_err();
        assert!(err.to_string().contains("expired"));
    }

    #[test]
    fn test_malformed_token_rejected() {
        assert!(verify("", SECRET).is_err());
        assert!(verify("alice", SECRET).is_err());
        assert!(verify("alice|123", SECRET).is_err());
        assert!(verify("|123|deadbeef", SECRET).is_err());
        assert!(verify("alice|notanumber|deadbeef", SECRET).is_err());
    }

    #[test]
    fn test_username_with_separator_rejected_at_mint() {
        assert!(mint("al|ice", 3600, SECRET).is_err());
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
    }
}

//! Idempotency record types and fingerprinting

use std::time::Duration;

use sha2::{Digest, Sha256};

/// Request header carrying the client's idempotency token
pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// Default record lifetime
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Response captured for replay
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredResponse {
    pub status: u16,
    pub body: String,
}

impl StoredResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// Fingerprint of a request: hex SHA-256 over the token and the raw body
///
/// The token is length-prefixed so that `("ab", "c")` and `("a", "bc")`
/// never collide.
pub fn fingerprint(token: &str, body: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update((token.len() as u64).to_be_bytes());
    hasher.update(token.as_bytes());
    hasher.update(body);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_is_deterministic() {
        let a = fingerprint("key-1", br#"{"amount":"1"}"#);
        let b = fingerprint("key-1", br#"{"amount":"1"}"#);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_fingerprint_depends_on_token_and_body() {
        let base = fingerprint("key-1", b"body");
        assert_ne!(base, fingerprint("key-2", b"body"));
        assert_ne!(base, fingerprint("key-1", b"body2"));
    }

    #[test]
    fn test_fingerprint_token_boundary() {
        assert_ne!(fingerprint("ab", b"c"), fingerprint("a", b"bc"));
    }
}

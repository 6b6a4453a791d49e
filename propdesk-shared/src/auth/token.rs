/// Opaque random tokens
///
/// Session references, activation tokens and vendor-link tokens are all
/// base62 strings drawn from the OS RNG. 43 characters of base62 carry
/// roughly 256 bits, comfortably above UUID-grade entropy, and survive URLs
/// and cookies without escaping.
///
/// ```
/// use propdesk_shared::auth::token::{generate_token, hash_session_token, TOKEN_LENGTH};
///
/// let token = generate_token();
/// assert_eq!(token.len(), TOKEN_LENGTH);
/// assert_eq!(hash_session_token(&token).len(), 64);
/// ```

use rand::{rngs::OsRng, Rng};
use sha2::{Digest, Sha256};

pub const TOKEN_LENGTH: usize = 43;

const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

pub fn generate_token() -> String {
    let mut rng = OsRng;
    (0..TOKEN_LENGTH)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect()
}

/// Hex SHA-256 of a session token, as stored in `sessions.token_hash`
pub fn hash_session_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Cheap shape check before touching storage
pub fn looks_like_token(value: &str) -> bool {
    value.len() == TOKEN_LENGTH && value.bytes().all(|b| b.is_ascii_alphanumeric())
}

/// Compares without short-circuiting on the first differing byte
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes().zip(b.bytes()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_tokens_are_unique_and_well_formed() {
        let tokens: HashSet<String> = (0..500).map(|_| generate_token()).collect();
        assert_eq!(tokens.len(), 500);
        assert!(tokens.iter().all(|t| looks_like_token(t)));
    }

    #[test]
    fn test_session_hash_is_deterministic() {
        assert_eq!(hash_session_token("abc"), hash_session_token("abc"));
        assert_ne!(hash_session_token("abc"), hash_session_token("abd"));
    }

    #[test]
    fn test_looks_like_token() {
        assert!(!looks_like_token(""));
        assert!(!looks_like_token("short"));
        assert!(!looks_like_token(&"a".repeat(TOKEN_LENGTH - 1)));
        assert!(!looks_like_token(&format!("{}-", "a".repeat(TOKEN_LENGTH - 1))));
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq("digest", "digest"));
        assert!(!constant_time_eq("digest", "digesT"));
        assert!(!constant_time_eq("digest", "digest2"));
        assert!(constant_time_eq("", ""));
    }
}

/// Argon2id password hashing
///
/// Parameters follow the OWASP minimum for Argon2id: 19 MiB of memory,
/// 2 passes, 1 lane. Hashes are stored in PHC string format so the
/// parameters travel with them and can be raised later without a migration.
///
/// # Example
///
/// ```
/// use propdesk_shared::auth::password::{hash_password, verify_password};
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let hash = hash_password("Garden-Flat-9")?;
/// assert!(verify_password("Garden-Flat-9", &hash)?);
/// assert!(!verify_password("garden-flat-9", &hash)?);
/// # Ok(())
/// # }
/// ```

use std::sync::OnceLock;

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, ParamsBuilder, Version,
};

pub const MIN_PASSWORD_LENGTH: usize = 8;

#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    #[error("failed to hash password: {0}")]
    Hash(String),

    #[error("stored password hash is malformed: {0}")]
    InvalidHash(String),

    #[error("failed to verify password: {0}")]
    Verify(String),
}

fn hasher() -> Result<Argon2<'static>, PasswordError> {
    let params = ParamsBuilder::new()
        .m_cost(19 * 1024)
        .t_cost(2)
        .p_cost(1)
        .output_len(32)
        .build()
        .map_err(|e| PasswordError::Hash(e.to_string()))?;

    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = hasher()?
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| PasswordError::Hash(e.to_string()))?;

    Ok(hash.to_string())
}

/// `Ok(false)` on mismatch; `Err` only when the stored hash is unusable
pub fn verify_password(password: &str, hash: &str) -> Result<bool, PasswordError> {
    let parsed = PasswordHash::new(hash).map_err(|e| PasswordError::InvalidHash(e.to_string()))?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(PasswordError::Verify(e.to_string())),
    }
}

/// Runs a full verification against a throwaway hash and reports no match
///
/// Called when a login names no account, so that answer costs as much as a
/// wrong password.
pub fn verify_dummy(password: &str) -> bool {
    static DUMMY_HASH: OnceLock<Option<String>> = OnceLock::new();

    let hash = DUMMY_HASH.get_or_init(|| hash_password("no-such-account-0").ok());
    if let Some(hash) = hash {
        let _ = verify_password(password, hash);
    }
    false
}

/// At least eight characters with a letter and a digit
pub fn validate_password_strength(password: &str) -> Result<(), String> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(format!(
            "password must be at least {} characters long",
            MIN_PASSWORD_LENGTH
        ));
    }
    if !password.chars().any(|c| c.is_alphabetic()) {
        return Err("password must contain a letter".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err("password must contain a digit".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_argon2id_phc() {
        let hash = hash_password("tenant-pass-1").unwrap();
        assert!(hash.starts_with("$argon2id$v=19$"));
        assert!(hash.contains("m=19456,t=2,p=1"));
    }

    #[test]
    fn test_same_password_gets_fresh_salt() {
        let a = hash_password("same-pass-1").unwrap();
        let b = hash_password("same-pass-1").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_dummy_verification_never_matches() {
        assert!(!verify_dummy("no-such-account-0"));
        assert!(!verify_dummy("anything"));
    }

    #[test]
    fn test_verify() {
        let hash = hash_password("correct-horse-7").unwrap();
        assert!(verify_password("correct-horse-7", &hash).unwrap());
        assert!(!verify_password("wrong-horse-7", &hash).unwrap());
        assert!(!verify_password("", &hash).unwrap());
    }

    #[test]
    fn test_verify_rejects_garbage_hash() {
        assert!(matches!(
            verify_password("x", "not-a-phc-string"),
            Err(PasswordError::InvalidHash(_))
        ));
    }

    #[test]
    fn test_strength_rules() {
        assert!(validate_password_strength("flat4rent").is_ok());
        assert!(validate_password_strength("sh0rt").unwrap_err().contains("8 characters"));
        assert!(validate_password_strength("12345678").unwrap_err().contains("letter"));
        assert!(validate_password_strength("onlyletters").unwrap_err().contains("digit"));
    }
}

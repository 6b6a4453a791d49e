/// Bearer access tokens
///
/// Issued after a successful login-OTP exchange. Tokens are HS256-signed and
/// carry the role and verification flag at issue time so clients can render
/// without another round-trip; the server still re-reads both from storage
/// before any authorization decision.
///
/// # Example
///
/// ```
/// use chrono::Duration;
/// use propdesk_shared::auth::jwt::{create_access_token, validate_access_token, Claims};
/// use propdesk_shared::models::user::Role;
/// use uuid::Uuid;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let secret = "0123456789abcdef0123456789abcdef";
/// let claims = Claims::new(Uuid::new_v4(), Role::Manager, true, Duration::minutes(30));
/// let token = create_access_token(&claims, secret)?;
///
/// let validated = validate_access_token(&token, secret)?;
/// assert_eq!(validated.role, Role::Manager);
/// # Ok(())
/// # }
/// ```

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::user::Role;

pub const ISSUER: &str = "propdesk";

#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("failed to sign token: {0}")]
    Create(String),

    #[error("token has expired")]
    Expired,

    #[error("invalid token: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: Uuid,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
    pub nbf: i64,

    pub role: Role,
    pub verified: bool,
}

impl Claims {
    pub fn new(user_id: Uuid, role: Role, verified: bool, ttl: Duration) -> Self {
        let now = Utc::now().timestamp();
        Self {
            sub: user_id,
            iss: ISSUER.to_string(),
            iat: now,
            exp: now + ttl.num_seconds(),
            nbf: now,
            role,
            verified,
        }
    }
}

pub fn create_access_token(claims: &Claims, secret: &str) -> Result<String, JwtError> {
    encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| JwtError::Create(e.to_string()))
}

/// Checks signature, issuer, `exp` and `nbf`
pub fn validate_access_token(token: &str, secret: &str) -> Result<Claims, JwtError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[ISSUER]);
    validation.validate_nbf = true;
    validation.leeway = 0;

    decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => JwtError::Expired,
            _ => JwtError::Invalid(e.to_string()),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret-that-is-at-least-32-bytes";

    #[test]
    fn test_roundtrip_keeps_identity() {
        let user_id = Uuid::new_v4();
        let claims = Claims::new(user_id, Role::Owner, false, Duration::minutes(5));
        let token = create_access_token(&claims, SECRET).unwrap();

        let validated = validate_access_token(&token, SECRET).unwrap();
        assert_eq!(validated.sub, user_id);
        assert_eq!(validated.role, Role::Owner);
        assert!(!validated.verified);
        assert_eq!(validated.iss, ISSUER);
    }

    #[test]
    fn test_wrong_secret_is_invalid() {
        let claims = Claims::new(Uuid::new_v4(), Role::Tenant, true, Duration::minutes(5));
        let token = create_access_token(&claims, SECRET).unwrap();

        assert!(matches!(
            validate_access_token(&token, "another-secret-of-sufficient-length"),
            Err(JwtError::Invalid(_))
        ));
    }

    #[test]
    fn test_expired_token() {
        let claims = Claims::new(Uuid::new_v4(), Role::Vendor, true, Duration::minutes(-5));
        let token = create_access_token(&claims, SECRET).unwrap();

        assert!(matches!(validate_access_token(&token, SECRET), Err(JwtError::Expired)));
    }

    #[test]
    fn test_foreign_issuer_rejected() {
        let mut claims = Claims::new(Uuid::new_v4(), Role::Owner, true, Duration::minutes(5));
        claims.iss = "someone-else".to_string();
        let token = create_access_token(&claims, SECRET).unwrap();

        assert!(validate_access_token(&token, SECRET).is_err());
    }

    #[test]
    fn test_garbage_token() {
        assert!(validate_access_token("not.a.jwt", SECRET).is_err());
    }
}

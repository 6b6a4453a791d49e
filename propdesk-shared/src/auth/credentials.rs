/// Credential engine: OTP codes, activation tokens, vendor-link tokens
///
/// Raw codes and tokens only ever leave this module towards an email or a
/// response body. What gets stored is an HMAC-SHA256 digest keyed by the
/// credential secret, with a purpose label mixed in so an activation digest
/// can never be replayed as a vendor digest or an OTP.
///
/// Every validation failure surfaces as
/// [`CoreError::InvalidOrExpiredCredential`]; callers cannot tell a wrong code
/// from an expired one.
///
/// Check-and-clear happens in the [`Store`] (`consume_user_otp`,
/// `redeem_invitation`, guarded issue transitions), so two concurrent
/// redemptions of one credential succeed at most once.

use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use rand::{rngs::OsRng, Rng};
use sha2::Sha256;
use uuid::Uuid;

use super::token::{constant_time_eq, generate_token, looks_like_token};
use crate::error::{CoreError, CoreResult};
use crate::models::user::User;
use crate::store::Store;

type HmacSha256 = Hmac<Sha256>;

pub const MIN_SECRET_LENGTH: usize = 32;
pub const MIN_OTP_LENGTH: usize = 4;

/// Expiry and format policy, loaded once from configuration
#[derive(Debug, Clone)]
pub struct CredentialPolicy {
    pub secret: String,
    pub otp_ttl: Duration,
    pub otp_length: usize,
    pub activation_ttl: Duration,
}

impl CredentialPolicy {
    /// Defaults: 6-digit codes valid for 10 minutes, invitations for 7 days
    pub fn with_secret(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            otp_ttl: Duration::minutes(10),
            otp_length: 6,
            activation_ttl: Duration::hours(168),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Purpose {
    Otp,
    Activation,
    VendorLink,
}

impl Purpose {
    fn label(self) -> &'static [u8] {
        match self {
            Purpose::Otp => b"otp",
            Purpose::Activation => b"activation",
            Purpose::VendorLink => b"vendor-link",
        }
    }
}

/// Raw token for the outgoing link, plus the digest to persist
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub raw: String,
    pub digest: String,
}

pub struct CredentialEngine {
    mac: HmacSha256,
    otp_ttl: Duration,
    otp_length: usize,
    activation_ttl: Duration,
}

impl CredentialEngine {
    pub fn new(policy: CredentialPolicy) -> CoreResult<Self> {
        if policy.secret.len() < MIN_SECRET_LENGTH {
            return Err(CoreError::Validation(format!(
                "credential secret must be at least {} characters",
                MIN_SECRET_LENGTH
            )));
        }
        if policy.otp_length < MIN_OTP_LENGTH {
            return Err(CoreError::Validation(format!(
                "OTP length must be at least {}",
                MIN_OTP_LENGTH
            )));
        }
        if policy.otp_ttl <= Duration::zero() || policy.activation_ttl <= Duration::zero() {
            return Err(CoreError::Validation("credential lifetimes must be positive".into()));
        }

        let mac = HmacSha256::new_from_slice(policy.secret.as_bytes())
            .map_err(|e| CoreError::Internal(format!("credential key rejected: {}", e)))?;

        Ok(Self {
            mac,
            otp_ttl: policy.otp_ttl,
            otp_length: policy.otp_length,
            activation_ttl: policy.activation_ttl,
        })
    }

    pub fn otp_ttl(&self) -> Duration {
        self.otp_ttl
    }

    pub fn otp_length(&self) -> usize {
        self.otp_length
    }

    fn digest(&self, purpose: Purpose, parts: &[&[u8]]) -> String {
        let mut mac = self.mac.clone();
        mac.update(purpose.label());
        for part in parts {
            mac.update(b":");
            mac.update(part);
        }
        hex::encode(mac.finalize().into_bytes())
    }

    /// OTP digests are bound to the user so a code cannot cross accounts
    pub fn otp_digest(&self, user_id: Uuid, code: &str) -> String {
        self.digest(Purpose::Otp, &[user_id.as_bytes(), code.as_bytes()])
    }

    pub fn activation_digest(&self, raw: &str) -> String {
        self.digest(Purpose::Activation, &[raw.as_bytes()])
    }

    /// Vendor digests are bound to the issue id; a token for one issue never
    /// matches another
    pub fn vendor_digest(&self, issue_id: Uuid, raw: &str) -> String {
        self.digest(Purpose::VendorLink, &[issue_id.as_bytes(), raw.as_bytes()])
    }

    /// Fixed-length numeric code from the OS RNG
    pub fn generate_otp(&self) -> String {
        let mut rng = OsRng;
        (0..self.otp_length)
            .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
            .collect()
    }

    fn is_well_formed_otp(&self, code: &str) -> bool {
        code.len() == self.otp_length && code.bytes().all(|b| b.is_ascii_digit())
    }

    /// Stores a fresh code (replacing any previous one) and returns it for delivery
    pub async fn issue_otp(&self, store: &dyn Store, user_id: Uuid, now: DateTime<Utc>) -> CoreResult<String> {
        let code = self.generate_otp();
        let stored = store
            .set_user_otp(user_id, &self.otp_digest(user_id, &code), now + self.otp_ttl)
            .await?;

        if !stored {
            return Err(CoreError::NotFound("user"));
        }
        Ok(code)
    }

    /// Pure check against a loaded user; valid while `now <= expiry`
    pub fn check_otp(&self, user: &User, code: &str, now: DateTime<Utc>) -> bool {
        if !self.is_well_formed_otp(code) {
            return false;
        }
        match (&user.otp_hash, user.otp_expires_at) {
            (Some(stored), Some(expiry)) => {
                now <= expiry && constant_time_eq(stored, &self.otp_digest(user.id, code))
            }
            _ => false,
        }
    }

    /// Atomically checks and clears the stored code
    ///
    /// A mismatch leaves the code in place so the user can retry until it
    /// expires.
    pub async fn verify_otp(
        &self,
        store: &dyn Store,
        user_id: Uuid,
        code: &str,
        now: DateTime<Utc>,
    ) -> CoreResult<()> {
        if !self.is_well_formed_otp(code) {
            return Err(CoreError::InvalidOrExpiredCredential);
        }

        let consumed = store
            .consume_user_otp(user_id, &self.otp_digest(user_id, code), now)
            .await?;

        if consumed {
            Ok(())
        } else {
            Err(CoreError::InvalidOrExpiredCredential)
        }
    }

    /// New activation token and the instant it stops being redeemable
    pub fn issue_activation_token(&self, now: DateTime<Utc>) -> (IssuedToken, DateTime<Utc>) {
        let raw = generate_token();
        let digest = self.activation_digest(&raw);
        (IssuedToken { raw, digest }, now + self.activation_ttl)
    }

    /// Digest to look an activation up by, or `None` for a malformed token
    pub fn activation_lookup(&self, raw: &str) -> Option<String> {
        looks_like_token(raw).then(|| self.activation_digest(raw))
    }

    pub fn issue_vendor_token(&self, issue_id: Uuid) -> IssuedToken {
        let raw = generate_token();
        let digest = self.vendor_digest(issue_id, &raw);
        IssuedToken { raw, digest }
    }

    /// Whether `raw` is the live vendor token for `issue_id`
    pub fn vendor_token_matches(&self, issue_id: Uuid, raw: &str, stored: Option<&str>) -> bool {
        match stored {
            Some(stored) if looks_like_token(raw) => {
                constant_time_eq(stored, &self.vendor_digest(issue_id, raw))
            }
            _ => false,
        }
    }
}

/// Session and identity resolution
///
/// An inbound request reaches the engine through one of two channels that
/// are never conflated:
///
/// - **Session-bound**: an opaque session cookie (or a bearer access token
///   from the OTP login) resolves to a [`SessionIdentity`]: user id, role and
///   verification flag, re-read from the user record on every request.
/// - **Token-bound**: a vendor-response link carries a [`VendorCapability`],
///   which is not a user at all. It proves "may act as the assigned vendor on
///   issue X" and nothing else.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::authorization::{Actor, Tenancy};
use super::jwt::{create_access_token, validate_access_token, Claims};
use super::token::{generate_token, hash_session_token, looks_like_token};
use crate::error::{CoreError, CoreResult};
use crate::models::session::NewSession;
use crate::models::user::{Role, User};
use crate::store::Store;

/// Typed session identity handed to every workflow and authorization call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionIdentity {
    pub user_id: Uuid,
    pub role: Role,
    pub verified: bool,
}

impl SessionIdentity {
    pub fn from_user(user: &User) -> Self {
        Self {
            user_id: user.id,
            role: user.role,
            verified: user.is_verified,
        }
    }
}

/// Bearer of a vendor-response link for exactly one issue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VendorCapability {
    pub issue_id: Uuid,
    pub token: String,
}

/// Credentials found on a request, before any lookup
#[derive(Debug, Clone, Default)]
pub struct PresentedCredentials {
    pub session_token: Option<String>,
    pub bearer_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SessionPolicy {
    pub session_ttl: Duration,
    pub jwt_secret: String,
    pub access_token_ttl: Duration,
}

/// Freshly opened session; `token` goes into the cookie and nowhere else
#[derive(Debug, Clone)]
pub struct StartedSession {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub identity: SessionIdentity,
}

#[derive(Debug, Clone, Serialize)]
pub struct AccessToken {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
}

pub struct IdentityResolver {
    store: Arc<dyn Store>,
    policy: SessionPolicy,
}

impl IdentityResolver {
    pub fn new(store: Arc<dyn Store>, policy: SessionPolicy) -> Self {
        Self { store, policy }
    }

    pub fn session_ttl(&self) -> Duration {
        self.policy.session_ttl
    }

    pub async fn start_session(&self, user: &User, now: DateTime<Utc>) -> CoreResult<StartedSession> {
        let token = generate_token();
        let session = self
            .store
            .create_session(NewSession {
                user_id: user.id,
                token_hash: hash_session_token(&token),
                expires_at: now + self.policy.session_ttl,
            })
            .await?;

        tracing::info!(user_id = %user.id, role = user.role.as_str(), "Session started");

        Ok(StartedSession {
            token,
            expires_at: session.expires_at,
            identity: SessionIdentity::from_user(user),
        })
    }

    /// Idempotent; an unknown token is not an error
    pub async fn end_session(&self, token: &str) -> CoreResult<()> {
        if looks_like_token(token) && self.store.delete_session(&hash_session_token(token)).await? {
            tracing::info!("Session ended");
        }
        Ok(())
    }

    pub async fn resolve_session(&self, token: &str, now: DateTime<Utc>) -> CoreResult<SessionIdentity> {
        if !looks_like_token(token) {
            return Err(CoreError::Unauthenticated);
        }

        let session = self
            .store
            .find_live_session(&hash_session_token(token), now)
            .await?
            .ok_or(CoreError::Unauthenticated)?;

        self.identity_of(session.user_id).await
    }

    pub fn issue_access_token(&self, user: &User) -> CoreResult<AccessToken> {
        let claims = Claims::new(user.id, user.role, user.is_verified, self.policy.access_token_ttl);
        Ok(AccessToken {
            access_token: create_access_token(&claims, &self.policy.jwt_secret)?,
            token_type: "Bearer",
            expires_in: self.policy.access_token_ttl.num_seconds(),
        })
    }

    /// Access tokens are stateless. Ending sessions, as a password reset does,
    /// leaves an issued token usable until its `access_token_ttl` runs out.
    pub async fn resolve_bearer(&self, token: &str) -> CoreResult<SessionIdentity> {
        let claims = validate_access_token(token, &self.policy.jwt_secret).map_err(|e| {
            tracing::debug!(error = %e, "Bearer token rejected");
            CoreError::Unauthenticated
        })?;

        self.identity_of(claims.sub).await
    }

    /// Session cookie first, then bearer; `None` when neither resolves
    pub async fn resolve(
        &self,
        presented: &PresentedCredentials,
        now: DateTime<Utc>,
    ) -> CoreResult<Option<SessionIdentity>> {
        if let Some(token) = presented.session_token.as_deref() {
            match self.resolve_session(token, now).await {
                Ok(identity) => return Ok(Some(identity)),
                Err(CoreError::Unauthenticated) => {}
                Err(other) => return Err(other),
            }
        }

        if let Some(token) = presented.bearer_token.as_deref() {
            match self.resolve_bearer(token).await {
                Ok(identity) => return Ok(Some(identity)),
                Err(CoreError::Unauthenticated) => {}
                Err(other) => return Err(other),
            }
        }

        Ok(None)
    }

    /// Loads the acting user with their tenancy, for authorization
    pub async fn actor(&self, identity: &SessionIdentity) -> CoreResult<(Actor, User)> {
        let user = self
            .store
            .find_user(identity.user_id)
            .await?
            .ok_or(CoreError::Unauthenticated)?;

        Ok((actor_of(&user), user))
    }

    async fn identity_of(&self, user_id: Uuid) -> CoreResult<SessionIdentity> {
        let user = self
            .store
            .find_user(user_id)
            .await?
            .ok_or(CoreError::Unauthenticated)?;

        Ok(SessionIdentity::from_user(&user))
    }
}

pub fn actor_of(user: &User) -> Actor {
    Actor {
        user_id: user.id,
        role: user.role,
        verified: user.is_verified,
        tenancy: match (user.role, user.property_id) {
            (Role::Tenant, Some(property_id)) => Some(Tenancy {
                property_id,
                floor_id: user.floor_id,
            }),
            _ => None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::NewUser;
    use crate::store::memory::MemoryStore;

    fn resolver(store: Arc<dyn Store>) -> IdentityResolver {
        IdentityResolver::new(
            store,
            SessionPolicy {
                session_ttl: Duration::hours(12),
                jwt_secret: "jwt-secret-for-tests-0123456789abcdef".into(),
                access_token_ttl: Duration::minutes(30),
            },
        )
    }

    async fn user(store: &MemoryStore, role: Role) -> User {
        store
            .create_user(NewUser {
                username: format!("{}-user", role),
                email: format!("{}@example.com", role),
                role,
                is_verified: true,
                ..NewUser::default()
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_session_roundtrip_and_logout() {
        let store = Arc::new(MemoryStore::new());
        let resolver = resolver(store.clone());
        let owner = user(&store, Role::Owner).await;
        let now = Utc::now();

        let started = resolver.start_session(&owner, now).await.unwrap();
        let identity = resolver.resolve_session(&started.token, now).await.unwrap();
        assert_eq!(identity.user_id, owner.id);
        assert_eq!(identity.role, Role::Owner);
        assert!(identity.verified);

        resolver.end_session(&started.token).await.unwrap();
        assert!(matches!(
            resolver.resolve_session(&started.token, now).await,
            Err(CoreError::Unauthenticated)
        ));
    }

    #[tokio::test]
    async fn test_session_expires() {
        let store = Arc::new(MemoryStore::new());
        let resolver = resolver(store.clone());
        let owner = user(&store, Role::Owner).await;
        let now = Utc::now();

        let started = resolver.start_session(&owner, now).await.unwrap();
        let later = started.expires_at + Duration::seconds(1);
        assert!(resolver.resolve_session(&started.token, later).await.is_err());
    }

    #[tokio::test]
    async fn test_bearer_resolves_current_user_state() {
        let store = Arc::new(MemoryStore::new());
        let resolver = resolver(store.clone());
        let vendor = user(&store, Role::Vendor).await;

        let token = resolver.issue_access_token(&vendor).unwrap();
        assert_eq!(token.expires_in, 30 * 60);

        let identity = resolver.resolve_bearer(&token.access_token).await.unwrap();
        assert_eq!(identity.user_id, vendor.id);

        store.delete_user(vendor.id).await.unwrap();
        assert!(matches!(
            resolver.resolve_bearer(&token.access_token).await,
            Err(CoreError::Unauthenticated)
        ));
    }

    #[tokio::test]
    async fn test_resolve_prefers_cookie_and_ignores_garbage() {
        let store = Arc::new(MemoryStore::new());
        let resolver = resolver(store.clone());
        let owner = user(&store, Role::Owner).await;
        let manager = user(&store, Role::Manager).await;
        let now = Utc::now();

        let session = resolver.start_session(&owner, now).await.unwrap();
        let bearer = resolver.issue_access_token(&manager).unwrap();

        let both = PresentedCredentials {
            session_token: Some(session.token.clone()),
            bearer_token: Some(bearer.access_token.clone()),
        };
        assert_eq!(resolver.resolve(&both, now).await.unwrap().unwrap().user_id, owner.id);

        let stale_cookie = PresentedCredentials {
            session_token: Some("not-a-session".into()),
            bearer_token: Some(bearer.access_token),
        };
        assert_eq!(
            resolver.resolve(&stale_cookie, now).await.unwrap().unwrap().user_id,
            manager.id
        );

        assert!(resolver
            .resolve(&PresentedCredentials::default(), now)
            .await
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_actor_tenancy_only_for_tenants() {
        let property_id = Uuid::new_v4();
        let mut tenant = User::from_new(
            NewUser {
                username: "t".into(),
                email: "t@example.com".into(),
                role: Role::Tenant,
                ..NewUser::default()
            },
            Utc::now(),
        );
        tenant.property_id = Some(property_id);

        let actor = actor_of(&tenant);
        assert_eq!(actor.tenancy.map(|t| t.property_id), Some(property_id));

        let mut vendor = tenant.clone();
        vendor.role = Role::Vendor;
        assert!(actor_of(&vendor).tenancy.is_none());
    }
}

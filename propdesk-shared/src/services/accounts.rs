/// Account lifecycle: registration, login, OTP flows, password reset, deletion
///
/// Requests that would email an OTP answer the same way whether or not the
/// address belongs to an account.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::authorization::{authorize, Action, Actor};
use crate::auth::credentials::CredentialEngine;
use crate::auth::password::{hash_password, validate_password_strength, verify_dummy, verify_password};
use crate::auth::session::{AccessToken, IdentityResolver, StartedSession};
use crate::email::{deliver, messages, EmailSender};
use crate::error::{CoreError, CoreResult, DenyReason};
use crate::hierarchy::Hierarchy;
use crate::models::user::{NewUser, Role, User};
use crate::store::{Store, UserDeletion};

#[derive(Debug, Clone, Deserialize)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub password: String,
    pub role: Role,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub service_type: Option<String>,
}

pub struct Accounts {
    store: Arc<dyn Store>,
    credentials: Arc<CredentialEngine>,
    identity: Arc<IdentityResolver>,
    mailer: Arc<dyn EmailSender>,
}

impl Accounts {
    pub fn new(
        store: Arc<dyn Store>,
        credentials: Arc<CredentialEngine>,
        identity: Arc<IdentityResolver>,
        mailer: Arc<dyn EmailSender>,
    ) -> Self {
        Self {
            store,
            credentials,
            identity,
            mailer,
        }
    }

    /// Owners and managers start unverified and get a registration code;
    /// vendors can log in straight away. Tenants only join by invitation.
    pub async fn register(&self, data: Registration, now: DateTime<Utc>) -> CoreResult<User> {
        if data.role == Role::Tenant {
            return Err(CoreError::Validation(
                "tenant accounts are created through an invitation".into(),
            ));
        }
        validate_password_strength(&data.password).map_err(CoreError::Validation)?;

        let user = self
            .store
            .create_user(NewUser {
                username: data.username.trim().to_string(),
                email: data.email.trim().to_lowercase(),
                name: data.name,
                phone: data.phone,
                service_type: data.service_type,
                password_hash: hash_password(&data.password)?,
                role: data.role,
                is_verified: !data.role.requires_verification(),
                assignment: None,
            })
            .await?;

        tracing::info!(user_id = %user.id, role = user.role.as_str(), "User registered");

        if !user.is_verified {
            self.send_otp(&user, "registration", now).await?;
        }
        Ok(user)
    }

    pub async fn verify_registration(&self, email: &str, code: &str, now: DateTime<Utc>) -> CoreResult<User> {
        let user = self
            .store
            .find_user_by_email(email)
            .await?
            .ok_or(CoreError::InvalidOrExpiredCredential)?;

        self.credentials
            .verify_otp(self.store.as_ref(), user.id, code, now)
            .await
            .map_err(|e| {
                tracing::warn!(user_id = %user.id, "Registration code rejected");
                e
            })?;
        self.store.mark_user_verified(user.id).await?;

        tracing::info!(user_id = %user.id, "Email verified");
        self.reload(user.id).await
    }

    /// Re-issues the registration code; silent for unknown or verified accounts
    pub async fn resend_otp(&self, email: &str, now: DateTime<Utc>) -> CoreResult<()> {
        match self.store.find_user_by_email(email).await? {
            Some(user) if !user.is_verified => self.send_otp(&user, "registration", now).await,
            _ => Ok(()),
        }
    }

    /// Password login opening a server-side session
    pub async fn login(&self, login: &str, password: &str, now: DateTime<Utc>) -> CoreResult<StartedSession> {
        let Some(user) = self.store.find_user_by_login(login.trim()).await? else {
            verify_dummy(password);
            return Err(CoreError::Unauthenticated);
        };

        if !verify_password(password, &user.password_hash)? {
            tracing::warn!(user_id = %user.id, "Login failed: wrong password");
            return Err(CoreError::Unauthenticated);
        }
        if user.role.requires_verification() && !user.is_verified {
            return Err(CoreError::Forbidden(DenyReason::Unverified));
        }

        self.identity.start_session(&user, now).await
    }

    pub async fn logout(&self, session_token: &str) -> CoreResult<()> {
        self.identity.end_session(session_token).await
    }

    /// Emails a login code to an account that may log in
    pub async fn request_login_otp(&self, email: &str, now: DateTime<Utc>) -> CoreResult<()> {
        match self.store.find_user_by_email(email).await? {
            Some(user) if user.is_verified || !user.role.requires_verification() => {
                self.send_otp(&user, "login", now).await
            }
            _ => Ok(()),
        }
    }

    pub async fn verify_login_otp(&self, email: &str, code: &str, now: DateTime<Utc>) -> CoreResult<AccessToken> {
        let user = self
            .store
            .find_user_by_email(email)
            .await?
            .ok_or(CoreError::InvalidOrExpiredCredential)?;

        if user.role.requires_verification() && !user.is_verified {
            return Err(CoreError::InvalidOrExpiredCredential);
        }
        self.credentials
            .verify_otp(self.store.as_ref(), user.id, code, now)
            .await?;

        tracing::info!(user_id = %user.id, "OTP login succeeded");
        self.identity.issue_access_token(&user)
    }

    pub async fn forgot_password(&self, email: &str, now: DateTime<Utc>) -> CoreResult<()> {
        match self.store.find_user_by_email(email).await? {
            Some(user) => self.send_otp(&user, "password reset", now).await,
            None => Ok(()),
        }
    }

    /// Sets a new password after a reset code; also confirms the email and
    /// ends every open session. Bearer tokens already issued are not revoked
    /// and run until they expire.
    pub async fn reset_password(
        &self,
        email: &str,
        code: &str,
        new_password: &str,
        now: DateTime<Utc>,
    ) -> CoreResult<()> {
        validate_password_strength(new_password).map_err(CoreError::Validation)?;

        let user = self
            .store
            .find_user_by_email(email)
            .await?
            .ok_or(CoreError::InvalidOrExpiredCredential)?;

        self.credentials
            .verify_otp(self.store.as_ref(), user.id, code, now)
            .await?;

        self.store
            .update_user_password(user.id, &hash_password(new_password)?)
            .await?;
        self.store.mark_user_verified(user.id).await?;
        let ended = self.store.delete_user_sessions(user.id).await?;

        tracing::info!(user_id = %user.id, sessions_ended = ended, "Password reset");
        Ok(())
    }

    /// Self-service, or an owner removing a tenant of theirs
    pub async fn delete_user(&self, actor: &Actor, user_id: Uuid) -> CoreResult<()> {
        let target = self
            .store
            .find_user(user_id)
            .await?
            .ok_or(CoreError::NotFound("user"))?;

        let resource = Hierarchy::new(self.store.as_ref()).account(&target).await?;
        authorize(actor, Action::Delete, &resource)?;

        match self.store.delete_user(user_id).await? {
            UserDeletion::Deleted => {
                tracing::info!(user_id = %user_id, by = %actor.user_id, "User deleted");
                Ok(())
            }
            UserDeletion::NotFound => Err(CoreError::NotFound("user")),
            UserDeletion::StillResponsible => Err(CoreError::Conflict(
                "user still owns or manages a property".into(),
            )),
        }
    }

    async fn send_otp(&self, user: &User, purpose: &str, now: DateTime<Utc>) -> CoreResult<()> {
        let code = self.credentials.issue_otp(self.store.as_ref(), user.id, now).await?;
        let message = messages::otp(
            &user.email,
            &code,
            purpose,
            self.credentials.otp_ttl().num_minutes(),
        );
        deliver(self.mailer.as_ref(), &message).await;

        tracing::info!(user_id = %user.id, purpose, "OTP issued");
        Ok(())
    }

    async fn reload(&self, user_id: Uuid) -> CoreResult<User> {
        self.store
            .find_user(user_id)
            .await?
            .ok_or(CoreError::NotFound("user"))
    }
}

/// Tenant invitations
///
/// An owner invites someone by email; the activation link carries a
/// single-use token. Redeeming it creates the tenant account scoped to the
/// invited property and opens a session in the same step.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::authorization::{authorize, decide, Action, Actor, Resource};
use crate::auth::credentials::CredentialEngine;
use crate::auth::password::{hash_password, validate_password_strength};
use crate::auth::session::{IdentityResolver, StartedSession};
use crate::email::{deliver, messages, EmailSender, LinkBuilder};
use crate::error::{CoreError, CoreResult};
use crate::hierarchy::{scope_of, Hierarchy};
use crate::models::{
    activity::NewActivity,
    pending_tenant::{NewPendingTenant, PendingTenant},
    user::{NewUser, User},
};
use crate::store::Store;

#[derive(Debug, Clone, Deserialize)]
pub struct Invite {
    pub property_id: Uuid,
    pub floor_id: Option<Uuid>,
    pub name: String,
    pub email: String,
    pub flat_no: Option<String>,
    pub room_no: Option<String>,
}

/// What the activation form is pre-filled with
#[derive(Debug, Clone, Serialize)]
pub struct InvitationPreview {
    pub email: String,
    pub name: String,
    pub property_name: String,
    pub flat_no: Option<String>,
    pub room_no: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Activation {
    /// Defaults to the invited email
    pub username: Option<String>,
    pub name: String,
    pub phone: Option<String>,
    pub password: String,
    pub confirm_password: String,
}

pub struct Invitations {
    store: Arc<dyn Store>,
    credentials: Arc<CredentialEngine>,
    identity: Arc<IdentityResolver>,
    mailer: Arc<dyn EmailSender>,
    links: LinkBuilder,
}

impl Invitations {
    pub fn new(
        store: Arc<dyn Store>,
        credentials: Arc<CredentialEngine>,
        identity: Arc<IdentityResolver>,
        mailer: Arc<dyn EmailSender>,
        links: LinkBuilder,
    ) -> Self {
        Self {
            store,
            credentials,
            identity,
            mailer,
            links,
        }
    }

    pub async fn invite(&self, actor: &Actor, invite: Invite, now: DateTime<Utc>) -> CoreResult<PendingTenant> {
        let hierarchy = Hierarchy::new(self.store.as_ref());
        let (property, resource) = hierarchy.property(invite.property_id).await?;
        authorize(actor, Action::InviteTenant, &resource)?;

        if let Some(floor_id) = invite.floor_id {
            let (floor, _) = hierarchy.floor(floor_id).await?;
            if floor.property_id != property.id {
                return Err(CoreError::Validation("floor does not belong to the property".into()));
            }
        }

        let email = invite.email.trim().to_lowercase();
        if self.store.find_user_by_email(&email).await?.is_some() {
            return Err(CoreError::Conflict("email already registered".into()));
        }
        if self.store.find_pending_tenant_by_email(&email).await?.is_some() {
            return Err(CoreError::Conflict("an invitation for this email already exists".into()));
        }

        let (token, expires_at) = self.credentials.issue_activation_token(now);
        let pending = self
            .store
            .create_pending_tenant(NewPendingTenant {
                name: invite.name.trim().to_string(),
                email,
                property_id: property.id,
                floor_id: invite.floor_id,
                flat_no: invite.flat_no,
                room_no: invite.room_no,
                invited_by: actor.user_id,
                activation_token_hash: token.digest,
                expires_at,
            })
            .await?;

        tracing::info!(invitation_id = %pending.id, property_id = %property.id, by = %actor.user_id, "Tenant invited");
        self.record(actor.user_id, property.id, format!("Tenant invited: {}", pending.name))
            .await;

        let link = self.links.activation(&token.raw);
        deliver(
            self.mailer.as_ref(),
            &messages::activation(&pending.email, &pending.name, &property.name, &link),
        )
        .await;

        Ok(pending)
    }

    pub async fn preview(&self, token: &str, now: DateTime<Utc>) -> CoreResult<InvitationPreview> {
        let pending = self.redeemable(token, now).await?;
        let property_name = self
            .store
            .find_property(pending.property_id)
            .await?
            .map(|p| p.name)
            .unwrap_or_default();

        Ok(InvitationPreview {
            email: pending.email,
            name: pending.name,
            property_name,
            flat_no: pending.flat_no,
            room_no: pending.room_no,
        })
    }

    /// Redeems the token, creates the tenant and logs them in
    ///
    /// Concurrent redemptions of one token yield exactly one account.
    pub async fn activate(
        &self,
        token: &str,
        activation: Activation,
        now: DateTime<Utc>,
    ) -> CoreResult<(User, StartedSession)> {
        if activation.password != activation.confirm_password {
            return Err(CoreError::Validation("passwords do not match".into()));
        }
        validate_password_strength(&activation.password).map_err(CoreError::Validation)?;

        let pending = self.redeemable(token, now).await?;
        let digest = self
            .credentials
            .activation_lookup(token)
            .ok_or(CoreError::InvalidOrExpiredCredential)?;

        let username = activation
            .username
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| pending.email.clone());

        let account = NewUser {
            username,
            name: Some(activation.name.trim().to_string()),
            phone: activation.phone,
            password_hash: hash_password(&activation.password)?,
            ..NewUser::default()
        };

        let (invitation, user) = self
            .store
            .redeem_invitation(&digest, now, account)
            .await?
            .ok_or_else(|| {
                tracing::warn!(invitation_id = %pending.id, "Activation lost to a concurrent redemption");
                CoreError::InvalidOrExpiredCredential
            })?;

        tracing::info!(user_id = %user.id, property_id = %invitation.property_id, "Tenant activated");
        self.record(user.id, invitation.property_id, format!("Tenant activated: {}", invitation.name))
            .await;

        let session = self.identity.start_session(&user, now).await?;
        Ok((user, session))
    }

    /// Open invitations on properties the actor may invite to
    pub async fn list(&self, actor: &Actor) -> CoreResult<Vec<PendingTenant>> {
        let ids = self.invitable_property_ids(actor).await?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.store.list_open_invitations(&ids).await?)
    }

    /// Withdraws an open invitation so the email can be invited again
    pub async fn revoke(&self, actor: &Actor, invitation_id: Uuid) -> CoreResult<()> {
        let open = self.list(actor).await?;
        let pending = open
            .into_iter()
            .find(|p| p.id == invitation_id)
            .ok_or(CoreError::NotFound("invitation"))?;

        if !self.store.delete_pending_tenant(pending.id).await? {
            return Err(CoreError::NotFound("invitation"));
        }
        tracing::info!(invitation_id = %pending.id, by = %actor.user_id, "Invitation revoked");
        Ok(())
    }

    async fn redeemable(&self, token: &str, now: DateTime<Utc>) -> CoreResult<PendingTenant> {
        let digest = self
            .credentials
            .activation_lookup(token)
            .ok_or(CoreError::InvalidOrExpiredCredential)?;

        self.store
            .find_redeemable_invitation(&digest, now)
            .await?
            .ok_or(CoreError::InvalidOrExpiredCredential)
    }

    async fn invitable_property_ids(&self, actor: &Actor) -> CoreResult<Vec<Uuid>> {
        let properties = self.store.list_operable_properties(actor.user_id).await?;
        Ok(properties
            .iter()
            .map(scope_of)
            .filter(|scope| decide(actor, Action::InviteTenant, &Resource::Property(*scope)).is_permit())
            .map(|scope| scope.property_id)
            .collect())
    }

    async fn record(&self, user_id: Uuid, property_id: Uuid, action: String) {
        let entry = NewActivity {
            user_id: Some(user_id),
            property_id: Some(property_id),
            action,
        };
        if let Err(e) = self.store.record_activity(entry).await {
            tracing::error!(error = %e, %property_id, "Failed to record activity");
        }
    }
}

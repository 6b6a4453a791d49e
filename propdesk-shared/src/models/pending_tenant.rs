/// Tenant invitations
///
/// An owner invites a tenant by email. The invitation carries the digest of a
/// single-use activation token; redeeming it clears the digest, flips
/// `is_activated` and creates the tenant account in one transaction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use super::user::{NewUser, User};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PendingTenant {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub property_id: Uuid,
    pub floor_id: Option<Uuid>,
    pub flat_no: Option<String>,
    pub room_no: Option<String>,
    pub invited_by: Uuid,

    /// Cleared on redemption
    #[serde(skip_serializing, default)]
    pub activation_token_hash: Option<String>,

    pub is_activated: bool,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub activated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPendingTenant {
    pub name: String,
    pub email: String,
    pub property_id: Uuid,
    pub floor_id: Option<Uuid>,
    pub flat_no: Option<String>,
    pub room_no: Option<String>,
    pub invited_by: Uuid,
    pub activation_token_hash: String,
    pub expires_at: DateTime<Utc>,
}

impl PendingTenant {
    pub fn from_new(data: NewPendingTenant, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: data.name,
            email: data.email,
            property_id: data.property_id,
            floor_id: data.floor_id,
            flat_no: data.flat_no,
            room_no: data.room_no,
            invited_by: data.invited_by,
            activation_token_hash: Some(data.activation_token_hash),
            is_activated: false,
            expires_at: data.expires_at,
            created_at: now,
            activated_at: None,
        }
    }

    /// Whether the invitation can still be redeemed at `now`
    pub fn is_redeemable(&self, now: DateTime<Utc>) -> bool {
        !self.is_activated && self.activation_token_hash.is_some() && now <= self.expires_at
    }

    pub async fn create(pool: &PgPool, data: NewPendingTenant) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, PendingTenant>(
            r#"
            INSERT INTO pending_tenants (name, email, property_id, floor_id, flat_no, room_no,
                                         invited_by, activation_token_hash, expires_at)
            VALUES ($1, LOWER($2), $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(data.name)
        .bind(data.email)
        .bind(data.property_id)
        .bind(data.floor_id)
        .bind(data.flat_no)
        .bind(data.room_no)
        .bind(data.invited_by)
        .bind(data.activation_token_hash)
        .bind(data.expires_at)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, PendingTenant>(
            "SELECT * FROM pending_tenants WHERE email = LOWER($1)",
        )
        .bind(email)
        .fetch_optional(pool)
        .await
    }

    /// Looks up a redeemable invitation by token digest
    pub async fn find_redeemable(
        pool: &PgPool,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, PendingTenant>(
            r#"
            SELECT * FROM pending_tenants
            WHERE activation_token_hash = $1
              AND is_activated = FALSE
              AND expires_at >= $2
            "#,
        )
        .bind(token_hash)
        .bind(now)
        .fetch_optional(pool)
        .await
    }

    pub async fn list_open_by_properties(
        pool: &PgPool,
        property_ids: &[Uuid],
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, PendingTenant>(
            r#"
            SELECT * FROM pending_tenants
            WHERE property_id = ANY($1) AND is_activated = FALSE
            ORDER BY created_at DESC
            "#,
        )
        .bind(property_ids)
        .fetch_all(pool)
        .await
    }

    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM pending_tenants WHERE id = $1 AND is_activated = FALSE")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Redeems the invitation and creates the tenant account atomically
    ///
    /// `account` is completed with the invited email and assignment. Returns
    /// `None` when the token is unknown, expired or already redeemed; of two
    /// concurrent redemptions exactly one gets `Some`.
    pub async fn redeem(
        pool: &PgPool,
        token_hash: &str,
        now: DateTime<Utc>,
        account: NewUser,
    ) -> Result<Option<(Self, User)>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let invitation = sqlx::query_as::<_, PendingTenant>(
            r#"
            UPDATE pending_tenants
            SET is_activated = TRUE, activation_token_hash = NULL, activated_at = $2
            WHERE activation_token_hash = $1
              AND is_activated = FALSE
              AND expires_at >= $2
            RETURNING *
            "#,
        )
        .bind(token_hash)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(invitation) = invitation else {
            tx.rollback().await?;
            return Ok(None);
        };

        let user = User::create_with(&mut *tx, invitation.complete_account(account)).await?;
        tx.commit().await?;

        Ok(Some((invitation, user)))
    }

    /// Fills the invitation's email and assignment into a tenant account
    pub fn complete_account(&self, account: NewUser) -> NewUser {
        NewUser {
            email: self.email.clone(),
            role: super::user::Role::Tenant,
            is_verified: true,
            assignment: Some(super::user::TenantAssignment {
                property_id: self.property_id,
                floor_id: self.floor_id,
                flat_no: self.flat_no.clone(),
                room_no: self.room_no.clone(),
            }),
            ..account
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn invitation(now: DateTime<Utc>) -> PendingTenant {
        PendingTenant::from_new(
            NewPendingTenant {
                name: "Tina".into(),
                email: "tina@example.com".into(),
                property_id: Uuid::new_v4(),
                floor_id: None,
                flat_no: Some("2A".into()),
                room_no: None,
                invited_by: Uuid::new_v4(),
                activation_token_hash: "digest".into(),
                expires_at: now + Duration::hours(1),
            },
            now,
        )
    }

    #[test]
    fn test_redeemable_window() {
        let now = Utc::now();
        let inv = invitation(now);

        assert!(inv.is_redeemable(now));
        assert!(inv.is_redeemable(now + Duration::hours(1)));
        assert!(!inv.is_redeemable(now + Duration::hours(1) + Duration::seconds(1)));
    }

    #[test]
    fn test_complete_account_forces_tenant_scope() {
        let inv = invitation(Utc::now());
        let account = inv.complete_account(NewUser {
            username: "tina".into(),
            email: "someone-else@example.com".into(),
            role: super::super::user::Role::Owner,
            ..NewUser::default()
        });

        assert_eq!(account.email, "tina@example.com");
        assert_eq!(account.role, super::super::user::Role::Tenant);
        assert!(account.is_verified);
        assert_eq!(account.assignment.unwrap().property_id, inv.property_id);
    }
}

/// Storage collaborator
///
/// The engine never talks to sqlx directly; it goes through [`Store`], which
/// has two implementations:
///
/// - [`postgres::PgStore`]: production, delegating to the model queries
/// - [`memory::MemoryStore`]: in-process, used by tests and local runs
///
/// Both provide the same atomic primitives: OTP check-and-clear, invitation
/// redemption, and compare-and-set issue transitions. Callers rely on those
/// to stay correct under concurrent requests.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{
    activity::{ActivityLog, NewActivity},
    appliance::{Appliance, ApplianceUpdate, NewAppliance},
    issue::{Issue, IssueTransition, NewIssue},
    pending_tenant::{NewPendingTenant, PendingTenant},
    property::{Floor, NewFloor, NewProperty, Property, PropertyUpdate},
    session::{NewSession, Session},
    user::{NewUser, Role, TenantAssignment, User},
};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Unique or referential constraint violated
    #[error("{0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            // 23505 unique_violation, 23503 foreign_key_violation
            match db_err.code().as_deref() {
                Some("23505") => {
                    let what = db_err.constraint().unwrap_or("unique constraint");
                    return StoreError::Conflict(conflict_message(what));
                }
                Some("23503") => {
                    return StoreError::Conflict("record is still referenced".to_string());
                }
                _ => {}
            }
        }
        StoreError::Database(err)
    }
}

fn conflict_message(constraint: &str) -> String {
    if constraint.contains("email") {
        "email already registered".to_string()
    } else if constraint.contains("username") {
        "username already taken".to_string()
    } else if constraint.contains("floor") {
        "floor number already exists for this property".to_string()
    } else if constraint.contains("name_address") {
        "a property with this name and address already exists".to_string()
    } else {
        format!("duplicate value violates {}", constraint)
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Outcome of deleting a user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserDeletion {
    Deleted,
    NotFound,

    /// User still owns or manages at least one property
    StillResponsible,
}

#[async_trait]
pub trait Store: Send + Sync {
    // Users

    async fn create_user(&self, data: NewUser) -> StoreResult<User>;
    async fn find_user(&self, id: Uuid) -> StoreResult<Option<User>>;
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    /// Username or email
    async fn find_user_by_login(&self, login: &str) -> StoreResult<Option<User>>;

    async fn list_users_by_role(&self, role: Role) -> StoreResult<Vec<User>>;
    async fn set_user_otp(
        &self,
        user_id: Uuid,
        otp_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<bool>;

    /// Atomic check-and-clear; `true` for exactly one successful caller
    async fn consume_user_otp(
        &self,
        user_id: Uuid,
        otp_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<bool>;

    async fn mark_user_verified(&self, user_id: Uuid) -> StoreResult<bool>;
    async fn update_user_password(&self, user_id: Uuid, password_hash: &str) -> StoreResult<bool>;
    async fn assign_tenant(
        &self,
        user_id: Uuid,
        assignment: TenantAssignment,
    ) -> StoreResult<Option<User>>;
    async fn delete_user(&self, user_id: Uuid) -> StoreResult<UserDeletion>;

    // Properties and floors

    async fn create_property(&self, data: NewProperty) -> StoreResult<Property>;
    async fn find_property(&self, id: Uuid) -> StoreResult<Option<Property>>;

    /// Owned or managed by `user_id`
    async fn list_operable_properties(&self, user_id: Uuid) -> StoreResult<Vec<Property>>;

    async fn update_property(&self, id: Uuid, data: PropertyUpdate) -> StoreResult<Option<Property>>;

    /// `None` if the property is missing or the target is not a manager
    async fn set_property_manager(
        &self,
        id: Uuid,
        manager_id: Option<Uuid>,
    ) -> StoreResult<Option<Property>>;

    /// Cascades to floors, appliances, issues and invitations
    async fn delete_property(&self, id: Uuid) -> StoreResult<bool>;

    async fn create_floor(&self, data: NewFloor) -> StoreResult<Floor>;
    async fn find_floor(&self, id: Uuid) -> StoreResult<Option<Floor>>;
    async fn list_floors(&self, property_id: Uuid) -> StoreResult<Vec<Floor>>;
    async fn set_floor_plan(&self, id: Uuid, reference: &str) -> StoreResult<Option<Floor>>;
    /// Renumbers a floor; the number stays unique within its property
    async fn update_floor(&self, id: Uuid, floor_number: &str) -> StoreResult<Option<Floor>>;
    async fn delete_floor(&self, id: Uuid) -> StoreResult<bool>;

    // Appliances

    async fn create_appliance(&self, data: NewAppliance) -> StoreResult<Appliance>;
    async fn find_appliance(&self, id: Uuid) -> StoreResult<Option<Appliance>>;
    async fn list_appliances(&self, property_id: Uuid) -> StoreResult<Vec<Appliance>>;
    async fn update_appliance(
        &self,
        id: Uuid,
        data: ApplianceUpdate,
    ) -> StoreResult<Option<Appliance>>;
    async fn delete_appliance(&self, id: Uuid) -> StoreResult<bool>;

    // Issues

    async fn create_issue(&self, data: NewIssue) -> StoreResult<Issue>;
    async fn find_issue(&self, id: Uuid) -> StoreResult<Option<Issue>>;
    async fn list_issues_for_properties(&self, property_ids: &[Uuid]) -> StoreResult<Vec<Issue>>;
    async fn list_issues_by_tenant(&self, tenant_id: Uuid) -> StoreResult<Vec<Issue>>;
    async fn list_issues_by_vendor(&self, vendor_id: Uuid) -> StoreResult<Vec<Issue>>;

    /// Compare-and-set; `None` if the guard no longer matches
    async fn apply_issue_transition(&self, transition: &IssueTransition) -> StoreResult<Option<Issue>>;

    // Invitations

    async fn create_pending_tenant(&self, data: NewPendingTenant) -> StoreResult<PendingTenant>;
    async fn find_pending_tenant_by_email(&self, email: &str) -> StoreResult<Option<PendingTenant>>;
    async fn find_redeemable_invitation(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<PendingTenant>>;
    async fn list_open_invitations(&self, property_ids: &[Uuid]) -> StoreResult<Vec<PendingTenant>>;
    async fn delete_pending_tenant(&self, id: Uuid) -> StoreResult<bool>;

    /// Marks the invitation consumed and creates the tenant in one step
    async fn redeem_invitation(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
        account: NewUser,
    ) -> StoreResult<Option<(PendingTenant, User)>>;

    // Sessions

    async fn create_session(&self, data: NewSession) -> StoreResult<Session>;
    async fn find_live_session(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Session>>;
    async fn delete_session(&self, token_hash: &str) -> StoreResult<bool>;
    async fn delete_user_sessions(&self, user_id: Uuid) -> StoreResult<u64>;

    // Activity

    async fn record_activity(&self, data: NewActivity) -> StoreResult<ActivityLog>;
    async fn recent_activity(&self, property_ids: &[Uuid], limit: i64) -> StoreResult<Vec<ActivityLog>>;

    /// Liveness check for the health endpoint
    async fn ping(&self) -> StoreResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_messages() {
        assert_eq!(conflict_message("users_email_key"), "email already registered");
        assert_eq!(conflict_message("users_username_key"), "username already taken");
        assert!(conflict_message("floors_property_number_key").contains("floor number"));
        assert!(conflict_message("other_key").contains("other_key"));
    }

    #[test]
    fn test_row_not_found_is_not_a_conflict() {
        let err: StoreError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, StoreError::Database(_)));
    }
}

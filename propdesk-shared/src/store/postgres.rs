/// PostgreSQL-backed [`Store`]
///
/// Thin delegation to the sqlx queries on each model. All atomic primitives
/// are single guarded statements, except invitation redemption which runs in
/// a transaction because it writes two tables.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{Store, StoreResult, UserDeletion};
use crate::models::{
    activity::{ActivityLog, NewActivity},
    appliance::{Appliance, ApplianceUpdate, NewAppliance},
    issue::{Issue, IssueTransition, NewIssue},
    pending_tenant::{NewPendingTenant, PendingTenant},
    property::{Floor, NewFloor, NewProperty, Property, PropertyUpdate},
    session::{NewSession, Session},
    user::{NewUser, Role, TenantAssignment, User},
};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PgStore {
    async fn create_user(&self, mut data: NewUser) -> StoreResult<User> {
        data.email = data.email.to_lowercase();
        Ok(User::create(&self.pool, data).await?)
    }

    async fn find_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(User::find_by_id(&self.pool, id).await?)
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(User::find_by_email(&self.pool, email).await?)
    }

    async fn find_user_by_login(&self, login: &str) -> StoreResult<Option<User>> {
        Ok(User::find_by_login(&self.pool, login).await?)
    }

    async fn list_users_by_role(&self, role: Role) -> StoreResult<Vec<User>> {
        Ok(User::list_by_role(&self.pool, role).await?)
    }

    async fn set_user_otp(
        &self,
        user_id: Uuid,
        otp_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        Ok(User::set_otp(&self.pool, user_id, otp_hash, expires_at).await?)
    }

    async fn consume_user_otp(
        &self,
        user_id: Uuid,
        otp_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        Ok(User::consume_otp(&self.pool, user_id, otp_hash, now).await?)
    }

    async fn mark_user_verified(&self, user_id: Uuid) -> StoreResult<bool> {
        Ok(User::mark_verified(&self.pool, user_id).await?)
    }

    async fn update_user_password(&self, user_id: Uuid, password_hash: &str) -> StoreResult<bool> {
        Ok(User::update_password(&self.pool, user_id, password_hash).await?)
    }

    async fn assign_tenant(
        &self,
        user_id: Uuid,
        assignment: TenantAssignment,
    ) -> StoreResult<Option<User>> {
        Ok(User::assign_tenant(&self.pool, user_id, assignment).await?)
    }

    async fn delete_user(&self, user_id: Uuid) -> StoreResult<UserDeletion> {
        Ok(match User::delete_unreferenced(&self.pool, user_id).await? {
            Some(true) => UserDeletion::Deleted,
            Some(false) => UserDeletion::StillResponsible,
            None => UserDeletion::NotFound,
        })
    }

    async fn create_property(&self, data: NewProperty) -> StoreResult<Property> {
        Ok(Property::create(&self.pool, data).await?)
    }

    async fn find_property(&self, id: Uuid) -> StoreResult<Option<Property>> {
        Ok(Property::find_by_id(&self.pool, id).await?)
    }

    async fn list_operable_properties(&self, user_id: Uuid) -> StoreResult<Vec<Property>> {
        Ok(Property::list_operable_by(&self.pool, user_id).await?)
    }

    async fn update_property(&self, id: Uuid, data: PropertyUpdate) -> StoreResult<Option<Property>> {
        Ok(Property::update(&self.pool, id, data).await?)
    }

    async fn set_property_manager(
        &self,
        id: Uuid,
        manager_id: Option<Uuid>,
    ) -> StoreResult<Option<Property>> {
        Ok(Property::set_manager(&self.pool, id, manager_id).await?)
    }

    async fn delete_property(&self, id: Uuid) -> StoreResult<bool> {
        Ok(Property::delete(&self.pool, id).await?)
    }

    async fn create_floor(&self, data: NewFloor) -> StoreResult<Floor> {
        Ok(Floor::create(&self.pool, data).await?)
    }

    async fn find_floor(&self, id: Uuid) -> StoreResult<Option<Floor>> {
        Ok(Floor::find_by_id(&self.pool, id).await?)
    }

    async fn list_floors(&self, property_id: Uuid) -> StoreResult<Vec<Floor>> {
        Ok(Floor::list_by_property(&self.pool, property_id).await?)
    }

    async fn set_floor_plan(&self, id: Uuid, reference: &str) -> StoreResult<Option<Floor>> {
        Ok(Floor::set_floor_plan(&self.pool, id, reference).await?)
    }

    async fn update_floor(&self, id: Uuid, floor_number: &str) -> StoreResult<Option<Floor>> {
        Ok(Floor::set_number(&self.pool, id, floor_number).await?)
    }

    async fn delete_floor(&self, id: Uuid) -> StoreResult<bool> {
        Ok(Floor::delete(&self.pool, id).await?)
    }

    async fn create_appliance(&self, data: NewAppliance) -> StoreResult<Appliance> {
        Ok(Appliance::create(&self.pool, data).await?)
    }

    async fn find_appliance(&self, id: Uuid) -> StoreResult<Option<Appliance>> {
        Ok(Appliance::find_by_id(&self.pool, id).await?)
    }

    async fn list_appliances(&self, property_id: Uuid) -> StoreResult<Vec<Appliance>> {
        Ok(Appliance::list_by_property(&self.pool, property_id).await?)
    }

    async fn update_appliance(
        &self,
        id: Uuid,
        data: ApplianceUpdate,
    ) -> StoreResult<Option<Appliance>> {
        Ok(Appliance::update(&self.pool, id, data).await?)
    }

    async fn delete_appliance(&self, id: Uuid) -> StoreResult<bool> {
        Ok(Appliance::delete(&self.pool, id).await?)
    }

    async fn create_issue(&self, data: NewIssue) -> StoreResult<Issue> {
        Ok(Issue::create(&self.pool, data).await?)
    }

    async fn find_issue(&self, id: Uuid) -> StoreResult<Option<Issue>> {
        Ok(Issue::find_by_id(&self.pool, id).await?)
    }

    async fn list_issues_for_properties(&self, property_ids: &[Uuid]) -> StoreResult<Vec<Issue>> {
        Ok(Issue::list_by_properties(&self.pool, property_ids).await?)
    }

    async fn list_issues_by_tenant(&self, tenant_id: Uuid) -> StoreResult<Vec<Issue>> {
        Ok(Issue::list_by_tenant(&self.pool, tenant_id).await?)
    }

    async fn list_issues_by_vendor(&self, vendor_id: Uuid) -> StoreResult<Vec<Issue>> {
        Ok(Issue::list_by_vendor(&self.pool, vendor_id).await?)
    }

    async fn apply_issue_transition(&self, transition: &IssueTransition) -> StoreResult<Option<Issue>> {
        Ok(Issue::apply_transition(&self.pool, transition).await?)
    }

    async fn create_pending_tenant(&self, data: NewPendingTenant) -> StoreResult<PendingTenant> {
        Ok(PendingTenant::create(&self.pool, data).await?)
    }

    async fn find_pending_tenant_by_email(&self, email: &str) -> StoreResult<Option<PendingTenant>> {
        Ok(PendingTenant::find_by_email(&self.pool, email).await?)
    }

    async fn find_redeemable_invitation(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<PendingTenant>> {
        Ok(PendingTenant::find_redeemable(&self.pool, token_hash, now).await?)
    }

    async fn list_open_invitations(&self, property_ids: &[Uuid]) -> StoreResult<Vec<PendingTenant>> {
        Ok(PendingTenant::list_open_by_properties(&self.pool, property_ids).await?)
    }

    async fn delete_pending_tenant(&self, id: Uuid) -> StoreResult<bool> {
        Ok(PendingTenant::delete(&self.pool, id).await?)
    }

    async fn redeem_invitation(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
        account: NewUser,
    ) -> StoreResult<Option<(PendingTenant, User)>> {
        Ok(PendingTenant::redeem(&self.pool, token_hash, now, account).await?)
    }

    async fn create_session(&self, data: NewSession) -> StoreResult<Session> {
        Ok(Session::create(&self.pool, data).await?)
    }

    async fn find_live_session(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Session>> {
        Ok(Session::find_live(&self.pool, token_hash, now).await?)
    }

    async fn delete_session(&self, token_hash: &str) -> StoreResult<bool> {
        Ok(Session::delete_by_token(&self.pool, token_hash).await?)
    }

    async fn delete_user_sessions(&self, user_id: Uuid) -> StoreResult<u64> {
        Ok(Session::delete_for_user(&self.pool, user_id).await?)
    }

    async fn record_activity(&self, data: NewActivity) -> StoreResult<ActivityLog> {
        Ok(ActivityLog::record(&self.pool, data).await?)
    }

    async fn recent_activity(&self, property_ids: &[Uuid], limit: i64) -> StoreResult<Vec<ActivityLog>> {
        Ok(ActivityLog::recent_for_properties(&self.pool, property_ids, limit).await?)
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(crate::db::pool::health_check(&self.pool).await?)
    }
}

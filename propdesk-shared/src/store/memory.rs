/// In-memory [`Store`]
///
/// Holds every table behind one `tokio::sync::Mutex`, so each trait call is
/// atomic with respect to every other. Uniqueness, cascade and restrict rules
/// mirror the PostgreSQL schema in `migrations/`.
///
/// # Example
///
/// ```
/// use propdesk_shared::store::{memory::MemoryStore, Store};
/// use propdesk_shared::models::user::{NewUser, Role};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = MemoryStore::new();
/// let user = store.create_user(NewUser {
///     username: "alice".into(),
///     email: "Alice@Example.com".into(),
///     role: Role::Owner,
///     ..NewUser::default()
/// }).await?;
/// assert_eq!(user.email, "alice@example.com");
/// # Ok(())
/// # }
/// ```

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{Store, StoreError, StoreResult, UserDeletion};
use crate::models::{
    activity::{ActivityLog, NewActivity},
    appliance::{Appliance, ApplianceUpdate, NewAppliance},
    issue::{Issue, IssueTransition, NewIssue},
    pending_tenant::{NewPendingTenant, PendingTenant},
    property::{Floor, NewFloor, NewProperty, Property, PropertyUpdate},
    session::{NewSession, Session},
    user::{NewUser, Role, TenantAssignment, User},
};

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    properties: HashMap<Uuid, Property>,
    floors: HashMap<Uuid, Floor>,
    appliances: HashMap<Uuid, Appliance>,
    issues: HashMap<Uuid, Issue>,
    pending_tenants: HashMap<Uuid, PendingTenant>,
    sessions: HashMap<Uuid, Session>,
    activity: Vec<ActivityLog>,
}

impl Tables {
    fn insert_user(&mut self, mut data: NewUser) -> StoreResult<User> {
        data.email = data.email.to_lowercase();

        if self.users.values().any(|u| u.email == data.email) {
            return Err(StoreError::Conflict("email already registered".into()));
        }
        if self.users.values().any(|u| u.username == data.username) {
            return Err(StoreError::Conflict("username already taken".into()));
        }
        if let Some(assignment) = &data.assignment {
            if !self.properties.contains_key(&assignment.property_id) {
                return Err(StoreError::Conflict("record is still referenced".into()));
            }
        }

        let user = User::from_new(data, Utc::now());
        self.users.insert(user.id, user.clone());
        Ok(user)
    }

    fn remove_appliance(&mut self, id: Uuid) -> bool {
        if self.appliances.remove(&id).is_none() {
            return false;
        }
        for issue in self.issues.values_mut() {
            if issue.appliance_id == Some(id) {
                issue.appliance_id = None;
            }
        }
        true
    }

    fn remove_floor(&mut self, id: Uuid) -> bool {
        if self.floors.remove(&id).is_none() {
            return false;
        }
        let on_floor: Vec<Uuid> = self
            .appliances
            .values()
            .filter(|a| a.floor_id == Some(id))
            .map(|a| a.id)
            .collect();
        for appliance_id in on_floor {
            self.remove_appliance(appliance_id);
        }
        for user in self.users.values_mut() {
            if user.floor_id == Some(id) {
                user.floor_id = None;
            }
        }
        for invitation in self.pending_tenants.values_mut() {
            if invitation.floor_id == Some(id) {
                invitation.floor_id = None;
            }
        }
        true
    }
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_user(&self, data: NewUser) -> StoreResult<User> {
        self.tables.lock().await.insert_user(data)
    }

    async fn find_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.tables.lock().await.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let email = email.to_lowercase();
        let tables = self.tables.lock().await;
        Ok(tables.users.values().find(|u| u.email == email).cloned())
    }

    async fn find_user_by_login(&self, login: &str) -> StoreResult<Option<User>> {
        let email = login.to_lowercase();
        let tables = self.tables.lock().await;
        Ok(tables
            .users
            .values()
            .find(|u| u.username == login || u.email == email)
            .cloned())
    }

    async fn list_users_by_role(&self, role: Role) -> StoreResult<Vec<User>> {
        let tables = self.tables.lock().await;
        let mut users: Vec<User> = tables.users.values().filter(|u| u.role == role).cloned().collect();
        users.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(users)
    }

    async fn set_user_otp(
        &self,
        user_id: Uuid,
        otp_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut tables = self.tables.lock().await;
        Ok(match tables.users.get_mut(&user_id) {
            Some(user) => {
                user.otp_hash = Some(otp_hash.to_string());
                user.otp_expires_at = Some(expires_at);
                user.updated_at = Utc::now();
                true
            }
            None => false,
        })
    }

    async fn consume_user_otp(
        &self,
        user_id: Uuid,
        otp_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut tables = self.tables.lock().await;
        let Some(user) = tables.users.get_mut(&user_id) else {
            return Ok(false);
        };

        let live = matches!(
            (&user.otp_hash, user.otp_expires_at),
            (Some(stored), Some(expiry)) if stored == otp_hash && now <= expiry
        );
        if live {
            user.otp_hash = None;
            user.otp_expires_at = None;
            user.updated_at = Utc::now();
        }
        Ok(live)
    }

    async fn mark_user_verified(&self, user_id: Uuid) -> StoreResult<bool> {
        let mut tables = self.tables.lock().await;
        Ok(match tables.users.get_mut(&user_id) {
            Some(user) => {
                user.is_verified = true;
                user.updated_at = Utc::now();
                true
            }
            None => false,
        })
    }

    async fn update_user_password(&self, user_id: Uuid, password_hash: &str) -> StoreResult<bool> {
        let mut tables = self.tables.lock().await;
        Ok(match tables.users.get_mut(&user_id) {
            Some(user) => {
                user.password_hash = password_hash.to_string();
                user.updated_at = Utc::now();
                true
            }
            None => false,
        })
    }

    async fn assign_tenant(
        &self,
        user_id: Uuid,
        assignment: TenantAssignment,
    ) -> StoreResult<Option<User>> {
        let mut tables = self.tables.lock().await;
        if !tables.properties.contains_key(&assignment.property_id) {
            return Err(StoreError::Conflict("record is still referenced".into()));
        }

        let Some(user) = tables.users.get_mut(&user_id) else {
            return Ok(None);
        };
        if user.role != Role::Tenant {
            return Ok(None);
        }

        user.property_id = Some(assignment.property_id);
        user.floor_id = assignment.floor_id;
        user.flat_no = assignment.flat_no;
        user.room_no = assignment.room_no;
        user.updated_at = Utc::now();
        Ok(Some(user.clone()))
    }

    async fn delete_user(&self, user_id: Uuid) -> StoreResult<UserDeletion> {
        let mut tables = self.tables.lock().await;
        if !tables.users.contains_key(&user_id) {
            return Ok(UserDeletion::NotFound);
        }

        let responsible = tables
            .properties
            .values()
            .any(|p| p.owner_id == user_id || p.manager_id == Some(user_id));
        if responsible {
            return Ok(UserDeletion::StillResponsible);
        }

        let referenced = tables.issues.values().any(|i| i.vendor_id == Some(user_id))
            || tables.appliances.values().any(|a| a.created_by == user_id);
        if referenced {
            return Err(StoreError::Conflict("record is still referenced".into()));
        }

        let email = match tables.users.remove(&user_id) {
            Some(user) => user.email.to_lowercase(),
            None => return Ok(UserDeletion::NotFound),
        };
        tables.issues.retain(|_, i| i.tenant_id != user_id);
        // Releases the invitation the account was activated from
        tables
            .pending_tenants
            .retain(|_, p| p.invited_by != user_id && p.email != email);
        tables.sessions.retain(|_, s| s.user_id != user_id);
        for entry in tables.activity.iter_mut() {
            if entry.user_id == Some(user_id) {
                entry.user_id = None;
            }
        }
        Ok(UserDeletion::Deleted)
    }

    async fn create_property(&self, data: NewProperty) -> StoreResult<Property> {
        let mut tables = self.tables.lock().await;
        if !tables.users.contains_key(&data.owner_id) {
            return Err(StoreError::Conflict("record is still referenced".into()));
        }
        if tables
            .properties
            .values()
            .any(|p| p.name == data.name && p.address == data.address)
        {
            return Err(StoreError::Conflict(
                "a property with this name and address already exists".into(),
            ));
        }

        let now = Utc::now();
        let property = Property {
            id: Uuid::new_v4(),
            name: data.name,
            address: data.address,
            property_type: data.property_type,
            owner_id: data.owner_id,
            manager_id: None,
            created_at: now,
            updated_at: now,
        };
        tables.properties.insert(property.id, property.clone());
        Ok(property)
    }

    async fn find_property(&self, id: Uuid) -> StoreResult<Option<Property>> {
        Ok(self.tables.lock().await.properties.get(&id).cloned())
    }

    async fn list_operable_properties(&self, user_id: Uuid) -> StoreResult<Vec<Property>> {
        let tables = self.tables.lock().await;
        let mut properties: Vec<Property> = tables
            .properties
            .values()
            .filter(|p| p.owner_id == user_id || p.manager_id == Some(user_id))
            .cloned()
            .collect();
        properties.sort_by_key(|p| p.created_at);
        Ok(properties)
    }

    async fn update_property(&self, id: Uuid, data: PropertyUpdate) -> StoreResult<Option<Property>> {
        let mut tables = self.tables.lock().await;
        let Some(property) = tables.properties.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(name) = data.name {
            property.name = name;
        }
        if let Some(address) = data.address {
            property.address = address;
        }
        if data.property_type.is_some() {
            property.property_type = data.property_type;
        }
        property.updated_at = Utc::now();
        Ok(Some(property.clone()))
    }

    async fn set_property_manager(
        &self,
        id: Uuid,
        manager_id: Option<Uuid>,
    ) -> StoreResult<Option<Property>> {
        let mut tables = self.tables.lock().await;
        if let Some(manager_id) = manager_id {
            let is_manager = tables
                .users
                .get(&manager_id)
                .is_some_and(|u| u.role == Role::Manager);
            if !is_manager {
                return Ok(None);
            }
        }

        let Some(property) = tables.properties.get_mut(&id) else {
            return Ok(None);
        };
        property.manager_id = manager_id;
        property.updated_at = Utc::now();
        Ok(Some(property.clone()))
    }

    async fn delete_property(&self, id: Uuid) -> StoreResult<bool> {
        let mut tables = self.tables.lock().await;
        if tables.properties.remove(&id).is_none() {
            return Ok(false);
        }

        tables.floors.retain(|_, f| f.property_id != id);
        tables.appliances.retain(|_, a| a.property_id != id);
        tables.issues.retain(|_, i| i.property_id != id);
        tables.pending_tenants.retain(|_, p| p.property_id != id);
        tables.activity.retain(|a| a.property_id != Some(id));
        for user in tables.users.values_mut() {
            if user.property_id == Some(id) {
                user.property_id = None;
                user.floor_id = None;
            }
        }
        Ok(true)
    }

    async fn create_floor(&self, data: NewFloor) -> StoreResult<Floor> {
        let mut tables = self.tables.lock().await;
        if !tables.properties.contains_key(&data.property_id) {
            return Err(StoreError::Conflict("record is still referenced".into()));
        }
        if tables
            .floors
            .values()
            .any(|f| f.property_id == data.property_id && f.floor_number == data.floor_number)
        {
            return Err(StoreError::Conflict(
                "floor number already exists for this property".into(),
            ));
        }

        let floor = Floor {
            id: Uuid::new_v4(),
            property_id: data.property_id,
            floor_number: data.floor_number,
            floor_plan: None,
            created_at: Utc::now(),
        };
        tables.floors.insert(floor.id, floor.clone());
        Ok(floor)
    }

    async fn find_floor(&self, id: Uuid) -> StoreResult<Option<Floor>> {
        Ok(self.tables.lock().await.floors.get(&id).cloned())
    }

    async fn list_floors(&self, property_id: Uuid) -> StoreResult<Vec<Floor>> {
        let tables = self.tables.lock().await;
        let mut floors: Vec<Floor> = tables
            .floors
            .values()
            .filter(|f| f.property_id == property_id)
            .cloned()
            .collect();
        floors.sort_by(|a, b| a.floor_number.cmp(&b.floor_number));
        Ok(floors)
    }

    async fn set_floor_plan(&self, id: Uuid, reference: &str) -> StoreResult<Option<Floor>> {
        let mut tables = self.tables.lock().await;
        Ok(tables.floors.get_mut(&id).map(|floor| {
            floor.floor_plan = Some(reference.to_string());
            floor.clone()
        }))
    }

    async fn update_floor(&self, id: Uuid, floor_number: &str) -> StoreResult<Option<Floor>> {
        let mut tables = self.tables.lock().await;
        let Some(property_id) = tables.floors.get(&id).map(|f| f.property_id) else {
            return Ok(None);
        };
        if tables
            .floors
            .values()
            .any(|f| f.id != id && f.property_id == property_id && f.floor_number == floor_number)
        {
            return Err(StoreError::Conflict(
                "floor number already exists for this property".into(),
            ));
        }

        Ok(tables.floors.get_mut(&id).map(|floor| {
            floor.floor_number = floor_number.to_string();
            floor.clone()
        }))
    }

    async fn delete_floor(&self, id: Uuid) -> StoreResult<bool> {
        Ok(self.tables.lock().await.remove_floor(id))
    }

    async fn create_appliance(&self, data: NewAppliance) -> StoreResult<Appliance> {
        let mut tables = self.tables.lock().await;
        if !tables.properties.contains_key(&data.property_id) {
            return Err(StoreError::Conflict("record is still referenced".into()));
        }
        if let Some(floor_id) = data.floor_id {
            if !tables.floors.contains_key(&floor_id) {
                return Err(StoreError::Conflict("record is still referenced".into()));
            }
        }

        let now = Utc::now();
        let appliance = Appliance {
            id: Uuid::new_v4(),
            property_id: data.property_id,
            floor_id: data.floor_id,
            created_by: data.created_by,
            name: data.name,
            model: data.model,
            color: data.color,
            status: data.status,
            location: data.location,
            warranty_expiry: data.warranty_expiry,
            created_at: now,
            updated_at: now,
        };
        tables.appliances.insert(appliance.id, appliance.clone());
        Ok(appliance)
    }

    async fn find_appliance(&self, id: Uuid) -> StoreResult<Option<Appliance>> {
        Ok(self.tables.lock().await.appliances.get(&id).cloned())
    }

    async fn list_appliances(&self, property_id: Uuid) -> StoreResult<Vec<Appliance>> {
        let tables = self.tables.lock().await;
        let mut appliances: Vec<Appliance> = tables
            .appliances
            .values()
            .filter(|a| a.property_id == property_id)
            .cloned()
            .collect();
        appliances.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(appliances)
    }

    async fn update_appliance(
        &self,
        id: Uuid,
        data: ApplianceUpdate,
    ) -> StoreResult<Option<Appliance>> {
        let mut tables = self.tables.lock().await;
        Ok(tables.appliances.get_mut(&id).map(|appliance| {
            appliance.apply(data, Utc::now());
            appliance.clone()
        }))
    }

    async fn delete_appliance(&self, id: Uuid) -> StoreResult<bool> {
        Ok(self.tables.lock().await.remove_appliance(id))
    }

    async fn create_issue(&self, data: NewIssue) -> StoreResult<Issue> {
        let mut tables = self.tables.lock().await;
        if !tables.properties.contains_key(&data.property_id)
            || !tables.users.contains_key(&data.tenant_id)
        {
            return Err(StoreError::Conflict("record is still referenced".into()));
        }

        let issue = Issue::from_new(data, Utc::now());
        tables.issues.insert(issue.id, issue.clone());
        Ok(issue)
    }

    async fn find_issue(&self, id: Uuid) -> StoreResult<Option<Issue>> {
        Ok(self.tables.lock().await.issues.get(&id).cloned())
    }

    async fn list_issues_for_properties(&self, property_ids: &[Uuid]) -> StoreResult<Vec<Issue>> {
        let tables = self.tables.lock().await;
        Ok(newest_first(
            tables
                .issues
                .values()
                .filter(|i| property_ids.contains(&i.property_id))
                .cloned()
                .collect(),
        ))
    }

    async fn list_issues_by_tenant(&self, tenant_id: Uuid) -> StoreResult<Vec<Issue>> {
        let tables = self.tables.lock().await;
        Ok(newest_first(
            tables
                .issues
                .values()
                .filter(|i| i.tenant_id == tenant_id)
                .cloned()
                .collect(),
        ))
    }

    async fn list_issues_by_vendor(&self, vendor_id: Uuid) -> StoreResult<Vec<Issue>> {
        let tables = self.tables.lock().await;
        Ok(newest_first(
            tables
                .issues
                .values()
                .filter(|i| i.vendor_id == Some(vendor_id))
                .cloned()
                .collect(),
        ))
    }

    async fn apply_issue_transition(&self, transition: &IssueTransition) -> StoreResult<Option<Issue>> {
        let mut tables = self.tables.lock().await;
        let Some(issue) = tables.issues.get_mut(&transition.issue_id) else {
            return Ok(None);
        };
        if !issue.matches_guard(&transition.expected) {
            return Ok(None);
        }

        issue.apply_fields(transition.next.clone(), Utc::now());
        Ok(Some(issue.clone()))
    }

    async fn create_pending_tenant(&self, mut data: NewPendingTenant) -> StoreResult<PendingTenant> {
        data.email = data.email.to_lowercase();

        let mut tables = self.tables.lock().await;
        if tables.pending_tenants.values().any(|p| p.email == data.email) {
            return Err(StoreError::Conflict("email already registered".into()));
        }
        if !tables.properties.contains_key(&data.property_id) {
            return Err(StoreError::Conflict("record is still referenced".into()));
        }

        let invitation = PendingTenant::from_new(data, Utc::now());
        tables.pending_tenants.insert(invitation.id, invitation.clone());
        Ok(invitation)
    }

    async fn find_pending_tenant_by_email(&self, email: &str) -> StoreResult<Option<PendingTenant>> {
        let email = email.to_lowercase();
        let tables = self.tables.lock().await;
        Ok(tables.pending_tenants.values().find(|p| p.email == email).cloned())
    }

    async fn find_redeemable_invitation(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<PendingTenant>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .pending_tenants
            .values()
            .find(|p| p.activation_token_hash.as_deref() == Some(token_hash) && p.is_redeemable(now))
            .cloned())
    }

    async fn list_open_invitations(&self, property_ids: &[Uuid]) -> StoreResult<Vec<PendingTenant>> {
        let tables = self.tables.lock().await;
        let mut open: Vec<PendingTenant> = tables
            .pending_tenants
            .values()
            .filter(|p| !p.is_activated && property_ids.contains(&p.property_id))
            .cloned()
            .collect();
        open.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(open)
    }

    async fn delete_pending_tenant(&self, id: Uuid) -> StoreResult<bool> {
        let mut tables = self.tables.lock().await;
        let open = tables.pending_tenants.get(&id).is_some_and(|p| !p.is_activated);
        if open {
            tables.pending_tenants.remove(&id);
        }
        Ok(open)
    }

    async fn redeem_invitation(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
        account: NewUser,
    ) -> StoreResult<Option<(PendingTenant, User)>> {
        let mut tables = self.tables.lock().await;
        let Some(invitation) = tables
            .pending_tenants
            .values()
            .find(|p| p.activation_token_hash.as_deref() == Some(token_hash) && p.is_redeemable(now))
            .cloned()
        else {
            return Ok(None);
        };

        // Account first: a failed insert must leave the invitation redeemable
        let user = tables.insert_user(invitation.complete_account(account))?;

        let mut redeemed = invitation;
        redeemed.is_activated = true;
        redeemed.activation_token_hash = None;
        redeemed.activated_at = Some(now);
        tables.pending_tenants.insert(redeemed.id, redeemed.clone());

        Ok(Some((redeemed, user)))
    }

    async fn create_session(&self, data: NewSession) -> StoreResult<Session> {
        let mut tables = self.tables.lock().await;
        if !tables.users.contains_key(&data.user_id) {
            return Err(StoreError::Conflict("record is still referenced".into()));
        }
        let session = Session::from_new(data, Utc::now());
        tables.sessions.insert(session.id, session.clone());
        Ok(session)
    }

    async fn find_live_session(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Session>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .sessions
            .values()
            .find(|s| s.token_hash == token_hash && s.expires_at > now)
            .cloned())
    }

    async fn delete_session(&self, token_hash: &str) -> StoreResult<bool> {
        let mut tables = self.tables.lock().await;
        let before = tables.sessions.len();
        tables.sessions.retain(|_, s| s.token_hash != token_hash);
        Ok(tables.sessions.len() < before)
    }

    async fn delete_user_sessions(&self, user_id: Uuid) -> StoreResult<u64> {
        let mut tables = self.tables.lock().await;
        let before = tables.sessions.len();
        tables.sessions.retain(|_, s| s.user_id != user_id);
        Ok((before - tables.sessions.len()) as u64)
    }

    async fn record_activity(&self, data: NewActivity) -> StoreResult<ActivityLog> {
        let entry = ActivityLog::from_new(data, Utc::now());
        self.tables.lock().await.activity.push(entry.clone());
        Ok(entry)
    }

    async fn recent_activity(&self, property_ids: &[Uuid], limit: i64) -> StoreResult<Vec<ActivityLog>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .activity
            .iter()
            .rev()
            .filter(|a| a.property_id.is_some_and(|p| property_ids.contains(&p)))
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}

fn newest_first(mut issues: Vec<Issue>) -> Vec<Issue> {
    issues.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    issues
}

/// Property hierarchy management
///
/// CRUD over properties, floors and appliances plus manager delegation,
/// tenant assignment, the user directory and the activity feed. Every call
/// resolves its target through [`Hierarchy`] and asks the matrix first.

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::authorization::{authorize, decide, Action, Actor, Resource};
use crate::error::{CoreError, CoreResult};
use crate::files::{FileStore, FileStoreError};
use crate::hierarchy::{scope_of, Hierarchy};
use crate::models::{
    activity::{ActivityLog, NewActivity},
    appliance::{Appliance, ApplianceUpdate, NewAppliance, WarrantyStatus},
    property::{Floor, NewFloor, NewProperty, Property, PropertyUpdate},
    user::{Role, TenantAssignment, User},
};
use crate::store::Store;

pub const DEFAULT_ACTIVITY_LIMIT: i64 = 20;

/// Look-ahead of the dashboard's expiring-warranty count
pub const STATS_WARNING_DAYS: i64 = 90;

#[derive(Debug, Clone, Deserialize)]
pub struct PropertyInput {
    pub name: String,
    pub address: String,
    pub property_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApplianceInput {
    pub floor_id: Option<Uuid>,
    pub name: String,
    pub model: Option<String>,
    pub color: Option<String>,
    pub status: Option<String>,
    pub location: Option<String>,
    pub warranty_expiry: Option<NaiveDate>,
}

/// Appliance with its warranty state computed for `today`
#[derive(Debug, Clone, Serialize)]
pub struct ApplianceView {
    #[serde(flatten)]
    pub appliance: Appliance,
    pub warranty_status: WarrantyStatus,
}

impl ApplianceView {
    pub fn new(appliance: Appliance, today: NaiveDate) -> Self {
        let warranty_status = appliance.warranty_status(today);
        Self {
            appliance,
            warranty_status,
        }
    }
}

/// Condition counts of one appliance type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConditionCounts {
    pub working: usize,
    pub not_working: usize,
    pub warranty_expired: usize,
}

/// Dashboard summary over every appliance in the actor's properties
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ApplianceStats {
    pub total: usize,

    /// Percentage of working appliances, two decimals
    pub health_percent: f64,

    /// Keyed by appliance type, the name up to " Front"
    pub type_status: BTreeMap<String, ConditionCounts>,

    /// Warranties ending within [`STATS_WARNING_DAYS`] from today, inclusive
    pub expiring_soon: usize,
}

impl ApplianceStats {
    pub fn tally(appliances: &[Appliance], today: NaiveDate) -> Self {
        let horizon = today + Duration::days(STATS_WARNING_DAYS);
        let mut stats = ApplianceStats {
            total: appliances.len(),
            ..Default::default()
        };
        let mut working = 0usize;

        for appliance in appliances {
            let kind = appliance
                .name
                .split(" Front")
                .next()
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .unwrap_or("Unknown")
                .to_string();
            let counts = stats.type_status.entry(kind).or_default();

            let status = appliance
                .status
                .as_deref()
                .map(|s| s.trim().to_lowercase())
                .unwrap_or_default();
            match status.as_str() {
                "working" => {
                    counts.working += 1;
                    working += 1;
                }
                "warranty expired" => counts.warranty_expired += 1,
                // Anything unrecognised counts as broken
                _ => counts.not_working += 1,
            }

            if appliance
                .warranty_expiry
                .is_some_and(|expiry| today <= expiry && expiry <= horizon)
            {
                stats.expiring_soon += 1;
            }
        }

        if stats.total > 0 {
            stats.health_percent = (working as f64 * 10_000.0 / stats.total as f64).round() / 100.0;
        }
        stats
    }
}

pub struct Portfolio {
    store: Arc<dyn Store>,
    files: Arc<dyn FileStore>,
}

impl Portfolio {
    pub fn new(store: Arc<dyn Store>, files: Arc<dyn FileStore>) -> Self {
        Self { store, files }
    }

    fn hierarchy(&self) -> Hierarchy<'_> {
        Hierarchy::new(self.store.as_ref())
    }

    // Properties

    pub async fn create_property(&self, actor: &Actor, input: PropertyInput) -> CoreResult<Property> {
        authorize(actor, Action::Create, &Resource::Portfolio)?;
        require_text("name", &input.name)?;
        require_text("address", &input.address)?;

        let property = self
            .store
            .create_property(NewProperty {
                name: input.name.trim().to_string(),
                address: input.address.trim().to_string(),
                property_type: input.property_type,
                owner_id: actor.user_id,
            })
            .await?;

        tracing::info!(property_id = %property.id, owner_id = %actor.user_id, "Property created");
        self.record(actor.user_id, property.id, format!("Property created: {}", property.name))
            .await;
        Ok(property)
    }

    /// Owned and managed properties, or the tenant's own
    pub async fn list_properties(&self, user: &User) -> CoreResult<Vec<Property>> {
        self.hierarchy().visible_properties(user).await
    }

    pub async fn view_property(&self, actor: &Actor, property_id: Uuid) -> CoreResult<Property> {
        let (property, resource) = self.hierarchy().property(property_id).await?;
        authorize(actor, Action::View, &resource)?;
        Ok(property)
    }

    pub async fn update_property(
        &self,
        actor: &Actor,
        property_id: Uuid,
        update: PropertyUpdate,
    ) -> CoreResult<Property> {
        let (_, resource) = self.hierarchy().property(property_id).await?;
        authorize(actor, Action::Update, &resource)?;

        let property = self
            .store
            .update_property(property_id, update)
            .await?
            .ok_or(CoreError::NotFound("property"))?;
        tracing::info!(property_id = %property.id, "Property updated");
        Ok(property)
    }

    /// Removes the property with its floors, appliances, issues and invitations
    pub async fn delete_property(&self, actor: &Actor, property_id: Uuid) -> CoreResult<()> {
        let (_, resource) = self.hierarchy().property(property_id).await?;
        authorize(actor, Action::Delete, &resource)?;

        if !self.store.delete_property(property_id).await? {
            return Err(CoreError::NotFound("property"));
        }
        tracing::info!(%property_id, by = %actor.user_id, "Property deleted");
        Ok(())
    }

    /// Delegates the property to a manager, or takes it back with `None`
    pub async fn assign_manager(
        &self,
        actor: &Actor,
        property_id: Uuid,
        manager_id: Option<Uuid>,
    ) -> CoreResult<Property> {
        let (_, resource) = self.hierarchy().property(property_id).await?;
        authorize(actor, Action::AssignManager, &resource)?;

        if let Some(manager_id) = manager_id {
            self.require_role(manager_id, Role::Manager).await?;
        }

        let property = self
            .store
            .set_property_manager(property_id, manager_id)
            .await?
            .ok_or_else(|| CoreError::Validation("assignee must be a manager".into()))?;

        let entry = match manager_id {
            Some(id) => format!("Manager assigned: {}", id),
            None => "Manager removed".to_string(),
        };
        tracing::info!(%property_id, manager_id = ?manager_id, "Manager delegation changed");
        self.record(actor.user_id, property_id, entry).await;
        Ok(property)
    }

    /// Places an existing tenant account in one of the actor's properties
    pub async fn assign_tenant(
        &self,
        actor: &Actor,
        tenant_id: Uuid,
        assignment: TenantAssignment,
    ) -> CoreResult<User> {
        let (_, resource) = self.hierarchy().property(assignment.property_id).await?;
        authorize(actor, Action::AssignTenant, &resource)?;

        let tenant = self.require_role(tenant_id, Role::Tenant).await?;
        // Moving a placed tenant needs the same right over the property they leave
        if let Some(current) = tenant.property_id.filter(|id| *id != assignment.property_id) {
            let (_, resource) = self.hierarchy().property(current).await?;
            authorize(actor, Action::AssignTenant, &resource)?;
        }
        if let Some(floor_id) = assignment.floor_id {
            self.require_floor_of(floor_id, assignment.property_id).await?;
        }

        let property_id = assignment.property_id;
        let user = self
            .store
            .assign_tenant(tenant_id, assignment)
            .await?
            .ok_or(CoreError::NotFound("user"))?;

        tracing::info!(tenant_id = %user.id, %property_id, "Tenant assigned");
        self.record(actor.user_id, property_id, format!("Tenant assigned: {}", user.username))
            .await;
        Ok(user)
    }

    // Floors

    pub async fn add_floor(&self, actor: &Actor, property_id: Uuid, floor_number: &str) -> CoreResult<Floor> {
        let (_, resource) = self.hierarchy().property(property_id).await?;
        authorize(actor, Action::Update, &resource)?;
        require_text("floor_number", floor_number)?;

        let floor = self
            .store
            .create_floor(NewFloor {
                property_id,
                floor_number: floor_number.trim().to_string(),
            })
            .await?;
        tracing::info!(floor_id = %floor.id, %property_id, "Floor added");
        Ok(floor)
    }

    /// Floors of a property the actor can see; tenants only see their own floor
    pub async fn list_floors(&self, actor: &Actor, property_id: Uuid) -> CoreResult<Vec<Floor>> {
        let (property, resource) = self.hierarchy().property(property_id).await?;
        authorize(actor, Action::View, &resource)?;

        let scope = scope_of(&property);
        let floors = self.store.list_floors(property_id).await?;
        Ok(floors
            .into_iter()
            .filter(|f| {
                decide(actor, Action::View, &Resource::Floor { scope, floor_id: f.id }).is_permit()
            })
            .collect())
    }

    pub async fn view_floor(&self, actor: &Actor, floor_id: Uuid) -> CoreResult<Floor> {
        let (floor, resource) = self.hierarchy().floor(floor_id).await?;
        authorize(actor, Action::View, &resource)?;
        Ok(floor)
    }

    pub async fn update_floor(&self, actor: &Actor, floor_id: Uuid, floor_number: &str) -> CoreResult<Floor> {
        let (floor, resource) = self.hierarchy().floor(floor_id).await?;
        authorize(actor, Action::Update, &resource)?;
        require_text("floor_number", floor_number)?;

        let updated = self
            .store
            .update_floor(floor_id, floor_number.trim())
            .await?
            .ok_or(CoreError::NotFound("floor"))?;
        tracing::info!(%floor_id, by = %actor.user_id, "Floor renumbered");
        self.record(
            actor.user_id,
            floor.property_id,
            format!("Floor renumbered: {} -> {}", floor.floor_number, updated.floor_number),
        )
        .await;
        Ok(updated)
    }

    pub async fn delete_floor(&self, actor: &Actor, floor_id: Uuid) -> CoreResult<()> {
        let (_, resource) = self.hierarchy().floor(floor_id).await?;
        authorize(actor, Action::Delete, &resource)?;

        if !self.store.delete_floor(floor_id).await? {
            return Err(CoreError::NotFound("floor"));
        }
        tracing::info!(%floor_id, "Floor deleted");
        Ok(())
    }

    pub async fn attach_floor_plan(
        &self,
        actor: &Actor,
        floor_id: Uuid,
        bytes: Bytes,
        file_name: &str,
    ) -> CoreResult<Floor> {
        let (_, resource) = self.hierarchy().floor(floor_id).await?;
        authorize(actor, Action::Update, &resource)?;

        let reference = self.files.store(bytes, file_name).await.map_err(|e| match e {
            FileStoreError::Empty | FileStoreError::TooLarge => CoreError::Validation(e.to_string()),
            FileStoreError::Io(io) => {
                tracing::error!(error = %io, %floor_id, "Failed to store floor plan");
                CoreError::Internal("failed to store file".into())
            }
        })?;

        let floor = self
            .store
            .set_floor_plan(floor_id, &reference)
            .await?
            .ok_or(CoreError::NotFound("floor"))?;
        tracing::info!(%floor_id, "Floor plan attached");
        Ok(floor)
    }

    // Appliances

    pub async fn add_appliance(
        &self,
        actor: &Actor,
        property_id: Uuid,
        input: ApplianceInput,
    ) -> CoreResult<Appliance> {
        let (_, resource) = self.hierarchy().property(property_id).await?;
        authorize(actor, Action::Update, &resource)?;
        require_text("name", &input.name)?;

        if let Some(floor_id) = input.floor_id {
            self.require_floor_of(floor_id, property_id).await?;
        }

        let appliance = self
            .store
            .create_appliance(NewAppliance {
                property_id,
                floor_id: input.floor_id,
                created_by: actor.user_id,
                name: input.name.trim().to_string(),
                model: input.model,
                color: input.color,
                status: input.status,
                location: input.location,
                warranty_expiry: input.warranty_expiry,
            })
            .await?;

        tracing::info!(appliance_id = %appliance.id, %property_id, "Appliance added");
        self.record(actor.user_id, property_id, format!("Appliance added: {}", appliance.name))
            .await;
        Ok(appliance)
    }

    /// Appliances the actor can see; tenants get their floor plus property-wide ones
    pub async fn list_appliances(&self, actor: &Actor, property_id: Uuid) -> CoreResult<Vec<Appliance>> {
        let (property, resource) = self.hierarchy().property(property_id).await?;
        authorize(actor, Action::View, &resource)?;

        let scope = scope_of(&property);
        let appliances = self.store.list_appliances(property_id).await?;
        Ok(appliances
            .into_iter()
            .filter(|a| {
                let resource = Resource::Appliance {
                    scope,
                    floor_id: a.floor_id,
                };
                decide(actor, Action::View, &resource).is_permit()
            })
            .collect())
    }

    pub async fn view_appliance(&self, actor: &Actor, appliance_id: Uuid) -> CoreResult<Appliance> {
        let (appliance, resource) = self.hierarchy().appliance(appliance_id).await?;
        authorize(actor, Action::View, &resource)?;
        Ok(appliance)
    }

    pub async fn update_appliance(
        &self,
        actor: &Actor,
        appliance_id: Uuid,
        update: ApplianceUpdate,
    ) -> CoreResult<Appliance> {
        let (_, resource) = self.hierarchy().appliance(appliance_id).await?;
        authorize(actor, Action::Update, &resource)?;
        if let Some(name) = &update.name {
            require_text("name", name)?;
        }

        let appliance = self
            .store
            .update_appliance(appliance_id, update)
            .await?
            .ok_or(CoreError::NotFound("appliance"))?;
        tracing::info!(%appliance_id, by = %actor.user_id, "Appliance updated");
        Ok(appliance)
    }

    pub async fn delete_appliance(&self, actor: &Actor, appliance_id: Uuid) -> CoreResult<()> {
        let (_, resource) = self.hierarchy().appliance(appliance_id).await?;
        authorize(actor, Action::Delete, &resource)?;

        if !self.store.delete_appliance(appliance_id).await? {
            return Err(CoreError::NotFound("appliance"));
        }
        tracing::info!(%appliance_id, "Appliance deleted");
        Ok(())
    }

    /// Appliance health across the properties the actor owns or manages
    pub async fn appliance_stats(&self, actor: &Actor, today: NaiveDate) -> CoreResult<ApplianceStats> {
        authorize(actor, Action::View, &Resource::Dashboard)?;

        let mut appliances = Vec::new();
        for property in self.store.list_operable_properties(actor.user_id).await? {
            if decide(actor, Action::View, &Resource::Property(scope_of(&property))).is_permit() {
                appliances.extend(self.store.list_appliances(property.id).await?);
            }
        }
        Ok(ApplianceStats::tally(&appliances, today))
    }

    // Directory and activity

    /// Users of `role`, for choosing a vendor or a manager
    pub async fn directory(&self, actor: &Actor, role: Role) -> CoreResult<Vec<User>> {
        authorize(actor, Action::View, &Resource::Directory(role))?;
        Ok(self.store.list_users_by_role(role).await?)
    }

    /// Most recent entries across the properties whose activity the actor may read
    pub async fn activity(&self, actor: &Actor, limit: Option<i64>) -> CoreResult<Vec<ActivityLog>> {
        let ids: Vec<Uuid> = self
            .store
            .list_operable_properties(actor.user_id)
            .await?
            .iter()
            .map(scope_of)
            .filter(|scope| decide(actor, Action::ViewActivity, &Resource::Property(*scope)).is_permit())
            .map(|scope| scope.property_id)
            .collect();

        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let limit = limit.unwrap_or(DEFAULT_ACTIVITY_LIMIT).clamp(1, 100);
        Ok(self.store.recent_activity(&ids, limit).await?)
    }

    async fn require_role(&self, user_id: Uuid, role: Role) -> CoreResult<User> {
        self.store
            .find_user(user_id)
            .await?
            .filter(|u| u.role == role)
            .ok_or_else(|| CoreError::Validation(format!("assignee must be a {}", role)))
    }

    async fn require_floor_of(&self, floor_id: Uuid, property_id: Uuid) -> CoreResult<()> {
        match self.store.find_floor(floor_id).await? {
            Some(floor) if floor.property_id == property_id => Ok(()),
            _ => Err(CoreError::Validation("floor does not belong to the property".into())),
        }
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

fn require_text(field: &str, value: &str) -> CoreResult<()> {
    if value.trim().is_empty() {
        return Err(CoreError::Validation(format!("{} must not be empty", field)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DenyReason;
    use crate::services::testing::Harness;

    fn boiler(floor_id: Option<Uuid>) -> ApplianceInput {
        ApplianceInput {
            floor_id,
            name: "Boiler".into(),
            model: Some("B-200".into()),
            color: None,
            status: None,
            location: None,
            warranty_expiry: None,
        }
    }

    #[tokio::test]
    async fn test_manager_operates_only_delegated_properties() {
        let h = Harness::new();
        let (owner, property) = h.owner_with_property("olga").await;
        let (_, other) = h.owner_with_property("oscar").await;
        let manager = h.manager_of("mia", &owner, property.id).await;

        assert!(h.portfolio.view_property(&manager, property.id).await.is_ok());
        assert!(matches!(
            h.portfolio.view_property(&manager, other.id).await,
            Err(CoreError::Forbidden(DenyReason::NotDelegated))
        ));
        assert!(matches!(
            h.portfolio.delete_property(&manager, property.id).await,
            Err(CoreError::Forbidden(DenyReason::RoleNotPermitted))
        ));
    }

    #[tokio::test]
    async fn test_assign_manager_requires_manager_role() {
        let h = Harness::new();
        let (owner, property) = h.owner_with_property("olga").await;
        let vendor = h.vendor("vic").await;

        assert!(matches!(
            h.portfolio.assign_manager(&owner, property.id, Some(vendor.user_id)).await,
            Err(CoreError::Validation(_))
        ));

        let manager = h.manager_of("mia", &owner, property.id).await;
        let cleared = h.portfolio.assign_manager(&owner, property.id, None).await.unwrap();
        assert!(cleared.manager_id.is_none());
        assert!(matches!(
            h.portfolio.view_property(&manager, property.id).await,
            Err(CoreError::Forbidden(DenyReason::NotDelegated))
        ));
    }

    #[tokio::test]
    async fn test_owner_cannot_take_another_owners_tenant() {
        let h = Harness::new();
        let (_, property) = h.owner_with_property("olga").await;
        let (bob, elm) = h.owner_with_property("bob").await;
        let tenant = h.tenant_in("tina", property.id, None).await;

        let result = h
            .portfolio
            .assign_tenant(
                &bob,
                tenant.user_id,
                TenantAssignment {
                    property_id: elm.id,
                    floor_id: None,
                    flat_no: None,
                    room_no: None,
                },
            )
            .await;
        assert!(matches!(result, Err(CoreError::Forbidden(_))));

        let unchanged = h.store.find_user(tenant.user_id).await.unwrap().unwrap();
        assert_eq!(unchanged.property_id, Some(property.id));
    }

    #[tokio::test]
    async fn test_owner_moves_own_tenant_between_properties() {
        let h = Harness::new();
        let (owner, first) = h.owner_with_property("olga").await;
        let second = h
            .portfolio
            .create_property(
                &owner,
                PropertyInput {
                    name: "Annex".into(),
                    address: "2 Side St".into(),
                    property_type: None,
                },
            )
            .await
            .unwrap();
        let tenant = h.tenant_in("tina", first.id, None).await;

        let moved = h
            .portfolio
            .assign_tenant(
                &owner,
                tenant.user_id,
                TenantAssignment {
                    property_id: second.id,
                    floor_id: None,
                    flat_no: Some("4B".into()),
                    room_no: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(moved.property_id, Some(second.id));
        assert_eq!(moved.flat_no.as_deref(), Some("4B"));
    }

    #[tokio::test]
    async fn test_tenant_sees_own_floor_and_property_wide_appliances() {
        let h = Harness::new();
        let (owner, property) = h.owner_with_property("olga").await;
        let first = h.portfolio.add_floor(&owner, property.id, "1").await.unwrap();
        let second = h.portfolio.add_floor(&owner, property.id, "2").await.unwrap();

        h.portfolio.add_appliance(&owner, property.id, boiler(Some(first.id))).await.unwrap();
        h.portfolio.add_appliance(&owner, property.id, boiler(Some(second.id))).await.unwrap();
        h.portfolio.add_appliance(&owner, property.id, boiler(None)).await.unwrap();

        let tenant = h.tenant_in("tina", property.id, Some(first.id)).await;

        let floors = h.portfolio.list_floors(&tenant, property.id).await.unwrap();
        assert_eq!(floors.iter().map(|f| f.id).collect::<Vec<_>>(), vec![first.id]);

        let visible = h.portfolio.list_appliances(&tenant, property.id).await.unwrap();
        assert_eq!(visible.len(), 2);
        assert!(visible.iter().all(|a| a.floor_id != Some(second.id)));

        assert_eq!(h.portfolio.list_appliances(&owner, property.id).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_appliance_floor_must_belong_to_property() {
        let h = Harness::new();
        let (owner, property) = h.owner_with_property("olga").await;
        let (other_owner, other) = h.owner_with_property("oscar").await;
        let foreign = h.portfolio.add_floor(&other_owner, other.id, "1").await.unwrap();

        assert!(matches!(
            h.portfolio.add_appliance(&owner, property.id, boiler(Some(foreign.id))).await,
            Err(CoreError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_duplicate_floor_number_conflicts() {
        let h = Harness::new();
        let (owner, property) = h.owner_with_property("olga").await;
        h.portfolio.add_floor(&owner, property.id, "3").await.unwrap();

        assert!(matches!(
            h.portfolio.add_floor(&owner, property.id, "3").await,
            Err(CoreError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_update_floor_number() {
        let h = Harness::new();
        let (owner, property) = h.owner_with_property("olga").await;
        let manager = h.manager_of("mia", &owner, property.id).await;
        let ground = h.portfolio.add_floor(&owner, property.id, "G").await.unwrap();
        h.portfolio.add_floor(&owner, property.id, "1").await.unwrap();

        let renamed = h.portfolio.update_floor(&owner, ground.id, " 0 ").await.unwrap();
        assert_eq!(renamed.floor_number, "0");
        assert_eq!(renamed.id, ground.id);

        // Keeping its own number is not a clash
        assert!(h.portfolio.update_floor(&owner, ground.id, "0").await.is_ok());
        assert!(matches!(
            h.portfolio.update_floor(&owner, ground.id, "1").await,
            Err(CoreError::Conflict(_))
        ));
        assert!(matches!(
            h.portfolio.update_floor(&owner, ground.id, "  ").await,
            Err(CoreError::Validation(_))
        ));
        assert!(matches!(
            h.portfolio.update_floor(&manager, ground.id, "2").await,
            Err(CoreError::Forbidden(DenyReason::RoleNotPermitted))
        ));
        assert!(matches!(
            h.portfolio.update_floor(&owner, Uuid::new_v4(), "2").await,
            Err(CoreError::NotFound(_))
        ));
    }

    fn unit(name: &str, status: Option<&str>, warranty_expiry: Option<NaiveDate>) -> Appliance {
        let now = chrono::Utc::now();
        Appliance {
            id: Uuid::new_v4(),
            property_id: Uuid::new_v4(),
            floor_id: None,
            created_by: Uuid::new_v4(),
            name: name.into(),
            model: None,
            color: None,
            status: status.map(str::to_string),
            location: None,
            warranty_expiry,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_appliance_stats_tally() {
        let today = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        let appliances = vec![
            unit("Fridge Front", Some(" Working "), Some(today)),
            unit("Fridge", Some("not working"), NaiveDate::from_ymd_opt(2025, 8, 30)),
            unit("Washer", Some("Warranty Expired"), NaiveDate::from_ymd_opt(2025, 5, 31)),
            unit("Washer Front Load", Some("broken?"), NaiveDate::from_ymd_opt(2025, 9, 1)),
            unit("Heater", None, None),
            unit("Heater", Some("working"), None),
        ];

        let stats = ApplianceStats::tally(&appliances, today);
        assert_eq!(stats.total, 6);
        assert_eq!(stats.health_percent, 33.33);
        assert_eq!(
            stats.type_status["Fridge"],
            ConditionCounts {
                working: 1,
                not_working: 1,
                warranty_expired: 0
            }
        );
        assert_eq!(
            stats.type_status["Washer"],
            ConditionCounts {
                working: 0,
                not_working: 1,
                warranty_expired: 1
            }
        );
        assert_eq!(stats.type_status["Heater"].working, 1);
        // today and Aug 30 fall inside the 90-day window; Sep 1 does not
        assert_eq!(stats.expiring_soon, 2);

        let empty = ApplianceStats::tally(&[], today);
        assert_eq!(empty.total, 0);
        assert_eq!(empty.health_percent, 0.0);
    }

    #[tokio::test]
    async fn test_appliance_stats_cover_own_properties_only() {
        let h = Harness::new();
        let today = chrono::Utc::now().date_naive();
        let (owner, property) = h.owner_with_property("olga").await;
        let (other, elsewhere) = h.owner_with_property("bob").await;
        let manager = h.manager_of("mia", &owner, property.id).await;
        let tenant = h.tenant_in("tina", property.id, None).await;

        let working = ApplianceInput {
            status: Some("Working".into()),
            ..boiler(None)
        };
        h.portfolio.add_appliance(&owner, property.id, working).await.unwrap();
        h.portfolio.add_appliance(&owner, property.id, boiler(None)).await.unwrap();
        h.portfolio.add_appliance(&other, elsewhere.id, boiler(None)).await.unwrap();

        let stats = h.portfolio.appliance_stats(&owner, today).await.unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.health_percent, 50.0);
        assert_eq!(h.portfolio.appliance_stats(&manager, today).await.unwrap(), stats);

        assert!(matches!(
            h.portfolio.appliance_stats(&tenant, today).await,
            Err(CoreError::Forbidden(DenyReason::RoleNotPermitted))
        ));
    }

    #[tokio::test]
    async fn test_manager_may_update_but_not_delete_appliance() {
        let h = Harness::new();
        let (owner, property) = h.owner_with_property("olga").await;
        let manager = h.manager_of("mia", &owner, property.id).await;
        let appliance = h.portfolio.add_appliance(&owner, property.id, boiler(None)).await.unwrap();

        let updated = h
            .portfolio
            .update_appliance(
                &manager,
                appliance.id,
                ApplianceUpdate {
                    status: Some("serviced".into()),
                    ..ApplianceUpdate::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.status.as_deref(), Some("serviced"));

        assert!(matches!(
            h.portfolio.delete_appliance(&manager, appliance.id).await,
            Err(CoreError::Forbidden(DenyReason::RoleNotPermitted))
        ));
    }

    #[tokio::test]
    async fn test_floor_plan_upload() {
        let h = Harness::new();
        let (owner, property) = h.owner_with_property("olga").await;
        let floor = h.portfolio.add_floor(&owner, property.id, "1").await.unwrap();

        let floor = h
            .portfolio
            .attach_floor_plan(&owner, floor.id, Bytes::from_static(b"%PDF"), "plan.pdf")
            .await
            .unwrap();
        let reference = floor.floor_plan.unwrap();
        assert_eq!(h.files.get(&reference), Some(Bytes::from_static(b"%PDF")));

        assert!(matches!(
            h.portfolio.attach_floor_plan(&owner, floor.id, Bytes::new(), "x.pdf").await,
            Err(CoreError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_directory_and_activity_visibility() {
        let h = Harness::new();
        let (owner, property) = h.owner_with_property("olga").await;
        let manager = h.manager_of("mia", &owner, property.id).await;
        h.vendor("vic").await;

        assert_eq!(h.portfolio.directory(&manager, Role::Vendor).await.unwrap().len(), 1);
        assert!(matches!(
            h.portfolio.directory(&manager, Role::Manager).await,
            Err(CoreError::Forbidden(DenyReason::RoleNotPermitted))
        ));

        let feed = h.portfolio.activity(&owner, None).await.unwrap();
        assert!(!feed.is_empty());
        assert!(feed.iter().all(|a| a.property_id == Some(property.id)));
        assert!(h.portfolio.activity(&manager, None).await.unwrap().is_empty());
    }
}

/// Property hierarchy resolver
///
/// Read-only traversal of Owner → Property → Floor → Appliance → Issue.
/// Everything the authorization matrix needs about "whose is this" comes from
/// here, so the ownership chain is walked in exactly one place.

use uuid::Uuid;

use crate::auth::authorization::{PropertyScope, Resource};
use crate::error::{CoreError, CoreResult};
use crate::models::{
    appliance::Appliance, issue::Issue, property::{Floor, Property}, user::{Role, User},
};
use crate::store::Store;

pub fn scope_of(property: &Property) -> PropertyScope {
    PropertyScope {
        property_id: property.id,
        owner_id: property.owner_id,
        manager_id: property.manager_id,
    }
}

pub struct Hierarchy<'a> {
    store: &'a dyn Store,
}

impl<'a> Hierarchy<'a> {
    pub fn new(store: &'a dyn Store) -> Self {
        Self { store }
    }

    /// Properties `user` may operate on: owned ∪ managed; a tenant's own
    /// property; nothing for vendors
    pub async fn visible_properties(&self, user: &User) -> CoreResult<Vec<Property>> {
        match user.role {
            Role::Owner | Role::Manager => Ok(self.store.list_operable_properties(user.id).await?),
            Role::Tenant => match user.property_id {
                Some(id) => Ok(self.store.find_property(id).await?.into_iter().collect()),
                None => Ok(Vec::new()),
            },
            Role::Vendor => Ok(Vec::new()),
        }
    }

    /// Owned ∪ managed property ids
    pub async fn operable_property_ids(&self, user_id: Uuid) -> CoreResult<Vec<Uuid>> {
        Ok(self
            .store
            .list_operable_properties(user_id)
            .await?
            .into_iter()
            .map(|p| p.id)
            .collect())
    }

    pub async fn property(&self, property_id: Uuid) -> CoreResult<(Property, Resource)> {
        let property = self
            .store
            .find_property(property_id)
            .await?
            .ok_or(CoreError::NotFound("property"))?;
        let resource = Resource::Property(scope_of(&property));
        Ok((property, resource))
    }

    pub async fn property_scope(&self, property_id: Uuid) -> CoreResult<PropertyScope> {
        let (property, _) = self.property(property_id).await?;
        Ok(scope_of(&property))
    }

    pub async fn floor(&self, floor_id: Uuid) -> CoreResult<(Floor, Resource)> {
        let floor = self
            .store
            .find_floor(floor_id)
            .await?
            .ok_or(CoreError::NotFound("floor"))?;
        let scope = self.property_scope(floor.property_id).await?;
        Ok((
            floor,
            Resource::Floor {
                scope,
                floor_id,
            },
        ))
    }

    pub async fn appliance(&self, appliance_id: Uuid) -> CoreResult<(Appliance, Resource)> {
        let appliance = self
            .store
            .find_appliance(appliance_id)
            .await?
            .ok_or(CoreError::NotFound("appliance"))?;
        let scope = self.property_scope(appliance.property_id).await?;
        let resource = Resource::Appliance {
            scope,
            floor_id: appliance.floor_id,
        };
        Ok((appliance, resource))
    }

    pub async fn issue(&self, issue_id: Uuid) -> CoreResult<(Issue, Resource)> {
        let issue = self
            .store
            .find_issue(issue_id)
            .await?
            .ok_or(CoreError::NotFound("issue"))?;
        let resource = self.issue_resource(&issue).await?;
        Ok((issue, resource))
    }

    pub async fn issue_resource(&self, issue: &Issue) -> CoreResult<Resource> {
        Ok(Resource::Issue {
            scope: self.property_scope(issue.property_id).await?,
            tenant_id: issue.tenant_id,
            vendor_id: issue.vendor_id,
        })
    }

    /// Account resource; tenants carry the scope of the property they live in
    pub async fn account(&self, user: &User) -> CoreResult<Resource> {
        let scope = match (user.role, user.property_id) {
            (Role::Tenant, Some(property_id)) => match self.store.find_property(property_id).await? {
                Some(property) => Some(scope_of(&property)),
                None => None,
            },
            _ => None,
        };
        Ok(Resource::Account {
            user_id: user.id,
            scope,
        })
    }
}

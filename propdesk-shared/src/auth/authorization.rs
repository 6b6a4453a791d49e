/// Authorization matrix
///
/// The single place that decides whether an actor may perform an action on
/// a target. Handlers and services never compare roles themselves; they
/// resolve the target's [`PropertyScope`] through the property hierarchy and
/// ask [`decide`].
///
/// The matrix is total and defaults to deny. Evaluation order:
///
/// 1. Actions on one's own account are always open to the account holder.
/// 2. Owners and managers must be verified.
/// 3. The role must carry the action on that kind of target at all
///    ([`DenyReason::RoleNotPermitted`] otherwise).
/// 4. The actor must stand in the right relation to the target: owner of
///    the property, its delegated manager, a tenant inside the assignment,
///    the reporter, or the assigned vendor.
///
/// Vendor-link requests have no actor; [`authorize_vendor_link`] handles them
/// and fails with "invalid or expired" rather than "forbidden" so a link
/// never reveals whether an issue exists.
///
/// # Example
///
/// ```
/// use propdesk_shared::auth::authorization::{decide, Action, Actor, Decision, PropertyScope, Resource};
/// use propdesk_shared::error::DenyReason;
/// use propdesk_shared::models::user::Role;
/// use uuid::Uuid;
///
/// let manager = Actor { user_id: Uuid::new_v4(), role: Role::Manager, verified: true, tenancy: None };
/// let scope = PropertyScope { property_id: Uuid::new_v4(), owner_id: Uuid::new_v4(), manager_id: None };
///
/// assert_eq!(
///     decide(&manager, Action::View, &Resource::Property(scope)),
///     Decision::Deny(DenyReason::NotDelegated)
/// );
/// ```

use uuid::Uuid;

use crate::error::{CoreError, CoreResult, DenyReason};
use crate::models::issue::IssueStatus;
use crate::models::user::Role;

/// Where a tenant lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tenancy {
    pub property_id: Uuid,

    /// `None` means the whole property
    pub floor_id: Option<Uuid>,
}

/// Authenticated party a decision is made for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: Uuid,
    pub role: Role,
    pub verified: bool,
    pub tenancy: Option<Tenancy>,
}

/// Ownership and delegation of the property a target hangs under
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyScope {
    pub property_id: Uuid,
    pub owner_id: Uuid,
    pub manager_id: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    View,
    Create,
    Update,
    Delete,
    AssignManager,
    InviteTenant,
    AssignTenant,
    ViewActivity,
    ReportIssue,
    AssignVendor,
    AcceptJob,
    RejectJob,
    SubmitBill,
    ApproveBill,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::View => "view",
            Action::Create => "create",
            Action::Update => "update",
            Action::Delete => "delete",
            Action::AssignManager => "assign a manager to",
            Action::InviteTenant => "invite a tenant to",
            Action::AssignTenant => "assign a tenant to",
            Action::ViewActivity => "view activity of",
            Action::ReportIssue => "report",
            Action::AssignVendor => "assign",
            Action::AcceptJob => "accept",
            Action::RejectJob => "reject",
            Action::SubmitBill => "bill",
            Action::ApproveBill => "approve",
        }
    }

    /// Actions that belong to whoever holds the job
    pub fn is_vendor_action(&self) -> bool {
        matches!(
            self,
            Action::View | Action::AcceptJob | Action::RejectJob | Action::SubmitBill
        )
    }
}

/// What is being acted on, with its scope already resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    /// Creating a new property
    Portfolio,

    /// Listing users of a role (vendors for assignment, managers for delegation)
    Directory(Role),

    /// Aggregates over the actor's own properties
    Dashboard,

    Property(PropertyScope),
    Floor {
        scope: PropertyScope,
        floor_id: Uuid,
    },
    Appliance {
        scope: PropertyScope,
        floor_id: Option<Uuid>,
    },
    Issue {
        scope: PropertyScope,
        tenant_id: Uuid,
        vendor_id: Option<Uuid>,
    },

    /// A user account; `scope` is the property a tenant account is assigned to
    Account {
        user_id: Uuid,
        scope: Option<PropertyScope>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Permit,
    Deny(DenyReason),
}

impl Decision {
    pub fn is_permit(&self) -> bool {
        matches!(self, Decision::Permit)
    }
}

pub fn decide(actor: &Actor, action: Action, resource: &Resource) -> Decision {
    if let Resource::Account { user_id, scope } = resource {
        return decide_account(actor, action, *user_id, scope.as_ref());
    }

    if actor.role.requires_verification() && !actor.verified {
        return Decision::Deny(DenyReason::Unverified);
    }

    match actor.role {
        Role::Owner => decide_owner(actor, action, resource),
        Role::Manager => decide_manager(actor, action, resource),
        Role::Tenant => decide_tenant(actor, action, resource),
        Role::Vendor => decide_vendor(actor, action, resource),
    }
}

/// [`decide`], as a `Result`
pub fn authorize(actor: &Actor, action: Action, resource: &Resource) -> CoreResult<()> {
    match decide(actor, action, resource) {
        Decision::Permit => Ok(()),
        Decision::Deny(reason) => {
            tracing::warn!(
                user_id = %actor.user_id,
                role = actor.role.as_str(),
                action = action.as_str(),
                reason = reason.as_str(),
                "Authorization denied"
            );
            Err(CoreError::Forbidden(reason))
        }
    }
}

/// Gate for the session-less vendor link
///
/// `token_matches` is the credential engine's verdict for this exact issue.
/// The link is dead once the issue leaves `assigned`/`in_progress`.
pub fn authorize_vendor_link(token_matches: bool, status: IssueStatus, action: Action) -> CoreResult<()> {
    if !token_matches || !status.is_with_vendor() {
        return Err(CoreError::InvalidOrExpiredCredential);
    }
    if !action.is_vendor_action() {
        return Err(CoreError::Forbidden(DenyReason::RoleNotPermitted));
    }
    Ok(())
}

fn decide_account(actor: &Actor, action: Action, user_id: Uuid, scope: Option<&PropertyScope>) -> Decision {
    if !matches!(action, Action::View | Action::Delete) {
        return Decision::Deny(DenyReason::RoleNotPermitted);
    }
    if actor.user_id == user_id {
        return Decision::Permit;
    }

    // Owners may remove tenants living in their properties
    match scope {
        Some(scope) if actor.role == Role::Owner && actor.verified && scope.owner_id == actor.user_id => {
            Decision::Permit
        }
        _ => Decision::Deny(DenyReason::NotSelf),
    }
}

fn scope_of(resource: &Resource) -> Option<&PropertyScope> {
    match resource {
        Resource::Property(scope)
        | Resource::Floor { scope, .. }
        | Resource::Appliance { scope, .. }
        | Resource::Issue { scope, .. } => Some(scope),
        _ => None,
    }
}

fn decide_owner(actor: &Actor, action: Action, resource: &Resource) -> Decision {
    let allowed = match resource {
        Resource::Portfolio => action == Action::Create,
        Resource::Dashboard => action == Action::View,
        Resource::Directory(role) => {
            action == Action::View && matches!(role, Role::Vendor | Role::Manager | Role::Tenant)
        }
        Resource::Property(_) => matches!(
            action,
            Action::View
                | Action::Update
                | Action::Delete
                | Action::AssignManager
                | Action::InviteTenant
                | Action::AssignTenant
                | Action::ViewActivity
        ),
        Resource::Floor { .. } => {
            matches!(action, Action::View | Action::Create | Action::Update | Action::Delete)
        }
        Resource::Appliance { .. } => {
            matches!(action, Action::View | Action::Create | Action::Update | Action::Delete)
        }
        Resource::Issue { .. } => {
            matches!(action, Action::View | Action::AssignVendor | Action::ApproveBill)
        }
        Resource::Account { .. } => false,
    };
    if !allowed {
        return Decision::Deny(DenyReason::RoleNotPermitted);
    }

    match scope_of(resource) {
        Some(scope) if scope.owner_id != actor.user_id => Decision::Deny(DenyReason::NotOwner),
        _ => Decision::Permit,
    }
}

fn decide_manager(actor: &Actor, action: Action, resource: &Resource) -> Decision {
    // Read and operate; never structural
    let allowed = match resource {
        Resource::Directory(role) => action == Action::View && *role == Role::Vendor,
        Resource::Dashboard => action == Action::View,
        Resource::Property(_) | Resource::Floor { .. } => action == Action::View,
        Resource::Appliance { .. } => matches!(action, Action::View | Action::Update),
        Resource::Issue { .. } => {
            matches!(action, Action::View | Action::AssignVendor | Action::ApproveBill)
        }
        Resource::Portfolio | Resource::Account { .. } => false,
    };
    if !allowed {
        return Decision::Deny(DenyReason::RoleNotPermitted);
    }

    match scope_of(resource) {
        Some(scope) if scope.manager_id != Some(actor.user_id) => {
            Decision::Deny(DenyReason::NotDelegated)
        }
        _ => Decision::Permit,
    }
}

fn decide_tenant(actor: &Actor, action: Action, resource: &Resource) -> Decision {
    let allowed = match resource {
        Resource::Property(_) | Resource::Floor { .. } => action == Action::View,
        Resource::Appliance { .. } => matches!(action, Action::View | Action::ReportIssue),
        Resource::Issue { .. } => action == Action::View,
        Resource::Portfolio
        | Resource::Dashboard
        | Resource::Directory(_)
        | Resource::Account { .. } => false,
    };
    if !allowed {
        return Decision::Deny(DenyReason::RoleNotPermitted);
    }

    if let Resource::Issue { tenant_id, .. } = resource {
        return if *tenant_id == actor.user_id {
            Decision::Permit
        } else {
            Decision::Deny(DenyReason::NotReporter)
        };
    }

    let Some(tenancy) = actor.tenancy else {
        return Decision::Deny(DenyReason::OutsideTenancy);
    };
    let inside = match resource {
        Resource::Property(scope) => scope.property_id == tenancy.property_id,
        Resource::Floor { scope, floor_id } => {
            scope.property_id == tenancy.property_id
                && tenancy.floor_id.map_or(true, |own| own == *floor_id)
        }
        Resource::Appliance { scope, floor_id } => {
            scope.property_id == tenancy.property_id
                && match (tenancy.floor_id, floor_id) {
                    (Some(own), Some(floor)) => own == *floor,
                    _ => true,
                }
        }
        _ => false,
    };

    if inside {
        Decision::Permit
    } else {
        Decision::Deny(DenyReason::OutsideTenancy)
    }
}

fn decide_vendor(actor: &Actor, action: Action, resource: &Resource) -> Decision {
    match resource {
        Resource::Issue { vendor_id, .. } if action.is_vendor_action() => {
            if *vendor_id == Some(actor.user_id) {
                Decision::Permit
            } else {
                Decision::Deny(DenyReason::NotAssignedVendor)
            }
        }
        _ => Decision::Deny(DenyReason::RoleNotPermitted),
    }
}

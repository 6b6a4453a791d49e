/// Core error taxonomy
///
/// Every operation of the credential engine, authorization matrix, issue
/// workflow and account/portfolio services fails with a [`CoreError`]. The
/// API layer maps each variant onto exactly one HTTP status, so callers can
/// always tell "forbidden" apart from "invalid state for this action".
///
/// # Example
///
/// ```
/// use propdesk_shared::error::{CoreError, DenyReason};
///
/// let err = CoreError::Forbidden(DenyReason::NotDelegated);
/// assert!(err.to_string().contains("forbidden"));
/// ```

use serde::Serialize;

use crate::models::issue::IssueStatus;
use crate::store::StoreError;

/// Why the authorization matrix refused an action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    /// Owner or manager account has not confirmed its email yet
    Unverified,

    /// Actor is an owner, but not of this property
    NotOwner,

    /// Actor is a manager, but this property is not delegated to them
    NotDelegated,

    /// Tenant acting outside their assigned property or floor
    OutsideTenancy,

    /// Tenant asking for an issue somebody else reported
    NotReporter,

    /// Vendor acting on an issue that is not assigned to them
    NotAssignedVendor,

    /// The role never carries this action, whatever the target
    RoleNotPermitted,

    /// Action targets another user's account
    NotSelf,
}

impl DenyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenyReason::Unverified => "account is not verified",
            DenyReason::NotOwner => "not the owner of this property",
            DenyReason::NotDelegated => "property is not delegated to this manager",
            DenyReason::OutsideTenancy => "outside the tenant's assignment",
            DenyReason::NotReporter => "issue was reported by another tenant",
            DenyReason::NotAssignedVendor => "issue is not assigned to this vendor",
            DenyReason::RoleNotPermitted => "role does not permit this action",
            DenyReason::NotSelf => "can only act on your own account",
        }
    }
}

impl std::fmt::Display for DenyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors surfaced by the core engine
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// No identity could be resolved for the request
    #[error("authentication required")]
    Unauthenticated,

    /// Identity resolved, action not permitted for this actor/target
    #[error("forbidden: {0}")]
    Forbidden(DenyReason),

    /// OTP or token failed validation. Deliberately carries no detail.
    #[error("invalid or expired")]
    InvalidOrExpiredCredential,

    /// Action is valid for the actor but not from the entity's current state
    #[error("cannot {action} an issue that is {status}")]
    IllegalStateTransition {
        status: IssueStatus,
        action: &'static str,
    },

    /// Target entity does not exist
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Input rejected before touching state
    #[error("validation failed: {0}")]
    Validation(String),

    /// Uniqueness or referential rule would be broken
    #[error("conflict: {0}")]
    Conflict(String),

    /// Storage collaborator failed
    #[error("storage error: {0}")]
    Storage(StoreError),

    /// Anything else that is not the caller's fault
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(msg) => CoreError::Conflict(msg),
            other => CoreError::Storage(other),
        }
    }
}

impl From<crate::auth::password::PasswordError> for CoreError {
    fn from(err: crate::auth::password::PasswordError) -> Self {
        CoreError::Internal(err.to_string())
    }
}

impl From<crate::auth::jwt::JwtError> for CoreError {
    fn from(err: crate::auth::jwt::JwtError) -> Self {
        CoreError::Internal(err.to_string())
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

/// Application services
///
/// Thin orchestration over the engine: each service owns the collaborators
/// it needs and exposes one method per operation. Handlers in the API crate
/// call these and nothing below them.
///
/// - [`accounts`]: registration, login, OTP flows, password reset, deletion
/// - [`invitations`]: tenant invitation and activation
/// - [`portfolio`]: properties, floors, appliances, directory, activity
/// - [`crate::workflow`]: the issue lifecycle

pub mod accounts;
pub mod invitations;
pub mod portfolio;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use crate::auth::credentials::CredentialEngine;
use crate::auth::session::IdentityResolver;
use crate::email::{EmailSender, LinkBuilder};
use crate::files::FileStore;
use crate::store::Store;
use crate::workflow::IssueWorkflow;

use self::{accounts::Accounts, invitations::Invitations, portfolio::Portfolio};

/// Collaborators shared by every service
#[derive(Clone)]
pub struct Dependencies {
    pub store: Arc<dyn Store>,
    pub credentials: Arc<CredentialEngine>,
    pub identity: Arc<IdentityResolver>,
    pub mailer: Arc<dyn EmailSender>,
    pub files: Arc<dyn FileStore>,
    pub links: LinkBuilder,
}

pub struct Services {
    pub store: Arc<dyn Store>,
    pub identity: Arc<IdentityResolver>,
    pub accounts: Accounts,
    pub invitations: Invitations,
    pub portfolio: Portfolio,
    pub workflow: IssueWorkflow,
}

impl Services {
    pub fn new(deps: Dependencies) -> Self {
        Self {
            accounts: Accounts::new(
                deps.store.clone(),
                deps.credentials.clone(),
                deps.identity.clone(),
                deps.mailer.clone(),
            ),
            invitations: Invitations::new(
                deps.store.clone(),
                deps.credentials.clone(),
                deps.identity.clone(),
                deps.mailer.clone(),
                deps.links.clone(),
            ),
            portfolio: Portfolio::new(deps.store.clone(), deps.files),
            workflow: IssueWorkflow::new(deps.store.clone(), deps.credentials, deps.mailer, deps.links),
            store: deps.store,
            identity: deps.identity,
        }
    }
}

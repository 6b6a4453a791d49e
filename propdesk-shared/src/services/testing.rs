//! Fixtures for the service unit tests

use std::sync::Arc;

use chrono::Duration;
use uuid::Uuid;

use super::{Dependencies, Services};
use crate::auth::authorization::Actor;
use crate::auth::credentials::{CredentialEngine, CredentialPolicy};
use crate::auth::session::{actor_of, IdentityResolver, SessionPolicy};
use crate::email::{LinkBuilder, MockEmailSender};
use crate::files::MemoryFileStore;
use crate::models::{
    property::Property,
    user::{NewUser, Role, TenantAssignment},
};
use crate::services::portfolio::PropertyInput;
use crate::store::{memory::MemoryStore, Store};

pub const TEST_SECRET: &str = "credential-secret-for-tests-0123456789";

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub mailer: MockEmailSender,
    pub files: MemoryFileStore,
    pub services: Services,
}

impl std::ops::Deref for Harness {
    type Target = Services;

    fn deref(&self) -> &Services {
        &self.services
    }
}

impl Harness {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let mailer = MockEmailSender::new();
        let files = MemoryFileStore::new();

        let credentials = CredentialEngine::new(CredentialPolicy::with_secret(TEST_SECRET))
            .expect("valid test policy");
        let identity = IdentityResolver::new(
            store.clone(),
            SessionPolicy {
                session_ttl: Duration::hours(12),
                jwt_secret: "jwt-secret-for-tests-0123456789abcdef".into(),
                access_token_ttl: Duration::minutes(30),
            },
        );

        let services = Services::new(Dependencies {
            store: store.clone(),
            credentials: Arc::new(credentials),
            identity: Arc::new(identity),
            mailer: Arc::new(mailer.clone()),
            files: Arc::new(files.clone()),
            links: LinkBuilder::new("https://propdesk.test"),
        });

        Self {
            store,
            mailer,
            files,
            services,
        }
    }

    async fn user(&self, name: &str, role: Role, assignment: Option<TenantAssignment>) -> Actor {
        let user = self
            .store
            .create_user(NewUser {
                username: name.into(),
                email: format!("{}@example.com", name),
                password_hash: crate::auth::password::hash_password("password123").expect("hash"),
                role,
                is_verified: true,
                assignment,
                ..NewUser::default()
            })
            .await
            .expect("create user");
        actor_of(&user)
    }

    pub async fn owner_with_property(&self, name: &str) -> (Actor, Property) {
        let owner = self.user(name, Role::Owner, None).await;
        let property = self
            .portfolio
            .create_property(
                &owner,
                PropertyInput {
                    name: format!("{} Court", name),
                    address: format!("{} Main St", name.len()),
                    property_type: Some("apartment".into()),
                },
            )
            .await
            .expect("create property");
        (owner, property)
    }

    pub async fn vendor(&self, name: &str) -> Actor {
        self.user(name, Role::Vendor, None).await
    }

    pub async fn manager_of(&self, name: &str, owner: &Actor, property_id: Uuid) -> Actor {
        let manager = self.user(name, Role::Manager, None).await;
        self.portfolio
            .assign_manager(owner, property_id, Some(manager.user_id))
            .await
            .expect("assign manager");
        manager
    }

    pub async fn tenant_in(&self, name: &str, property_id: Uuid, floor_id: Option<Uuid>) -> Actor {
        let assignment = TenantAssignment {
            property_id,
            floor_id,
            flat_no: None,
            room_no: None,
        };
        self.user(name, Role::Tenant, Some(assignment)).await
    }
}

fn last_body(mailer: &MockEmailSender, to: &str) -> String {
    mailer
        .last_to(to)
        .unwrap_or_else(|| panic!("no email sent to {}", to))
        .html_body
}

fn token_after(body: &str, marker: &str) -> String {
    let start = body
        .find(marker)
        .unwrap_or_else(|| panic!("no {} in email", marker))
        + marker.len();
    body[start..]
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric())
        .collect()
}

pub fn otp_from(mailer: &MockEmailSender, to: &str) -> String {
    token_after(&last_body(mailer, to), "<strong>")
}

pub fn activation_token_from(mailer: &MockEmailSender, to: &str) -> String {
    token_after(&last_body(mailer, to), "/v1/activate/")
}

pub fn vendor_token_from(mailer: &MockEmailSender, to: &str) -> String {
    token_after(&last_body(mailer, to), "token=")
}

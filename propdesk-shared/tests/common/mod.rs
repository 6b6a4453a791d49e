//! Shared fixtures for the engine integration tests
//!
//! Builds the full service graph over the in-memory store and a recording
//! mailer, and seeds the usual cast: an owner with a property, a manager,
//! a tenant and a vendor.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::Duration;
use propdesk_shared::{
    auth::{
        authorization::Actor,
        credentials::{CredentialEngine, CredentialPolicy},
        password::hash_password,
        session::{actor_of, IdentityResolver, SessionPolicy},
    },
    email::{LinkBuilder, MockEmailSender},
    files::MemoryFileStore,
    models::{
        appliance::Appliance,
        property::Property,
        user::{NewUser, Role, TenantAssignment, User},
    },
    services::{
        portfolio::{ApplianceInput, PropertyInput},
        Dependencies, Services,
    },
    store::{memory::MemoryStore, Store},
};
use uuid::Uuid;

pub const PASSWORD: &str = "password123";

pub struct World {
    pub store: Arc<MemoryStore>,
    pub mailer: MockEmailSender,
    pub services: Arc<Services>,
}

pub struct Cast {
    pub owner: Actor,
    pub manager: Actor,
    pub tenant: Actor,
    pub vendor: Actor,
    pub vendor_email: String,
    pub property: Property,
    pub appliance: Appliance,
}

impl World {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let mailer = MockEmailSender::new();

        let credentials = CredentialEngine::new(CredentialPolicy::with_secret(
            "integration-credential-secret-0123456789",
        ))
        .expect("valid policy");
        let identity = IdentityResolver::new(
            store.clone(),
            SessionPolicy {
                session_ttl: Duration::hours(12),
                jwt_secret: "integration-jwt-secret-0123456789abcdef".into(),
                access_token_ttl: Duration::minutes(30),
            },
        );

        let services = Services::new(Dependencies {
            store: store.clone(),
            credentials: Arc::new(credentials),
            identity: Arc::new(identity),
            mailer: Arc::new(mailer.clone()),
            files: Arc::new(MemoryFileStore::new()),
            links: LinkBuilder::new("https://propdesk.test"),
        });

        Self {
            store,
            mailer,
            services: Arc::new(services),
        }
    }

    pub async fn user(&self, name: &str, role: Role, assignment: Option<TenantAssignment>) -> User {
        self.store
            .create_user(NewUser {
                username: name.into(),
                email: format!("{}@example.com", name),
                password_hash: hash_password(PASSWORD).expect("hash"),
                role,
                is_verified: true,
                assignment,
                ..NewUser::default()
            })
            .await
            .expect("create user")
    }

    pub async fn property_of(&self, owner: &Actor, name: &str) -> Property {
        self.services
            .portfolio
            .create_property(
                owner,
                PropertyInput {
                    name: name.into(),
                    address: format!("1 {} Road", name),
                    property_type: None,
                },
            )
            .await
            .expect("create property")
    }

    /// Owner, delegated manager, tenant and vendor around one property with a boiler
    pub async fn cast(&self) -> Cast {
        let owner = actor_of(&self.user("olga", Role::Owner, None).await);
        let property = self.property_of(&owner, "Oak Court").await;

        let manager = actor_of(&self.user("mia", Role::Manager, None).await);
        self.services
            .portfolio
            .assign_manager(&owner, property.id, Some(manager.user_id))
            .await
            .expect("assign manager");

        let appliance = self
            .services
            .portfolio
            .add_appliance(
                &owner,
                property.id,
                ApplianceInput {
                    floor_id: None,
                    name: "Boiler".into(),
                    model: None,
                    color: None,
                    status: None,
                    location: Some("Basement".into()),
                    warranty_expiry: None,
                },
            )
            .await
            .expect("add appliance");

        let tenant = actor_of(
            &self
                .user(
                    "tina",
                    Role::Tenant,
                    Some(TenantAssignment {
                        property_id: property.id,
                        ..TenantAssignment::default()
                    }),
                )
                .await,
        );
        let vendor_user = self.user("vic", Role::Vendor, None).await;

        Cast {
            owner,
            manager,
            tenant,
            vendor: actor_of(&vendor_user),
            vendor_email: vendor_user.email,
            property,
            appliance,
        }
    }
}

fn token_after(body: &str, marker: &str) -> Option<String> {
    let start = body.find(marker)? + marker.len();
    Some(
        body[start..]
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric())
            .collect(),
    )
}

/// Raw vendor token from the latest assignment email to `to`
pub fn vendor_token(mailer: &MockEmailSender, to: &str) -> String {
    let message = mailer.last_to(to).expect("assignment email");
    token_after(&message.html_body, "token=").expect("token in link")
}

pub fn activation_token(mailer: &MockEmailSender, to: &str) -> String {
    let message = mailer.last_to(to).expect("activation email");
    token_after(&message.html_body, "/v1/activate/").expect("token in link")
}

pub fn random_id() -> Uuid {
    Uuid::new_v4()
}

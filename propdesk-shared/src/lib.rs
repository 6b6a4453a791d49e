//! # PropDesk Shared Library
//!
//! Core of the rental-property management backend: the data model, the
//! storage collaborator, credentials, authorization, the property hierarchy
//! and the issue workflow. The HTTP server in `propdesk-api` is a thin layer
//! over the [`services`] defined here.
//!
//! ## Module Organization
//!
//! - `models`: database models and data structures
//! - `store`: the `Store` trait with PostgreSQL and in-memory implementations
//! - `db`: connection pool and migrations
//! - `auth`: passwords, credentials, sessions and the authorization matrix
//! - `hierarchy`: owner → property → floor → appliance → issue resolution
//! - `workflow`: the issue lifecycle state machine
//! - `services`: account, invitation and portfolio operations
//! - `email`, `files`: outbound mail and upload storage collaborators
//! - `error`: the error taxonomy shared by every layer

pub mod auth;
pub mod db;
pub mod email;
pub mod error;
pub mod files;
pub mod hierarchy;
pub mod models;
pub mod services;
pub mod store;
pub mod workflow;

/// Current version of the PropDesk shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}

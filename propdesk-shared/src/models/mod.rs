/// Database models for propdesk
///
/// Each model carries its row type, creation input and the sqlx queries that
/// back the PostgreSQL store.
///
/// # Models
///
/// - `user`: accounts, roles, OTP state and tenant assignment
/// - `property`: properties and their floors
/// - `appliance`: appliances and warranty status
/// - `issue`: repair issues and guarded lifecycle transitions
/// - `pending_tenant`: tenant invitations with single-use activation tokens
/// - `session`: server-side login sessions
/// - `activity`: owner-facing activity log

pub mod activity;
pub mod appliance;
pub mod issue;
pub mod pending_tenant;
pub mod property;
pub mod session;
pub mod user;

/// API route handlers
///
/// Organised by resource:
///
/// - `health`: liveness and storage check
/// - `auth`: registration, login, OTP flows, password reset, `me`
/// - `activation`: tenant invitation redemption
/// - `properties`, `floors`, `appliances`: the property hierarchy
/// - `issues`: the maintenance lifecycle
/// - `vendor`: session-less vendor response links
/// - `invitations`, `users`, `directory`: people management and activity

pub mod activation;
pub mod appliances;
pub mod auth;
pub mod directory;
pub mod floors;
pub mod health;
pub mod invitations;
pub mod issues;
pub mod properties;
pub mod users;
pub mod vendor;

use serde::Serialize;

/// Body for endpoints that only acknowledge
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

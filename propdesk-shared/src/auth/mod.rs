/// Authentication and authorization
///
/// # Modules
///
/// - [`password`]: Argon2id password hashing and strength policy
/// - [`token`]: opaque random tokens and constant-time comparison
/// - [`credentials`]: OTP codes, activation and vendor-link tokens
/// - [`jwt`]: bearer access tokens for the OTP login
/// - [`session`]: maps a request to a session identity or a vendor capability
/// - [`authorization`]: the role/delegation matrix

pub mod authorization;
pub mod credentials;
pub mod jwt;
pub mod password;
pub mod session;
pub mod token;

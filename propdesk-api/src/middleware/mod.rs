/// Middleware modules for the API server
///
/// - `identity`: session cookie / bearer resolution for protected routes
/// - `security`: security response headers

pub mod identity;
pub mod security;

/// Middleware modules for the API server
///
/// - `auth`: session token authentication and role restriction
/// - `security`: security response headers

pub mod auth;
pub mod security;

//! HTTP request handlers (route handlers).
//!
//! Handlers extract request data, delegate to `services`, and map the
//! result to a JSON response.

/// API key management
pub mod api_keys;
/// Clerk webhook receiver
pub mod clerk_webhooks;
/// Upload and file management endpoints
pub mod files;
pub mod health;
pub mod users;

//! Data models representing database entities and API payloads.

/// API key lookup model
pub mod api_key;
/// Clerk webhook payloads
pub mod clerk;
/// Uploaded file model
pub mod file;
pub mod user;
/// Inbound webhook event records
pub mod webhook_event;

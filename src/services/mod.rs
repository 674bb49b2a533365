//! Business logic services.
//!
//! Services contain core business logic separated from HTTP handlers.
//! They own the SQL, talk to object storage and verify webhook signatures.

pub mod api_keys;
pub mod file_service;
pub mod storage;
pub mod svix;
pub mod user_sync;
pub mod webhook_processor;

//! API Key model for authentication.
//!
//! API keys let a client act on behalf of a synced user. They are stored in
//! the database as SHA-256 hashes; the raw key is shown exactly once, when
//! it is issued.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Prefix of every issued key, so leaked keys are easy to grep for.
pub const API_KEY_PREFIX: &str = "mb_";

/// Represents a stored API key (without its hash).
///
/// # Database Table
///
/// Maps to the `api_keys` table.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ApiKey {
    pub id: Uuid,

    /// Label chosen by the user
    pub name: String,

    /// Whether this key is active (can be revoked)
    pub is_active: bool,

    pub created_at: DateTime<Utc>,

    pub last_used_at: Option<DateTime<Utc>>,
}

/// An active API key joined with the state of the user it belongs to.
///
/// # Database Tables
///
/// Built from `api_keys` joined to `users` on `user_id`.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ApiKeyOwner {
    /// Unique identifier for this API key
    pub api_key_id: Uuid,

    pub user_id: Uuid,

    pub clerk_id: String,

    /// Whether the owning user is still active in Clerk
    ///
    /// Keys of deactivated users are recognised but rejected with 403.
    pub user_is_active: bool,

    pub last_used_at: Option<DateTime<Utc>>,
}

/// Request body for issuing a key.
#[derive(Debug, Deserialize)]
pub struct CreateApiKeyRequest {
    pub name: String,
}

/// A freshly issued key. `key` is never retrievable again.
#[derive(Debug, Serialize)]
pub struct IssuedApiKey {
    #[serde(flatten)]
    pub api_key: ApiKey,
    pub key: String,
}

/// Hash a raw API key the way it is stored in `api_keys.key_hash`.
///
/// Returns 64 lowercase hex characters.
pub fn hash_api_key(raw_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw_key.as_bytes());
    hex::encode(hasher.finalize())
}

/// Generate a new raw key: `mb_` followed by 32 random bytes as hex.
pub fn generate_api_key() -> String {
    let bytes: [u8; 32] = rand::random();
    format!("{API_KEY_PREFIX}{}", hex::encode(bytes))
}

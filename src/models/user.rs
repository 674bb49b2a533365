//! User data models.
//!
//! Users are never created through the REST API. They are mirrored from
//! Clerk by the webhook processor and only read by the API.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Represents a user record from the database.
///
/// # Database Table
///
/// Maps to the `users` table. `clerk_id` is the stable identifier assigned by
/// Clerk (`user_...`) and is unique; `id` is our own key used by foreign keys.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct User {
    pub id: Uuid,

    /// Clerk user identifier
    pub clerk_id: String,

    /// Primary email address as reported by Clerk
    pub email: Option<String>,

    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub username: Option<String>,
    pub image_url: Option<String>,

    /// False once a `user.deleted` event has been applied
    pub is_active: bool,

    pub deleted_at: Option<DateTime<Utc>>,

    /// Creation time on the Clerk side
    pub clerk_created_at: Option<DateTime<Utc>>,

    /// `updated_at` of the newest Clerk payload applied to this row
    pub clerk_updated_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Last time a webhook event touched this row
    pub last_synced_at: DateTime<Utc>,
}

/// Response body for `GET /api/v1/users/me`.
///
/// # JSON Example
///
/// ```json
/// {
///   "id": "550e8400-e29b-41d4-a716-446655440000",
///   "clerk_id": "user_29w83sxmDNGwOuEthce5gg56FcC",
///   "email": "ada@example.com",
///   "full_name": "Ada Lovelace",
///   "username": null,
///   "image_url": null,
///   "created_at": "2025-12-20T10:00:00Z"
/// }
/// ```
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub clerk_id: String,
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub username: Option<String>,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// First and last name joined by a space, if either is present.
    pub fn full_name(&self) -> Option<String> {
        let parts: Vec<&str> = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect();

        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" "))
        }
    }
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            full_name: user.full_name(),
            id: user.id,
            clerk_id: user.clerk_id,
            email: user.email,
            username: user.username,
            image_url: user.image_url,
            created_at: user.created_at,
        }
    }
}

#[cfg(test)]
pub(crate) fn sample_user() -> User {
    let now = Utc::now();
    User {
        id: Uuid::new_v4(),
        clerk_id: "user_29w83sxmDNGwOuEthce5gg56FcC".to_string(),
        email: Some("ada@example.com".to_string()),
        first_name: Some("Ada".to_string()),
        last_name: Some("Lovelace".to_string()),
        username: None,
        image_url: None,
        is_active: true,
        deleted_at: None,
        clerk_created_at: None,
        clerk_updated_at: None,
        created_at: now,
        updated_at: now,
        last_synced_at: now,
    }
}

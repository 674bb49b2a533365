//! Clerk webhook payload types.
//!
//! Clerk wraps every event in an envelope:
//!
//! ```json
//! {
//!   "object": "event",
//!   "type": "user.created",
//!   "data": { "id": "user_...", "email_addresses": [...], ... }
//! }
//! ```
//!
//! Only the user lifecycle events are interpreted. Other event types are
//! recorded and skipped.

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;

/// Raw event envelope as delivered by Clerk.
#[derive(Debug, Clone, Deserialize)]
pub struct ClerkEnvelope {
    #[serde(rename = "type")]
    pub event_type: String,

    pub data: serde_json::Value,
}

/// A user object inside `user.created` / `user.updated` events.
#[derive(Debug, Clone, Deserialize)]
pub struct ClerkUser {
    pub id: String,

    #[serde(default)]
    pub email_addresses: Vec<ClerkEmailAddress>,

    #[serde(default)]
    pub primary_email_address_id: Option<String>,

    #[serde(default)]
    pub first_name: Option<String>,

    #[serde(default)]
    pub last_name: Option<String>,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub image_url: Option<String>,

    /// Milliseconds since the Unix epoch
    #[serde(default)]
    pub created_at: Option<i64>,

    /// Milliseconds since the Unix epoch
    #[serde(default)]
    pub updated_at: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClerkEmailAddress {
    pub id: String,
    pub email_address: String,
}

/// Object sent with `user.deleted`.
#[derive(Debug, Clone, Deserialize)]
pub struct DeletedObject {
    #[serde(default)]
    pub id: Option<String>,

    #[serde(default)]
    pub deleted: bool,
}

/// A Clerk event after interpreting the envelope.
#[derive(Debug, Clone)]
pub enum ClerkEvent {
    UserCreated(ClerkUser),
    UserUpdated(ClerkUser),
    UserDeleted(DeletedObject),
    /// Any event type we do not act on, e.g. `session.created`
    Other(String),
}

impl ClerkEvent {
    pub const USER_CREATED: &'static str = "user.created";
    pub const USER_UPDATED: &'static str = "user.updated";
    pub const USER_DELETED: &'static str = "user.deleted";

    /// Interpret the envelope's `data` according to its `type`.
    pub fn from_envelope(envelope: ClerkEnvelope) -> Result<Self, serde_json::Error> {
        let event = match envelope.event_type.as_str() {
            Self::USER_CREATED => Self::UserCreated(serde_json::from_value(envelope.data)?),
            Self::USER_UPDATED => Self::UserUpdated(serde_json::from_value(envelope.data)?),
            Self::USER_DELETED => Self::UserDeleted(serde_json::from_value(envelope.data)?),
            _ => Self::Other(envelope.event_type),
        };
        Ok(event)
    }

    /// Parse a stored webhook payload.
    pub fn from_value(payload: serde_json::Value) -> Result<Self, serde_json::Error> {
        Self::from_envelope(serde_json::from_value(payload)?)
    }
}

impl ClerkUser {
    /// The primary email address, or the first listed one if the primary id
    /// does not resolve.
    pub fn primary_email(&self) -> Option<&str> {
        self.primary_email_address_id
            .as_deref()
            .and_then(|primary| self.email_addresses.iter().find(|e| e.id == primary))
            .or_else(|| self.email_addresses.first())
            .map(|e| e.email_address.as_str())
    }

    pub fn created_at_utc(&self) -> Option<DateTime<Utc>> {
        self.created_at.and_then(millis_to_utc)
    }

    pub fn updated_at_utc(&self) -> Option<DateTime<Utc>> {
        self.updated_at.and_then(millis_to_utc)
    }
}

fn millis_to_utc(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}

#[cfg(test)]
pub(crate) const USER_CREATED_FIXTURE: &str = r#"{
    "object": "event",
    "type": "user.created",
    "data": {
        "id": "user_29w83sxmDNGwOuEthce5gg56FcC",
        "object": "user",
        "email_addresses": [
            {"id": "idn_secondary", "email_address": "alt@example.com", "object": "email_address"},
            {"id": "idn_primary", "email_address": "ada@example.com", "object": "email_address"}
        ],
        "primary_email_address_id": "idn_primary",
        "first_name": "Ada",
        "last_name": "Lovelace",
        "username": null,
        "image_url": "https://img.clerk.com/ada.png",
        "created_at": 1654012591514,
        "updated_at": 1654012591835
    }
}"#;

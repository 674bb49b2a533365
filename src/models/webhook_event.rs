//! Inbound webhook event records.
//!
//! Every Clerk delivery that passes signature verification is stored before
//! it is applied, so that processing can be retried and replayed.
//!
//! # Lifecycle
//!
//! ```text
//! pending -> processing -> processed
//!                       -> failed   (permanent error or retries exhausted)
//!                       -> skipped  (event type we do not handle)
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Processing status, stored as the `webhook_event_status` Postgres enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize)]
#[sqlx(type_name = "webhook_event_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum WebhookEventStatus {
    Pending,
    Processing,
    Processed,
    Failed,
    Skipped,
}

impl WebhookEventStatus {
    /// Terminal states are never picked up again by startup recovery.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Processed | Self::Failed | Self::Skipped)
    }
}

/// Webhook event record.
///
/// # Database Table
///
/// Maps to the `webhook_events` table. `svix_id` is unique, which makes
/// redelivery of the same message a no-op.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct WebhookEvent {
    pub id: Uuid,

    /// Value of the `svix-id` header
    pub svix_id: String,

    /// Clerk event type, e.g. `user.created`
    pub event_type: String,

    /// Verified request body
    pub payload: serde_json::Value,

    /// Number of processing attempts so far, including earlier runs
    pub attempts: i32,

    pub last_error: Option<String>,

    pub received_at: DateTime<Utc>,
}

/// Response body returned to Clerk after a delivery is accepted.
#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub status: &'static str,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<Uuid>,
}

impl WebhookAck {
    pub fn accepted(event_id: Uuid) -> Self {
        Self {
            status: "accepted",
            event_id: Some(event_id),
        }
    }

    pub fn duplicate() -> Self {
        Self {
            status: "duplicate",
            event_id: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(!WebhookEventStatus::Pending.is_terminal());
        assert!(!WebhookEventStatus::Processing.is_terminal());
        assert!(WebhookEventStatus::Processed.is_terminal());
        assert!(WebhookEventStatus::Failed.is_terminal());
        assert!(WebhookEventStatus::Skipped.is_terminal());
    }

    #[test]
    fn duplicate_ack_omits_event_id() {
        let ack = serde_json::to_value(WebhookAck::duplicate()).unwrap();
        assert_eq!(ack, serde_json::json!({"status": "duplicate"}));
    }
}

//! Webhook processor - records Clerk deliveries and applies them.
//!
//! This service handles:
//! - Idempotent recording of verified deliveries (keyed by `svix-id`)
//! - Applying events to the `users` table through `user_sync`
//! - Retrying transient failures with exponential backoff
//! - Re-dispatching unfinished events after a restart
//!
//! Deliveries are acknowledged as soon as they are recorded; processing runs
//! on a spawned tokio task. The `webhook_events` table is the durable queue.

use std::time::Duration;

use uuid::Uuid;

use crate::{
    config::Config,
    db::DbPool,
    error::AppError,
    models::{
        clerk::ClerkEvent,
        webhook_event::{WebhookEvent, WebhookEventStatus},
    },
    services::user_sync,
};

/// Upper bound for a single backoff sleep.
const MAX_BACKOFF: Duration = Duration::from_secs(300);

/// Exponential backoff schedule for event processing.
///
/// The delay after failed attempt `n` (1-based) is
/// `min(base_delay * 2^(n-1), max_delay)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_attempts: config.sync_max_attempts.max(1),
            base_delay: Duration::from_millis(config.sync_base_delay_ms),
            max_delay: MAX_BACKOFF,
        }
    }

    /// Delay to wait after the given failed attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Store a verified delivery.
///
/// # Returns
///
/// - `Some(event)` for a new message, in `pending` status
/// - `None` if a message with the same `svix_id` was already recorded
pub async fn record_event(
    pool: &DbPool,
    svix_id: &str,
    event_type: &str,
    payload: &serde_json::Value,
) -> Result<Option<WebhookEvent>, AppError> {
    let event = sqlx::query_as::<_, WebhookEvent>(
        r#"
        INSERT INTO webhook_events (svix_id, event_type, payload)
        VALUES ($1, $2, $3)
        ON CONFLICT (svix_id) DO NOTHING
        RETURNING *
        "#,
    )
    .bind(svix_id)
    .bind(event_type)
    .bind(payload)
    .fetch_optional(pool)
    .await?;

    Ok(event)
}

/// Apply a parsed Clerk event.
///
/// # Returns
///
/// `Processed` for user lifecycle events, `Skipped` for anything else.
///
/// # Errors
///
/// - `InvalidRequest`: `user.deleted` without a user id (permanent)
/// - `Database`: Database error occurred (transient)
pub async fn apply_event(pool: &DbPool, event: &ClerkEvent) -> Result<WebhookEventStatus, AppError> {
    match event {
        ClerkEvent::UserCreated(user) | ClerkEvent::UserUpdated(user) => {
            user_sync::upsert_user(pool, user).await?;
            Ok(WebhookEventStatus::Processed)
        }
        ClerkEvent::UserDeleted(deleted) => {
            let clerk_id = deleted.id.as_deref().ok_or_else(|| {
                AppError::InvalidRequest("user.deleted event without user id".to_string())
            })?;
            if !deleted.deleted {
                tracing::warn!(clerk_id, "user.deleted payload without deleted flag");
            }
            user_sync::deactivate_user(pool, clerk_id).await?;
            Ok(WebhookEventStatus::Processed)
        }
        ClerkEvent::Other(event_type) => {
            tracing::debug!(event_type = %event_type, "Skipping unhandled Clerk event");
            Ok(WebhookEventStatus::Skipped)
        }
    }
}

/// Process one recorded event to a terminal status.
///
/// # Process
///
/// 1. Claim the event (`pending`/`processing` -> `processing`)
/// 2. Parse the stored payload; a parse failure is permanent
/// 3. Apply it, retrying transient errors per `policy`
/// 4. Store the final status, attempt count and last error
///
/// Returns the final status. An event that is already terminal is left
/// untouched and its current status is returned.
pub async fn process_event(
    pool: &DbPool,
    event_id: Uuid,
    policy: RetryPolicy,
) -> Result<WebhookEventStatus, AppError> {
    let Some(event) = claim_event(pool, event_id).await? else {
        let status: Option<WebhookEventStatus> =
            sqlx::query_scalar("SELECT status FROM webhook_events WHERE id = $1")
                .bind(event_id)
                .fetch_optional(pool)
                .await?;
        return status.ok_or_else(|| {
            AppError::InvalidRequest(format!("Webhook event {event_id} does not exist"))
        });
    };

    let parsed = match ClerkEvent::from_value(event.payload.clone()) {
        Ok(parsed) => parsed,
        Err(e) => {
            tracing::error!(event_id = %event.id, svix_id = %event.svix_id, error = %e, "Malformed Clerk payload");
            let message = format!("Malformed payload: {e}");
            finish_event(pool, event.id, WebhookEventStatus::Failed, Some(&message)).await?;
            return Ok(WebhookEventStatus::Failed);
        }
    };

    if event.attempts > 0 {
        tracing::info!(
            event_id = %event.id,
            previous_attempts = event.attempts,
            received_at = %event.received_at,
            last_error = event.last_error.as_deref().unwrap_or(""),
            "Resuming webhook event"
        );
    }

    let event_id = event.id;
    let parsed = &parsed;
    let (attempts, outcome) = retry_transient(policy, event_id, move |_attempt| async move {
        increment_attempts(pool, event_id).await?;
        apply_event(pool, parsed).await
    })
    .await;

    match outcome {
        Ok(status) => {
            finish_event(pool, event_id, status, None).await?;
            tracing::info!(
                event_id = %event_id,
                event_type = %event.event_type,
                attempts,
                ?status,
                "Webhook event processed"
            );
            Ok(status)
        }
        Err(e) => {
            tracing::error!(
                event_id = %event_id,
                event_type = %event.event_type,
                attempts,
                error = %e,
                "Webhook event failed permanently"
            );
            finish_event(pool, event_id, WebhookEventStatus::Failed, Some(&e.to_string())).await?;
            Ok(WebhookEventStatus::Failed)
        }
    }
}

/// Run `operation` until it succeeds, fails with a non-transient error, or
/// `policy.max_attempts` attempts have been made, sleeping per `policy`
/// between attempts.
///
/// `operation` receives the 1-based attempt number. Returns the number of
/// attempts made and the last outcome.
pub(crate) async fn retry_transient<T, F, Fut>(
    policy: RetryPolicy,
    event_id: Uuid,
    mut operation: F,
) -> (u32, Result<T, AppError>)
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, AppError>>,
{
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        match operation(attempt).await {
            Err(e) if e.is_transient() && attempt < policy.max_attempts => {
                let delay = policy.delay_for(attempt);
                tracing::warn!(
                    event_id = %event_id,
                    attempt,
                    retry_in_ms = delay.as_millis() as u64,
                    error = %e,
                    "Webhook event failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            outcome => return (attempt, outcome),
        }
    }
}

/// Run `process_event` on a background task.
pub fn spawn_processing(pool: DbPool, event_id: Uuid, policy: RetryPolicy) {
    tokio::spawn(async move {
        if let Err(e) = process_event(&pool, event_id, policy).await {
            tracing::error!(event_id = %event_id, error = %e, "Webhook event processing aborted");
        }
    });
}

/// Re-dispatch events left unfinished by a previous run.
///
/// Events are processed one after another in arrival order on a single
/// background task. Returns how many events were found.
pub async fn recover_pending(pool: &DbPool, policy: RetryPolicy) -> Result<usize, AppError> {
    let event_ids: Vec<Uuid> = sqlx::query_scalar(
        r#"
        SELECT id FROM webhook_events
        WHERE status IN ('pending', 'processing')
        ORDER BY received_at ASC
        "#,
    )
    .fetch_all(pool)
    .await?;

    let count = event_ids.len();
    if count > 0 {
        let pool = pool.clone();
        tokio::spawn(async move {
            for event_id in event_ids {
                if let Err(e) = process_event(&pool, event_id, policy).await {
                    tracing::error!(event_id = %event_id, error = %e, "Recovered event processing aborted");
                }
            }
        });
    }

    Ok(count)
}

async fn claim_event(pool: &DbPool, event_id: Uuid) -> Result<Option<WebhookEvent>, AppError> {
    let event = sqlx::query_as::<_, WebhookEvent>(
        r#"
        UPDATE webhook_events
        SET status = 'processing'
        WHERE id = $1 AND status IN ('pending', 'processing')
        RETURNING *
        "#,
    )
    .bind(event_id)
    .fetch_optional(pool)
    .await?;

    Ok(event)
}

async fn increment_attempts(pool: &DbPool, event_id: Uuid) -> Result<(), AppError> {
    sqlx::query("UPDATE webhook_events SET attempts = attempts + 1 WHERE id = $1")
        .bind(event_id)
        .execute(pool)
        .await?;
    Ok(())
}

async fn finish_event(
    pool: &DbPool,
    event_id: Uuid,
    status: WebhookEventStatus,
    error: Option<&str>,
) -> Result<(), AppError> {
    debug_assert!(status.is_terminal());

    sqlx::query(
        r#"
        UPDATE webhook_events
        SET status = $2,
            last_error = $3,
            processed_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(event_id)
    .bind(status)
    .bind(error)
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;

    #[test]
    fn backoff_doubles_until_capped() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for(2), Duration::from_secs(1));
        assert_eq!(policy.delay_for(3), Duration::from_secs(2));
        assert_eq!(policy.delay_for(4), Duration::from_secs(4));
        assert_eq!(policy.delay_for(5), Duration::from_secs(5));
        assert_eq!(policy.delay_for(40), Duration::from_secs(5));
    }

    #[test]
    fn backoff_never_overflows() {
        let policy = RetryPolicy {
            max_attempts: u32::MAX,
            base_delay: Duration::from_secs(u64::MAX / 2),
            max_delay: MAX_BACKOFF,
        };
        assert_eq!(policy.delay_for(u32::MAX), MAX_BACKOFF);
    }

    #[test]
    fn policy_from_config() {
        let mut config = test_config();
        config.sync_max_attempts = 0;
        config.sync_base_delay_ms = 250;
        let policy = RetryPolicy::from_config(&config);
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.base_delay, Duration::from_millis(250));
        assert_eq!(policy.delay_for(1), Duration::from_millis(250));
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        }
    }

    #[tokio::test]
    async fn transient_errors_are_retried_until_success() {
        let (attempts, outcome) = retry_transient(fast_policy(5), Uuid::nil(), |attempt| async move {
            if attempt < 3 {
                Err(AppError::Database(sqlx::Error::PoolTimedOut))
            } else {
                Ok(attempt)
            }
        })
        .await;
        assert_eq!(attempts, 3);
        assert_eq!(outcome.unwrap(), 3);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let (attempts, outcome) = retry_transient(fast_policy(5), Uuid::nil(), |_| async {
            Err::<(), _>(AppError::InvalidRequest("user.deleted event without user id".into()))
        })
        .await;
        assert_eq!(attempts, 1);
        assert!(matches!(outcome, Err(AppError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn retries_stop_at_max_attempts() {
        let (attempts, outcome) = retry_transient(fast_policy(3), Uuid::nil(), |_| async {
            Err::<(), _>(AppError::Storage("unreachable".into()))
        })
        .await;
        assert_eq!(attempts, 3);
        assert!(matches!(outcome, Err(AppError::Storage(_))));
    }

    #[tokio::test]
    async fn single_attempt_policy_never_sleeps() {
        let (attempts, outcome) = retry_transient(fast_policy(1), Uuid::nil(), |_| async {
            Err::<(), _>(AppError::Database(sqlx::Error::PoolTimedOut))
        })
        .await;
        assert_eq!(attempts, 1);
        assert!(outcome.is_err());
    }

    async fn event_row(pool: &DbPool, event_id: Uuid) -> (WebhookEventStatus, i32, Option<String>) {
        sqlx::query_as("SELECT status, attempts, last_error FROM webhook_events WHERE id = $1")
            .bind(event_id)
            .fetch_one(pool)
            .await
            .unwrap()
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL pointing at a Postgres server"]
    async fn duplicate_svix_id_is_recorded_once(pool: DbPool) {
        let payload = serde_json::json!({"type": "session.created", "data": {}});
        let first = record_event(&pool, "msg_dup", "session.created", &payload)
            .await
            .unwrap();
        assert!(first.is_some());
        let second = record_event(&pool, "msg_dup", "session.created", &payload)
            .await
            .unwrap();
        assert!(second.is_none());
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL pointing at a Postgres server"]
    async fn user_created_event_is_applied(pool: DbPool) {
        let payload: serde_json::Value =
            serde_json::from_str(crate::models::clerk::USER_CREATED_FIXTURE).unwrap();
        let event = record_event(&pool, "msg_created", "user.created", &payload)
            .await
            .unwrap()
            .unwrap();

        let status = process_event(&pool, event.id, fast_policy(3)).await.unwrap();
        assert_eq!(status, WebhookEventStatus::Processed);

        let (stored, attempts, last_error) = event_row(&pool, event.id).await;
        assert_eq!(stored, WebhookEventStatus::Processed);
        assert_eq!(attempts, 1);
        assert!(last_error.is_none());

        let user = user_sync::get_user_by_clerk_id(&pool, "user_29w83sxmDNGwOuEthce5gg56FcC")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(user.email.as_deref(), Some("ada@example.com"));

        // Terminal events are left alone
        let again = process_event(&pool, event.id, fast_policy(3)).await.unwrap();
        assert_eq!(again, WebhookEventStatus::Processed);
        assert_eq!(event_row(&pool, event.id).await.1, 1);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL pointing at a Postgres server"]
    async fn unknown_event_type_is_skipped(pool: DbPool) {
        let payload = serde_json::json!({"type": "session.created", "data": {"id": "sess_1"}});
        let event = record_event(&pool, "msg_session", "session.created", &payload)
            .await
            .unwrap()
            .unwrap();
        let status = process_event(&pool, event.id, fast_policy(3)).await.unwrap();
        assert_eq!(status, WebhookEventStatus::Skipped);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL pointing at a Postgres server"]
    async fn permanent_failure_is_recorded_after_one_attempt(pool: DbPool) {
        let payload = serde_json::json!({"type": "user.deleted", "data": {"deleted": true}});
        let event = record_event(&pool, "msg_no_id", "user.deleted", &payload)
            .await
            .unwrap()
            .unwrap();

        let status = process_event(&pool, event.id, fast_policy(5)).await.unwrap();
        assert_eq!(status, WebhookEventStatus::Failed);

        let (stored, attempts, last_error) = event_row(&pool, event.id).await;
        assert_eq!(stored, WebhookEventStatus::Failed);
        assert_eq!(attempts, 1);
        assert!(last_error.is_some());
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL pointing at a Postgres server"]
    async fn malformed_payload_fails_without_attempts(pool: DbPool) {
        let payload = serde_json::json!({"type": "user.created", "data": {"first_name": "no id"}});
        let event = record_event(&pool, "msg_malformed", "user.created", &payload)
            .await
            .unwrap()
            .unwrap();

        let status = process_event(&pool, event.id, fast_policy(5)).await.unwrap();
        assert_eq!(status, WebhookEventStatus::Failed);

        let (_, attempts, last_error) = event_row(&pool, event.id).await;
        assert_eq!(attempts, 0);
        assert!(last_error.unwrap().starts_with("Malformed payload"));
    }
}

//! User synchronization - mirrors Clerk users into the `users` table.
//!
//! This service handles:
//! - Inserting users on `user.created`
//! - Updating profile fields on `user.updated` (inserting if we missed the create)
//! - Soft-deleting users on `user.deleted`
//!
//! # Ordering
//!
//! SVIX does not guarantee delivery order and events are processed
//! concurrently, so every write is guarded:
//!
//! - A payload older than the stored `clerk_updated_at` is ignored. So is a
//!   payload without `updated_at` once a timestamped version is stored.
//! - A deleted user is never reactivated. Clerk never reuses user ids, so any
//!   create/update seen after a delete is stale. A delete that arrives before
//!   the create leaves a tombstone row for the same reason.

use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    models::{clerk::ClerkUser, user::User},
};

/// Insert or update a user from a Clerk user object.
///
/// # Returns
///
/// The stored row after the write. When the payload is stale or the user is
/// deleted, the row is returned unchanged.
///
/// # Errors
///
/// - `Database`: Database error occurred
pub async fn upsert_user(pool: &DbPool, clerk_user: &ClerkUser) -> Result<User, AppError> {
    let written = sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (
            clerk_id,
            email,
            first_name,
            last_name,
            username,
            image_url,
            clerk_created_at,
            clerk_updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT (clerk_id) DO UPDATE
        SET email = EXCLUDED.email,
            first_name = EXCLUDED.first_name,
            last_name = EXCLUDED.last_name,
            username = EXCLUDED.username,
            image_url = EXCLUDED.image_url,
            clerk_created_at = COALESCE(users.clerk_created_at, EXCLUDED.clerk_created_at),
            clerk_updated_at = COALESCE(EXCLUDED.clerk_updated_at, users.clerk_updated_at),
            updated_at = NOW(),
            last_synced_at = NOW()
        WHERE users.deleted_at IS NULL
          AND (
              users.clerk_updated_at IS NULL
              OR EXCLUDED.clerk_updated_at >= users.clerk_updated_at
          )
        RETURNING *
        "#,
    )
    .bind(&clerk_user.id)
    .bind(clerk_user.primary_email())
    .bind(&clerk_user.first_name)
    .bind(&clerk_user.last_name)
    .bind(&clerk_user.username)
    .bind(&clerk_user.image_url)
    .bind(clerk_user.created_at_utc())
    .bind(clerk_user.updated_at_utc())
    .fetch_optional(pool)
    .await?;

    if let Some(user) = written {
        tracing::info!(clerk_id = %user.clerk_id, user_id = %user.id, "User synced");
        return Ok(user);
    }

    // The guard rejected the write, the row exists
    let current = get_user_by_clerk_id(pool, &clerk_user.id)
        .await?
        .ok_or(AppError::UserNotFound)?;

    tracing::info!(
        clerk_id = %current.clerk_id,
        is_active = current.is_active,
        "Ignored stale user payload"
    );

    Ok(current)
}

/// Soft-delete a user.
///
/// Files and API keys are kept; API keys of an inactive user are rejected
/// by the auth middleware. When the user is unknown a tombstone row is
/// written so that a late `user.created` cannot resurrect it.
pub async fn deactivate_user(pool: &DbPool, clerk_id: &str) -> Result<User, AppError> {
    let user = sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (clerk_id, is_active, deleted_at)
        VALUES ($1, FALSE, NOW())
        ON CONFLICT (clerk_id) DO UPDATE
        SET is_active = FALSE,
            deleted_at = COALESCE(users.deleted_at, NOW()),
            updated_at = NOW(),
            last_synced_at = NOW()
        RETURNING *
        "#,
    )
    .bind(clerk_id)
    .fetch_one(pool)
    .await?;

    tracing::info!(clerk_id, user_id = %user.id, "User deactivated");

    Ok(user)
}

/// Get user by ID.
pub async fn get_user_by_id(pool: &DbPool, user_id: Uuid) -> Result<Option<User>, AppError> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

    Ok(user)
}

/// Get user by Clerk ID.
pub async fn get_user_by_clerk_id(pool: &DbPool, clerk_id: &str) -> Result<Option<User>, AppError> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE clerk_id = $1")
        .bind(clerk_id)
        .fetch_optional(pool)
        .await?;

    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::clerk::ClerkEmailAddress;

    fn clerk_user(first_name: &str, updated_at: Option<i64>) -> ClerkUser {
        ClerkUser {
            id: "user_sync_test".into(),
            email_addresses: vec![ClerkEmailAddress {
                id: "idn_1".into(),
                email_address: "grace@example.com".into(),
            }],
            primary_email_address_id: Some("idn_1".into()),
            first_name: Some(first_name.into()),
            last_name: Some("Hopper".into()),
            username: None,
            image_url: None,
            created_at: Some(1_700_000_000_000),
            updated_at,
        }
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL pointing at a Postgres server"]
    async fn newer_payload_updates_profile(pool: DbPool) {
        upsert_user(&pool, &clerk_user("Grace", Some(1_700_000_001_000)))
            .await
            .unwrap();
        let user = upsert_user(&pool, &clerk_user("Amazing Grace", Some(1_700_000_002_000)))
            .await
            .unwrap();
        assert_eq!(user.first_name.as_deref(), Some("Amazing Grace"));
        assert_eq!(user.email.as_deref(), Some("grace@example.com"));
        assert!(user.is_active);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL pointing at a Postgres server"]
    async fn stale_payload_is_ignored(pool: DbPool) {
        upsert_user(&pool, &clerk_user("Current", Some(1_700_000_002_000)))
            .await
            .unwrap();
        let user = upsert_user(&pool, &clerk_user("Outdated", Some(1_700_000_001_000)))
            .await
            .unwrap();
        assert_eq!(user.first_name.as_deref(), Some("Current"));
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL pointing at a Postgres server"]
    async fn untimestamped_payload_does_not_overwrite_timestamped_row(pool: DbPool) {
        upsert_user(&pool, &clerk_user("Current", Some(1_700_000_002_000)))
            .await
            .unwrap();
        let user = upsert_user(&pool, &clerk_user("Unknown age", None))
            .await
            .unwrap();
        assert_eq!(user.first_name.as_deref(), Some("Current"));
        assert_eq!(
            user.clerk_updated_at.unwrap().timestamp_millis(),
            1_700_000_002_000
        );
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL pointing at a Postgres server"]
    async fn untimestamped_payloads_apply_to_untimestamped_row(pool: DbPool) {
        upsert_user(&pool, &clerk_user("First", None)).await.unwrap();
        let user = upsert_user(&pool, &clerk_user("Second", None)).await.unwrap();
        assert_eq!(user.first_name.as_deref(), Some("Second"));
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL pointing at a Postgres server"]
    async fn deleted_user_is_never_reactivated(pool: DbPool) {
        upsert_user(&pool, &clerk_user("Grace", Some(1_700_000_001_000)))
            .await
            .unwrap();
        let deleted = deactivate_user(&pool, "user_sync_test").await.unwrap();
        assert!(!deleted.is_active);
        assert!(deleted.deleted_at.is_some());

        let user = upsert_user(&pool, &clerk_user("Revived", Some(1_700_000_009_000)))
            .await
            .unwrap();
        assert!(!user.is_active);
        assert_eq!(user.first_name.as_deref(), Some("Grace"));
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL pointing at a Postgres server"]
    async fn delete_before_create_leaves_tombstone(pool: DbPool) {
        let tombstone = deactivate_user(&pool, "user_sync_test").await.unwrap();
        assert!(!tombstone.is_active);
        assert!(tombstone.email.is_none());

        let user = upsert_user(&pool, &clerk_user("Late create", Some(1_700_000_001_000)))
            .await
            .unwrap();
        assert_eq!(user.id, tombstone.id);
        assert!(!user.is_active);
        assert!(user.first_name.is_none());
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL pointing at a Postgres server"]
    async fn repeated_delete_keeps_first_deletion_time(pool: DbPool) {
        let first = deactivate_user(&pool, "user_sync_test").await.unwrap();
        let second = deactivate_user(&pool, "user_sync_test").await.unwrap();
        assert_eq!(first.deleted_at, second.deleted_at);
    }
}

//! API key service - issuing, listing and revoking a user's keys.
//!
//! The first key of a user is issued out of band with
//! `matchbot-api issue-api-key <clerk_id>`; further keys can be managed over
//! the API with an existing one.

use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    models::api_key::{ApiKey, IssuedApiKey, generate_api_key, hash_api_key},
    services::user_sync,
};

const MAX_NAME_CHARS: usize = 100;

/// Issue a new key for a user.
///
/// # Errors
///
/// - `InvalidRequest`: empty or overlong name
/// - `Database`: Database error occurred
pub async fn create_api_key(
    pool: &DbPool,
    user_id: Uuid,
    name: &str,
) -> Result<IssuedApiKey, AppError> {
    let name = validate_name(name)?;
    let raw_key = generate_api_key();

    let api_key = sqlx::query_as::<_, ApiKey>(
        r#"
        INSERT INTO api_keys (user_id, key_hash, name)
        VALUES ($1, $2, $3)
        RETURNING id, name, is_active, created_at, last_used_at
        "#,
    )
    .bind(user_id)
    .bind(hash_api_key(&raw_key))
    .bind(name)
    .fetch_one(pool)
    .await?;

    tracing::info!(%user_id, api_key_id = %api_key.id, "API key issued");

    Ok(IssuedApiKey {
        api_key,
        key: raw_key,
    })
}

/// Issue a key for a user identified by Clerk id. Used for bootstrapping.
///
/// # Errors
///
/// - `UserNotFound`: no synced user with that Clerk id
/// - `Forbidden`: the user was deleted in Clerk
pub async fn issue_for_clerk_user(
    pool: &DbPool,
    clerk_id: &str,
    name: &str,
) -> Result<IssuedApiKey, AppError> {
    let user = user_sync::get_user_by_clerk_id(pool, clerk_id)
        .await?
        .ok_or(AppError::UserNotFound)?;
    if !user.is_active {
        return Err(AppError::Forbidden);
    }

    create_api_key(pool, user.id, name).await
}

/// Active keys of a user, newest first.
pub async fn list_api_keys(pool: &DbPool, user_id: Uuid) -> Result<Vec<ApiKey>, AppError> {
    let keys = sqlx::query_as::<_, ApiKey>(
        r#"
        SELECT id, name, is_active, created_at, last_used_at
        FROM api_keys
        WHERE user_id = $1 AND is_active = TRUE
        ORDER BY created_at DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(keys)
}

/// Revoke one of the user's keys. Revoking the key in use is allowed.
///
/// # Errors
///
/// - `ApiKeyNotFound`: unknown, already revoked, or owned by someone else
pub async fn revoke_api_key(pool: &DbPool, user_id: Uuid, key_id: Uuid) -> Result<(), AppError> {
    let result = sqlx::query(
        "UPDATE api_keys SET is_active = FALSE WHERE id = $1 AND user_id = $2 AND is_active = TRUE",
    )
    .bind(key_id)
    .bind(user_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::ApiKeyNotFound);
    }

    tracing::info!(%user_id, api_key_id = %key_id, "API key revoked");
    Ok(())
}

fn validate_name(name: &str) -> Result<&str, AppError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::InvalidRequest("Key name must not be empty".to_string()));
    }
    if name.chars().count() > MAX_NAME_CHARS {
        return Err(AppError::InvalidRequest(format!(
            "Key name exceeds {MAX_NAME_CHARS} characters"
        )));
    }
    Ok(name)
}

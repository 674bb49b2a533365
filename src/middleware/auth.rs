//! API key authentication middleware.
//!
//! This middleware intercepts every protected request to:
//! 1. Extract the API key from the Authorization header
//! 2. Hash it and look up the key together with its owning user
//! 3. Reject unknown keys with 401 and keys of deactivated users with 403
//! 4. Inject the authenticated user into the request

use crate::{
    db::DbPool,
    error::AppError,
    models::api_key::{ApiKeyOwner, hash_api_key},
};
use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

/// Authentication context attached to authenticated requests.
///
/// Handlers extract it with `Extension<AuthContext>`.
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// Internal id of the authenticated user
    pub user_id: Uuid,

    pub clerk_id: String,
}

/// API key authentication middleware function.
///
/// # Headers
///
/// ```text
/// Authorization: Bearer abc123xyz
/// ```
///
/// # Returns
///
/// - `Ok(Response)` if authenticated (calls next handler)
/// - `Err(AppError::InvalidApiKey)` for a missing, malformed or unknown key (401)
/// - `Err(AppError::Forbidden)` when the key's user was deleted in Clerk (403)
pub async fn auth_middleware(
    State(pool): State<DbPool>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let api_key = bearer_token(request.headers()).ok_or(AppError::InvalidApiKey)?;
    let key_hash = hash_api_key(api_key);

    let owner = sqlx::query_as::<_, ApiKeyOwner>(
        r#"
        SELECT k.id AS api_key_id,
               k.user_id,
               u.clerk_id,
               u.is_active AS user_is_active,
               k.last_used_at
        FROM api_keys k
        JOIN users u ON u.id = k.user_id
        WHERE k.key_hash = $1 AND k.is_active = TRUE
        "#,
    )
    .bind(&key_hash)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::InvalidApiKey)?;

    if !owner.user_is_active {
        tracing::warn!(clerk_id = %owner.clerk_id, "API key used by deactivated user");
        return Err(AppError::Forbidden);
    }

    touch_last_used(&pool, &owner).await;

    request.extensions_mut().insert(AuthContext {
        user_id: owner.user_id,
        clerk_id: owner.clerk_id,
    });

    Ok(next.run(request).await)
}

/// Extract `<token>` from `Authorization: Bearer <token>`.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Record key usage at most once a minute. Failures are only logged.
async fn touch_last_used(pool: &DbPool, owner: &ApiKeyOwner) {
    let stale = owner
        .last_used_at
        .is_none_or(|at| chrono::Utc::now() - at > chrono::Duration::minutes(1));
    if !stale {
        return;
    }

    if let Err(e) = sqlx::query("UPDATE api_keys SET last_used_at = NOW() WHERE id = $1")
        .bind(owner.api_key_id)
        .execute(pool)
        .await
    {
        tracing::warn!(api_key_id = %owner.api_key_id, error = %e, "Failed to update last_used_at");
    }
}

//! User HTTP handlers.

use axum::{Extension, Json, extract::State};

use crate::{
    db::DbPool,
    error::AppError,
    middleware::auth::AuthContext,
    models::user::UserResponse,
    services::user_sync,
};

/// Profile of the authenticated user.
///
/// # Endpoint
///
/// `GET /api/v1/users/me`
///
/// # Response
///
/// - **200**: the user as last synced from Clerk
/// - **401**: invalid API key
/// - **403**: user deactivated
pub async fn get_current_user(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<UserResponse>, AppError> {
    let user = user_sync::get_user_by_id(&pool, auth.user_id)
        .await?
        .ok_or_else(|| {
            tracing::warn!(clerk_id = %auth.clerk_id, "Authenticated user row vanished");
            AppError::UserNotFound
        })?;

    Ok(Json(user.into()))
}

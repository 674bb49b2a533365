//! API key HTTP handlers.
//!
//! - POST /api/v1/api-keys - Issue a key (raw key returned once)
//! - GET /api/v1/api-keys - List active keys
//! - DELETE /api/v1/api-keys/{id} - Revoke a key

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    middleware::auth::AuthContext,
    models::api_key::{ApiKey, CreateApiKeyRequest},
    services::api_keys,
};

/// Issue an additional key for the authenticated user.
///
/// # Response
///
/// - **201 Created**: key metadata plus the raw `key`
/// - **400**: empty or overlong name
pub async fn create_api_key(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<CreateApiKeyRequest>,
) -> Result<impl IntoResponse, AppError> {
    let issued = api_keys::create_api_key(&pool, auth.user_id, &request.name).await?;

    Ok((StatusCode::CREATED, Json(issued)))
}

pub async fn list_api_keys(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Vec<ApiKey>>, AppError> {
    let keys = api_keys::list_api_keys(&pool, auth.user_id).await?;

    Ok(Json(keys))
}

/// Revoke a key. Returns 204 No Content, 404 if unknown.
pub async fn revoke_api_key(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(key_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    api_keys::revoke_api_key(&pool, auth.user_id, key_id).await?;

    Ok(StatusCode::NO_CONTENT)
}

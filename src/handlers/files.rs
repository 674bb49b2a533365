//! File HTTP handlers.
//!
//! This module implements the upload and file management endpoints:
//! - POST /api/v1/files/presigned-upload - Announce a file, get an upload form
//! - POST /api/v1/files/{id}/complete - Confirm the browser upload finished
//! - GET /api/v1/files - List files
//! - GET /api/v1/files/{id} - Get one file
//! - GET /api/v1/files/{id}/download - Presigned download URL
//! - DELETE /api/v1/files/{id} - Delete object and record

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use crate::{
    error::AppError,
    middleware::auth::AuthContext,
    models::file::{
        DownloadResponse, FileResponse, ListFilesQuery, PresignedUploadRequest,
    },
    services::file_service,
    state::AppState,
};

/// Announce an upload and receive a presigned POST form.
///
/// # Request Body
///
/// ```json
/// {
///   "filename": "bank-statement-2025-11.csv",
///   "content_type": "text/csv",
///   "size_bytes": 48213
/// }
/// ```
///
/// # Response
///
/// - **201 Created**: `PresignedUploadResponse` (bucket, key, url, form fields, expiry)
/// - **400**: invalid filename or size
/// - **413**: size above the configured maximum
/// - **415**: content type not accepted
pub async fn create_presigned_upload(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<PresignedUploadRequest>,
) -> Result<impl IntoResponse, AppError> {
    let response = file_service::create_upload(
        &state.pool,
        &state.storage,
        state.upload_limits,
        auth.user_id,
        request,
    )
    .await?;

    Ok((StatusCode::CREATED, Json(response)))
}

/// Confirm that the browser upload to storage succeeded.
///
/// # Response
///
/// - **200**: the file, now `uploaded`
/// - **404**: unknown file
/// - **409**: object missing in storage, or file already past the upload stage
pub async fn complete_upload(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(file_id): Path<Uuid>,
) -> Result<Json<FileResponse>, AppError> {
    let file =
        file_service::complete_upload(&state.pool, &state.storage, auth.user_id, file_id).await?;

    Ok(Json(file.into()))
}

/// List the user's files, newest first. Optional `?status=uploaded` filter.
pub async fn list_files(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<ListFilesQuery>,
) -> Result<Json<Vec<FileResponse>>, AppError> {
    let files = file_service::list_files(&state.pool, auth.user_id, query.status).await?;

    Ok(Json(files.into_iter().map(Into::into).collect()))
}

pub async fn get_file(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(file_id): Path<Uuid>,
) -> Result<Json<FileResponse>, AppError> {
    let file = file_service::get_file(&state.pool, auth.user_id, file_id).await?;

    Ok(Json(file.into()))
}

/// Presigned GET URL, valid as long as upload URLs are.
///
/// - **409**: the file has no stored object (pending or failed)
pub async fn download_file(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(file_id): Path<Uuid>,
) -> Result<Json<DownloadResponse>, AppError> {
    let response = file_service::download_url(
        &state.pool,
        &state.storage,
        auth.user_id,
        file_id,
        state.upload_limits.url_expiry,
    )
    .await?;

    Ok(Json(response))
}

/// Delete a file and its stored object. Returns 204 No Content.
pub async fn delete_file(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(file_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    file_service::delete_file(&state.pool, &state.storage, auth.user_id, file_id).await?;

    Ok(StatusCode::NO_CONTENT)
}

//! File service - upload handshake and lifecycle of stored documents.
//!
//! This service handles:
//! - Validating upload announcements (name, type, size)
//! - Issuing presigned POST forms and recording `pending` files
//! - Confirming uploads against object storage
//! - Listing, downloading and deleting a user's files
//!
//! # Ownership
//!
//! Every query filters by `user_id`. A file owned by someone else is reported
//! as not found, so ids of other users' files cannot be probed.

use std::time::Duration;

use uuid::Uuid;

use crate::{
    config::Config,
    db::DbPool,
    error::AppError,
    models::file::{
        DownloadResponse, FileRecord, FileStatus, PresignedUploadRequest, PresignedUploadResponse,
    },
    services::storage::ObjectStorage,
};

/// Content types accepted for reconciliation input.
pub const ALLOWED_CONTENT_TYPES: &[&str] = &[
    "text/csv",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "application/vnd.ms-excel",
    "application/pdf",
    "application/json",
    "text/plain",
];

const MAX_FILENAME_CHARS: usize = 255;

/// Limits applied to every upload, taken from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadLimits {
    pub max_bytes: i64,
    pub url_expiry: Duration,
}

impl UploadLimits {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_bytes: config.max_upload_bytes,
            url_expiry: Duration::from_secs(config.upload_url_expiry_secs),
        }
    }
}

/// Issue a presigned upload form and record the file as `pending`.
///
/// # Process
///
/// 1. Validate filename, content type and size
/// 2. Allocate the file id and object key
/// 3. Sign a POST policy for exactly that key, type and size
/// 4. Insert the `pending` row
///
/// # Errors
///
/// - `InvalidRequest`: bad filename or non-positive size
/// - `UnsupportedFileType`: content type not in `ALLOWED_CONTENT_TYPES`
/// - `PayloadTooLarge`: size above `limits.max_bytes`
/// - `Storage` / `Database`: infrastructure failures
pub async fn create_upload(
    pool: &DbPool,
    storage: &ObjectStorage,
    limits: UploadLimits,
    user_id: Uuid,
    request: PresignedUploadRequest,
) -> Result<PresignedUploadResponse, AppError> {
    let filename = validate_filename(&request.filename)?;
    let content_type = normalize_content_type(&request.content_type)?;
    validate_size(request.size_bytes, limits.max_bytes)?;

    let file_id = Uuid::new_v4();
    let key = object_key(user_id, file_id, filename);

    // The declared size is the upper bound enforced by storage
    let post = storage.presign_upload(&key, &content_type, request.size_bytes, limits.url_expiry)?;

    sqlx::query(
        r#"
        INSERT INTO files (id, user_id, object_key, original_filename, content_type, size_bytes)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(file_id)
    .bind(user_id)
    .bind(&key)
    .bind(filename)
    .bind(&content_type)
    .bind(request.size_bytes)
    .execute(pool)
    .await?;

    tracing::info!(%user_id, %file_id, %content_type, size_bytes = request.size_bytes, "Issued presigned upload");

    Ok(PresignedUploadResponse {
        file_id,
        bucket: storage.bucket().to_string(),
        key,
        url: post.url,
        fields: post.fields,
        expires_in: limits.url_expiry.as_secs(),
        expires_at: post.expires_at,
    })
}

/// Mark a `pending` file as `uploaded` once the object exists in storage.
///
/// Completing an already `uploaded` file returns it unchanged.
///
/// # Errors
///
/// - `FileNotFound`: no such file for this user
/// - `InvalidFileState`: object missing, or file past the upload stage
pub async fn complete_upload(
    pool: &DbPool,
    storage: &ObjectStorage,
    user_id: Uuid,
    file_id: Uuid,
) -> Result<FileRecord, AppError> {
    let file = get_file(pool, user_id, file_id).await?;

    match file.status {
        FileStatus::Pending => {}
        FileStatus::Uploaded => return Ok(file),
        other => {
            return Err(AppError::InvalidFileState(format!(
                "Cannot complete upload of a file in status {other:?}"
            )));
        }
    }

    if !storage.object_exists(&file.object_key).await? {
        return Err(AppError::InvalidFileState(
            "Object has not been uploaded yet".to_string(),
        ));
    }

    match mark_uploaded(pool, user_id, file_id).await? {
        Some(file) => {
            tracing::info!(%user_id, %file_id, "Upload completed");
            Ok(file)
        }
        // A concurrent request completed it first
        None => get_file(pool, user_id, file_id).await,
    }
}

/// Move a `pending` file to `uploaded`. Returns `None` when the file is not
/// pending (or not the user's).
async fn mark_uploaded(
    pool: &DbPool,
    user_id: Uuid,
    file_id: Uuid,
) -> Result<Option<FileRecord>, AppError> {
    let updated = sqlx::query_as::<_, FileRecord>(
        r#"
        UPDATE files
        SET status = 'uploaded',
            uploaded_at = NOW(),
            updated_at = NOW()
        WHERE id = $1 AND user_id = $2 AND status = 'pending'
        RETURNING *
        "#,
    )
    .bind(file_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(updated)
}

/// List a user's files, newest first.
pub async fn list_files(
    pool: &DbPool,
    user_id: Uuid,
    status: Option<FileStatus>,
) -> Result<Vec<FileRecord>, AppError> {
    let files = sqlx::query_as::<_, FileRecord>(
        r#"
        SELECT * FROM files
        WHERE user_id = $1 AND ($2::file_status IS NULL OR status = $2)
        ORDER BY created_at DESC
        "#,
    )
    .bind(user_id)
    .bind(status)
    .fetch_all(pool)
    .await?;

    Ok(files)
}

/// Get one of the user's files.
pub async fn get_file(pool: &DbPool, user_id: Uuid, file_id: Uuid) -> Result<FileRecord, AppError> {
    sqlx::query_as::<_, FileRecord>("SELECT * FROM files WHERE id = $1 AND user_id = $2")
        .bind(file_id)
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::FileNotFound)
}

/// Presigned download URL for a stored file.
///
/// # Errors
///
/// - `InvalidFileState`: the file was never uploaded or failed
pub async fn download_url(
    pool: &DbPool,
    storage: &ObjectStorage,
    user_id: Uuid,
    file_id: Uuid,
    expires_in: Duration,
) -> Result<DownloadResponse, AppError> {
    let file = get_file(pool, user_id, file_id).await?;

    if !file.status.has_object() {
        return Err(AppError::InvalidFileState(format!(
            "File in status {:?} cannot be downloaded",
            file.status
        )));
    }

    let filename = sanitize_filename(&file.original_filename);
    let url = storage
        .presign_download(&file.object_key, &filename, expires_in)
        .await?;

    let expires_at = chrono::Utc::now()
        + chrono::Duration::from_std(expires_in)
            .map_err(|e| AppError::Storage(format!("Invalid expiry: {e}")))?;

    Ok(DownloadResponse {
        url,
        expires_in: expires_in.as_secs(),
        expires_at,
    })
}

/// Delete a file: the object first, then the row.
///
/// If the object delete fails the row is kept so the delete can be retried.
pub async fn delete_file(
    pool: &DbPool,
    storage: &ObjectStorage,
    user_id: Uuid,
    file_id: Uuid,
) -> Result<(), AppError> {
    let file = get_file(pool, user_id, file_id).await?;

    storage.delete_object(&file.object_key).await?;

    sqlx::query("DELETE FROM files WHERE id = $1 AND user_id = $2")
        .bind(file_id)
        .bind(user_id)
        .execute(pool)
        .await?;

    tracing::info!(%user_id, %file_id, "File deleted");

    Ok(())
}

/// Object key layout: `uploads/{user_id}/{file_id}/{sanitized_filename}`.
pub fn object_key(user_id: Uuid, file_id: Uuid, filename: &str) -> String {
    format!("uploads/{user_id}/{file_id}/{}", sanitize_filename(filename))
}

/// Check a client-supplied filename and return it trimmed.
///
/// # Rules
///
/// - Not empty after trimming, at most 255 characters
/// - No path separators, control characters, `.` or `..`
pub fn validate_filename(filename: &str) -> Result<&str, AppError> {
    let trimmed = filename.trim();

    if trimmed.is_empty() {
        return Err(AppError::InvalidRequest("Filename is required".to_string()));
    }
    if trimmed.chars().count() > MAX_FILENAME_CHARS {
        return Err(AppError::InvalidRequest(format!(
            "Filename exceeds {MAX_FILENAME_CHARS} characters"
        )));
    }
    if trimmed == "." || trimmed == ".." {
        return Err(AppError::InvalidRequest("Invalid filename".to_string()));
    }
    if trimmed
        .chars()
        .any(|c| c == '/' || c == '\\' || c.is_control())
    {
        return Err(AppError::InvalidRequest(
            "Filename must not contain path separators or control characters".to_string(),
        ));
    }

    Ok(trimmed)
}

/// Reduce a filename to `[A-Za-z0-9._-]`, replacing everything else with `_`.
pub fn sanitize_filename(filename: &str) -> String {
    let sanitized: String = filename
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let sanitized = sanitized.trim_start_matches('.');
    if sanitized.is_empty() {
        "file".to_string()
    } else {
        sanitized.to_string()
    }
}

/// Lowercase the media type, drop parameters and check it is allowed.
pub fn normalize_content_type(content_type: &str) -> Result<String, AppError> {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    if essence.is_empty() {
        return Err(AppError::InvalidRequest(
            "Content type is required".to_string(),
        ));
    }
    if !ALLOWED_CONTENT_TYPES.contains(&essence.as_str()) {
        return Err(AppError::UnsupportedFileType(essence));
    }

    Ok(essence)
}

pub fn validate_size(size_bytes: i64, max_bytes: i64) -> Result<(), AppError> {
    if size_bytes <= 0 {
        return Err(AppError::InvalidRequest(
            "File size must be positive".to_string(),
        ));
    }
    if size_bytes > max_bytes {
        return Err(AppError::PayloadTooLarge(max_bytes));
    }
    Ok(())
}

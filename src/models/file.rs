//! Uploaded file models and API request/response types.
//!
//! This module defines:
//! - `FileRecord`: Database entity for a document in object storage
//! - `PresignedUploadRequest` / `PresignedUploadResponse`: upload handshake
//! - `FileResponse`, `DownloadResponse`: bodies returned to clients

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Upload status, stored as the `file_status` Postgres enum.
///
/// `pending` rows exist as soon as a presigned form is issued; the client
/// moves them to `uploaded` once the browser POST to storage succeeded.
/// `processing`, `processed` and `failed` belong to downstream reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "file_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Pending,
    Uploaded,
    Processing,
    Processed,
    Failed,
}

impl FileStatus {
    /// Whether the object is known to exist in storage.
    pub fn has_object(self) -> bool {
        matches!(self, Self::Uploaded | Self::Processing | Self::Processed)
    }
}

/// Represents a file record from the database.
///
/// # Database Table
///
/// Maps to the `files` table. Each file belongs to one user and maps to
/// exactly one object key in the configured bucket. The owner is not
/// carried here; every query already filters by it.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FileRecord {
    pub id: Uuid,

    /// Key of the object in the bucket: `uploads/{user_id}/{file_id}/{name}`
    pub object_key: String,

    /// Filename as provided by the client
    pub original_filename: String,

    pub content_type: String,

    /// Declared size; the presigned policy enforces it as an upper bound
    pub size_bytes: i64,

    pub status: FileStatus,

    /// Free-form side-channel for processing results
    pub metadata: serde_json::Value,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub uploaded_at: Option<DateTime<Utc>>,
}

/// Request body for `POST /api/v1/files/presigned-upload`.
///
/// # JSON Example
///
/// ```json
/// {
///   "filename": "bank-statement-2025-11.csv",
///   "content_type": "text/csv",
///   "size_bytes": 48213
/// }
/// ```
#[derive(Debug, Deserialize)]
pub struct PresignedUploadRequest {
    pub filename: String,
    pub content_type: String,
    pub size_bytes: i64,
}

/// Response body for a presigned upload.
///
/// The client submits a `multipart/form-data` POST to `url` containing every
/// entry of `fields` followed by the file itself in a field named `file`.
///
/// # JSON Example
///
/// ```json
/// {
///   "file_id": "550e8400-e29b-41d4-a716-446655440000",
///   "bucket": "matchbot-uploads",
///   "key": "uploads/.../bank-statement-2025-11.csv",
///   "url": "http://localhost:9000/matchbot-uploads",
///   "fields": {
///     "key": "uploads/.../bank-statement-2025-11.csv",
///     "Content-Type": "text/csv",
///     "policy": "eyJleHBpcmF0aW9uIjoi...",
///     "x-amz-algorithm": "AWS4-HMAC-SHA256",
///     "x-amz-credential": "minioadmin/20251220/us-east-1/s3/aws4_request",
///     "x-amz-date": "20251220T100000Z",
///     "x-amz-signature": "6a1c..."
///   },
///   "expires_in": 3600,
///   "expires_at": "2025-12-20T11:00:00Z"
/// }
/// ```
#[derive(Debug, Serialize)]
pub struct PresignedUploadResponse {
    pub file_id: Uuid,
    pub bucket: String,
    pub key: String,
    pub url: String,
    pub fields: BTreeMap<String, String>,
    pub expires_in: u64,
    pub expires_at: DateTime<Utc>,
}

/// Response body for file endpoints.
#[derive(Debug, Serialize)]
pub struct FileResponse {
    pub id: Uuid,
    pub filename: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub status: FileStatus,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub uploaded_at: Option<DateTime<Utc>>,
}

/// Convert database FileRecord to API FileResponse.
///
/// The object key and owner are internal and not exposed.
impl From<FileRecord> for FileResponse {
    fn from(file: FileRecord) -> Self {
        Self {
            id: file.id,
            filename: file.original_filename,
            content_type: file.content_type,
            size_bytes: file.size_bytes,
            status: file.status,
            metadata: file.metadata,
            created_at: file.created_at,
            updated_at: file.updated_at,
            uploaded_at: file.uploaded_at,
        }
    }
}

/// Response body for `GET /api/v1/files/{id}/download`.
#[derive(Debug, Serialize)]
pub struct DownloadResponse {
    pub url: String,
    pub expires_in: u64,
    pub expires_at: DateTime<Utc>,
}

/// Query string for `GET /api/v1/files`.
#[derive(Debug, Default, Deserialize)]
pub struct ListFilesQuery {
    #[serde(default)]
    pub status: Option<FileStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_stored_states_have_objects() {
        assert!(!FileStatus::Pending.has_object());
        assert!(FileStatus::Uploaded.has_object());
        assert!(FileStatus::Processing.has_object());
        assert!(FileStatus::Processed.has_object());
        assert!(!FileStatus::Failed.has_object());
    }

    #[test]
    fn list_query_parses_lowercase_status() {
        let query: ListFilesQuery = serde_json::from_str(r#"{"status": "uploaded"}"#).unwrap();
        assert_eq!(query.status, Some(FileStatus::Uploaded));
        assert!(serde_json::from_str::<ListFilesQuery>(r#"{"status": "Done"}"#).is_err());
    }
}

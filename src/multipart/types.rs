//! Multipart upload types and collaborator request/response shapes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::transport::progress::ratio;

/// Object-store minimum size for any part except the last (5 MiB)
pub const MIN_PART_SIZE: usize = 5 * 1024 * 1024;

/// Part information for the completion request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadPart {
    /// ETag returned by the object store for this part
    pub etag: String,
    /// Part number (1-based, contiguous)
    pub part_number: u32,
}

impl UploadPart {
    pub fn new(part_number: u32, etag: String) -> Self {
        Self { etag, part_number }
    }
}

/// Metadata of a file about to be uploaded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub name: String,
    pub size: u64,
    pub mime_type: String,
    pub last_modified: DateTime<Utc>,
}

impl FileInfo {
    /// Read name, size and modification time from the filesystem.
    pub async fn from_path(path: &Path) -> std::io::Result<Self> {
        let metadata = tokio::fs::metadata(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let last_modified = metadata
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());

        Ok(Self {
            mime_type: mime_type_for(&name),
            name,
            size: metadata.len(),
            last_modified,
        })
    }
}

/// MIME type guessed from the file extension
pub fn mime_type_for(name: &str) -> String {
    mime_guess::from_path(name)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

/// Upload initiation request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUploadRequest {
    pub file_name: String,
    pub file_size: u64,
    pub mime_type: String,
    /// Milliseconds since the Unix epoch
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_modified: DateTime<Utc>,
    pub owner_id: String,
}

impl CreateUploadRequest {
    pub fn new(file: &FileInfo, owner_id: &str) -> Self {
        Self {
            file_name: file.name.clone(),
            file_size: file.size,
            mime_type: file.mime_type.clone(),
            last_modified: file.last_modified,
            owner_id: owner_id.to_string(),
        }
    }
}

/// Upload initiation response; either field may be missing on failure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUploadResponse {
    #[serde(default)]
    pub stored_name: Option<String>,
    #[serde(default)]
    pub upload_id: Option<String>,
}

/// Signed part URL request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignPartRequest {
    pub stored_name: String,
    pub upload_id: String,
    pub part_number: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignPartResponse {
    pub signed_url: String,
}

/// Completion request carrying every part in order
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteUploadRequest {
    pub stored_name: String,
    pub upload_id: String,
    pub parts: Vec<UploadPart>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteUploadResponse {
    pub file_id: String,
}

/// Per-file progress forwarded to the caller's sink
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileProgress {
    pub d_loaded: u64,
    pub ratio: f64,
    pub loaded: u64,
    pub total: u64,
}

impl FileProgress {
    pub fn new(d_loaded: u64, loaded: u64, total: u64) -> Self {
        Self {
            d_loaded,
            ratio: ratio(loaded, total),
            loaded,
            total,
        }
    }
}

/// Result of one completed file upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    pub name: String,
    pub file_id: String,
    pub size: u64,
    pub parts: u32,
}

/// Configuration for multipart uploads
#[derive(Debug, Clone)]
pub struct MultipartConfig {
    /// Buffered bytes that trigger a part flush (default and minimum: 5 MiB)
    pub part_size: usize,
    /// Size of chunks pulled from a file source
    pub read_chunk_size: usize,
}

impl Default for MultipartConfig {
    fn default() -> Self {
        Self {
            part_size: MIN_PART_SIZE,
            read_chunk_size: 1024 * 1024,
        }
    }
}

impl MultipartConfig {
    /// Set the flush threshold, never below the object-store minimum
    pub fn with_part_size(mut self, size: usize) -> Self {
        self.part_size = size.max(MIN_PART_SIZE);
        self
    }

    pub fn with_read_chunk_size(mut self, size: usize) -> Self {
        self.read_chunk_size = size.max(1);
        self
    }
}

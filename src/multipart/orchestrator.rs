//! Per-file multipart upload
//!
//! Parts are uploaded strictly one after another: part N+1 is never signed
//! before part N's transport call has returned. The bytes read must match the
//! declared file size exactly. Any failure aborts the file before completion
//! is requested; there is no retry.

use futures::StreamExt;
use std::path::Path;
use tracing::{debug, info, warn};

use super::coordinator::UploadCoordinator;
use super::part_buffer::{PartBuffer, PendingPart};
use super::types::{
    CompleteUploadRequest, CreateUploadRequest, FileInfo, FileProgress, MultipartConfig,
    SignPartRequest, UploadPart, UploadedFile,
};
use super::{Result, UploadError};
use crate::transport::{file_chunks, ChunkStream, StreamingUploadTransport, UploadMethod, UploadSource};

fn size_mismatch(file: &FileInfo, actual: u64) -> UploadError {
    warn!(file = %file.name, declared = file.size, actual, "Source size differs from metadata");
    UploadError::SizeMismatch {
        file: file.name.clone(),
        declared: file.size,
        actual,
    }
}

/// Identity of one in-progress upload
struct UploadTarget<'a> {
    stored_name: &'a str,
    upload_id: &'a str,
    total: u64,
}

/// Drives whole-file uploads through signed part URLs
pub struct MultipartUploader<C> {
    coordinator: C,
    transport: StreamingUploadTransport,
    config: MultipartConfig,
}

impl<C: UploadCoordinator> MultipartUploader<C> {
    pub fn new(coordinator: C, transport: StreamingUploadTransport) -> Self {
        Self {
            coordinator,
            transport,
            config: MultipartConfig::default(),
        }
    }

    pub fn with_config(mut self, config: MultipartConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &MultipartConfig {
        &self.config
    }

    pub fn coordinator(&self) -> &C {
        &self.coordinator
    }

    /// Upload the file at `path`, reading it in `read_chunk_size` chunks.
    pub async fn upload_path<F>(&self, path: &Path, owner_id: &str, on_progress: F) -> Result<UploadedFile>
    where
        F: FnMut(FileProgress),
    {
        let file = FileInfo::from_path(path).await?;
        let handle = tokio::fs::File::open(path).await?;
        let chunks = file_chunks(handle, self.config.read_chunk_size);
        self.upload(&file, chunks, owner_id, on_progress).await
    }

    /// Upload `chunks` as the content of `file`.
    ///
    /// `on_progress` receives every part-level tick folded into the file's
    /// running byte count.
    pub async fn upload<F>(
        &self,
        file: &FileInfo,
        mut chunks: ChunkStream,
        owner_id: &str,
        mut on_progress: F,
    ) -> Result<UploadedFile>
    where
        F: FnMut(FileProgress),
    {
        let created = self
            .coordinator
            .create_upload(&CreateUploadRequest::new(file, owner_id))
            .await?;
        let upload_id = created
            .upload_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| UploadError::MissingUploadId {
                file: file.name.clone(),
            })?;
        let stored_name = created
            .stored_name
            .filter(|name| !name.is_empty())
            .ok_or_else(|| UploadError::MissingStoredName {
                file: file.name.clone(),
            })?;

        info!(
            file = %file.name,
            stored_name = %stored_name,
            upload_id = %upload_id,
            size = file.size,
            "Multipart upload started"
        );

        let target = UploadTarget {
            stored_name: &stored_name,
            upload_id: &upload_id,
            total: file.size,
        };
        let mut buffer = PartBuffer::new(self.config.part_size);
        let mut parts: Vec<UploadPart> = Vec::new();
        let mut loaded = 0u64;
        let mut read = 0u64;

        while let Some(chunk) = chunks.next().await {
            let chunk = chunk?;
            read += chunk.len() as u64;
            if read > file.size {
                return Err(size_mismatch(file, read));
            }
            if let Some(part) = buffer.push(&chunk) {
                parts.push(self.send_part(&target, part, &mut loaded, &mut on_progress).await?);
            }
        }
        if read != file.size {
            return Err(size_mismatch(file, read));
        }
        if let Some(part) = buffer.finish() {
            parts.push(self.send_part(&target, part, &mut loaded, &mut on_progress).await?);
        }

        let part_count = parts.len() as u32;
        let completed = self
            .coordinator
            .complete_upload(&CompleteUploadRequest {
                stored_name: stored_name.clone(),
                upload_id: upload_id.clone(),
                parts,
            })
            .await?;

        info!(
            file = %file.name,
            file_id = %completed.file_id,
            parts = part_count,
            bytes = read,
            "Multipart upload completed"
        );

        Ok(UploadedFile {
            name: file.name.clone(),
            file_id: completed.file_id,
            size: read,
            parts: part_count,
        })
    }

    /// Sign and PUT one part, returning its ETag record.
    async fn send_part<F>(
        &self,
        target: &UploadTarget<'_>,
        part: PendingPart,
        loaded: &mut u64,
        on_progress: &mut F,
    ) -> Result<UploadPart>
    where
        F: FnMut(FileProgress),
    {
        let PendingPart { part_number, data } = part;
        let signed = self
            .coordinator
            .sign_part(&SignPartRequest {
                stored_name: target.stored_name.to_string(),
                upload_id: target.upload_id.to_string(),
                part_number,
            })
            .await?;

        debug!(part_number, bytes = data.len(), "Uploading part");

        let total = target.total;
        let response = self
            .transport
            .upload(
                UploadMethod::Put,
                &signed.signed_url,
                UploadSource::Buffer(data),
                |event| {
                    *loaded += event.d_loaded;
                    on_progress(FileProgress::new(event.d_loaded, *loaded, total));
                },
            )
            .await?;

        if !response.status.is_success() {
            return Err(UploadError::PartRejected {
                part_number,
                status: response.status,
                body: response.text,
            });
        }

        let etag = response
            .etag()
            .ok_or(UploadError::MissingEtag { part_number })?;
        debug!(part_number, etag = %etag, "Part uploaded");

        Ok(UploadPart::new(part_number, etag))
    }
}

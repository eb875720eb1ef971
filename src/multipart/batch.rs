//! Sequential multi-file uploads with grouped progress

use std::collections::HashMap;
use std::path::PathBuf;
use tracing::info;

use super::coordinator::UploadCoordinator;
use super::orchestrator::MultipartUploader;
use super::types::{FileInfo, UploadedFile};
use super::Result;
use crate::transport::{file_chunks, GroupedProgressEvent, GroupedProgressTracker, ProgressEvent};

/// Uploads a list of files one after another through one [`MultipartUploader`]
pub struct BatchUploader<C> {
    uploader: MultipartUploader<C>,
}

impl<C: UploadCoordinator> BatchUploader<C> {
    pub fn new(uploader: MultipartUploader<C>) -> Self {
        Self { uploader }
    }

    pub fn uploader(&self) -> &MultipartUploader<C> {
        &self.uploader
    }

    /// Upload every file in order.
    ///
    /// Every file is stat'ed up front so the overall total is fixed before the
    /// first byte is sent. The first failing file aborts the batch.
    pub async fn upload_files<F>(
        &self,
        paths: &[PathBuf],
        owner_id: &str,
        mut on_progress: F,
    ) -> Result<Vec<UploadedFile>>
    where
        F: FnMut(&GroupedProgressEvent),
    {
        let mut files = Vec::with_capacity(paths.len());
        for path in paths {
            files.push(FileInfo::from_path(path).await?);
        }
        let keys = progress_keys(&files);

        let mut tracker = GroupedProgressTracker::new(
            keys.iter().zip(&files).map(|(key, file)| (key.as_str(), file.size)),
        );
        on_progress(&tracker.current());
        info!(files = files.len(), bytes = tracker.total(), "Batch upload started");

        let mut uploaded = Vec::with_capacity(files.len());
        for ((path, file), key) in paths.iter().zip(&files).zip(&keys) {
            let handle = tokio::fs::File::open(path).await?;
            let chunks = file_chunks(handle, self.uploader.config().read_chunk_size);

            let result = self
                .uploader
                .upload(file, chunks, owner_id, |progress| {
                    let event = ProgressEvent::new(progress.d_loaded, progress.loaded, progress.total);
                    on_progress(&tracker.update(key, event));
                })
                .await?;
            uploaded.push(result);
        }

        info!(files = uploaded.len(), "Batch upload completed");
        Ok(uploaded)
    }
}

/// Progress keys by file name; repeated names get a ` (n)` suffix.
fn progress_keys(files: &[FileInfo]) -> Vec<String> {
    let mut seen: HashMap<&str, u32> = HashMap::new();
    files
        .iter()
        .map(|file| {
            let count = seen.entry(file.name.as_str()).or_insert(0);
            *count += 1;
            if *count == 1 {
                file.name.clone()
            } else {
                format!("{} ({})", file.name, count)
            }
        })
        .collect()
}

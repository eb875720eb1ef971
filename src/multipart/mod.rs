//! Multipart upload orchestration
//!
//! This module provides:
//! - Part batching of a byte stream into numbered parts
//! - The upload collaborator trait and its JSON-over-HTTP implementation
//! - Per-file orchestration with summed progress
//! - A sequential multi-file batch driver with grouped progress

pub mod batch;
pub mod coordinator;
pub mod orchestrator;
pub mod part_buffer;
pub mod types;

use hyper::StatusCode;
use thiserror::Error;

use crate::transport::TransportError;

pub use batch::BatchUploader;
pub use coordinator::{CoordinatorError, CoordinatorPaths, HttpCoordinator, UploadCoordinator};
pub use orchestrator::MultipartUploader;
pub use part_buffer::{PartBuffer, PendingPart};
pub use types::{
    CompleteUploadRequest, CompleteUploadResponse, CreateUploadRequest, CreateUploadResponse,
    FileInfo, FileProgress, MultipartConfig, SignPartRequest, SignPartResponse, UploadPart,
    UploadedFile, MIN_PART_SIZE,
};

/// Multipart upload errors
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Upload initiation returned no uploadId for {file}")]
    MissingUploadId { file: String },

    #[error("Upload initiation returned no storedName for {file}")]
    MissingStoredName { file: String },

    #[error("{file}: source produced {actual} bytes, declared {declared}")]
    SizeMismatch {
        file: String,
        declared: u64,
        actual: u64,
    },

    #[error("Part {part_number} response carried no ETag")]
    MissingEtag { part_number: u32 },

    #[error("Part {part_number} rejected: {status} - {body}")]
    PartRejected {
        part_number: u32,
        status: StatusCode,
        body: String,
    },

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Coordinator error: {0}")]
    Coordinator(#[from] CoordinatorError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, UploadError>;

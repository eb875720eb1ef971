//! Streaming upload transport
//!
//! This module provides:
//! - A single-connection upload transport with per-tick progress
//! - Progress accounting (deltas, grouped batch progress)
//! - The shared pooled HTTP client used for JSON and event-stream requests

pub mod body;
pub mod client;
pub mod connection;
pub mod progress;
pub mod upload;

use hyper::StatusCode;
use std::time::Duration;
use thiserror::Error;

pub use body::{ProgressBody, DEFAULT_TICK_SIZE};
pub use client::{build_http_client, HttpClient};
pub use connection::UploadConnection;
pub use progress::{
    GroupedProgressEvent, GroupedProgressTracker, ProgressEvent, ProgressTracker,
};
pub use upload::{
    file_chunks, ChunkStream, StreamingUploadTransport, UploadMethod, UploadResponse, UploadSource,
};

/// Default size of one chunk pulled from a stream source (5 MiB)
pub const DEFAULT_CHUNK_SIZE: usize = 5 * 1024 * 1024;

/// Transport-level errors
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("TLS error: {0}")]
    Tls(#[from] native_tls::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] hyper::http::Error),

    #[error("Hyper error: {0}")]
    Hyper(#[from] hyper::Error),

    #[error("Client error: {0}")]
    Client(#[from] hyper_util::client::legacy::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Chunk at offset {offset} rejected: {status} - {body}")]
    Rejected {
        offset: u64,
        status: StatusCode,
        body: String,
    },

    #[error("Source length mismatch: declared {declared} bytes, read {actual}")]
    LengthMismatch { declared: u64, actual: u64 },
}

pub type Result<T> = std::result::Result<T, TransportError>;

/// Connection and progress settings shared by every transport call
#[derive(Debug, Clone)]
pub struct TransportSettings {
    /// TCP connect timeout
    pub connect_timeout: Duration,
    /// Bytes per progress tick
    pub tick_size: usize,
    /// Skip certificate and hostname verification
    pub insecure_tls: bool,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            tick_size: DEFAULT_TICK_SIZE,
            insecure_tls: false,
        }
    }
}

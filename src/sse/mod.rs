//! Event streams over POST
//!
//! This module provides:
//! - Incremental frame decoding with completion sentinel and error frames
//! - A stream client with handler callbacks and a stop handle

pub mod client;
pub mod frame;

use thiserror::Error;

pub use client::{SseClient, SseEvent, SseHandler, SseRequest, SseState, SseStream, StopHandle};
pub use frame::{Frame, FrameDecoder, DATA_PREFIX, DONE_SENTINEL};

/// Connection and read failures; reported through `SseHandler::on_error`
#[derive(Error, Debug)]
pub enum SseError {
    #[error("HTTP error: {0}")]
    Http(#[from] hyper::http::Error),

    #[error("Request failed: {0}")]
    Client(#[from] hyper_util::client::legacy::Error),

    #[error("Read failed: {0}")]
    Read(#[from] hyper::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SseError>;

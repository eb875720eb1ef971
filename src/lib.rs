//! partstream - chunked uploads with progress, multipart orchestration,
//! POST event streams and presigned URL re-signing

pub mod cli;
pub mod config;
pub mod core;
pub mod multipart;
pub mod s3;
pub mod sse;
pub mod transport;

pub use config::Config;
pub use core::Core;

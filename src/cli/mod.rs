//! Command implementations for the `partstream` binary
//!
//! ```bash
//! # Multipart upload through the application server
//! partstream upload clip.mp4 notes.pdf --owner project-7
//!
//! # Single-connection chunked upload to a URL
//! partstream put https://host/upload big.bin --chunk-size 1048576
//!
//! # Consume an event stream
//! partstream stream --body '{"prompt":"hi"}'
//!
//! # Header-equivalent signature for a presigned URL
//! partstream resign 'https://bucket.s3.amazonaws.com/key?X-Amz-...'
//! ```

pub mod commands;

pub use commands::{cmd_put, cmd_resign, cmd_stream, cmd_upload, format_bytes};

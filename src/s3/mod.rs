//! AWS SigV4 signing for presigned object URLs
//!
//! This module provides:
//! - Key derivation and signature computation over a header-form canonical request
//! - Presigned URL parsing and in-place signature replacement

pub mod presigned;
pub mod signer;

use thiserror::Error;

pub use presigned::{resign_url, PresignedUrl};
pub use signer::{
    derive_signing_key, CanonicalRequest, CredentialScope, SigV4Signer, SigningContext, ALGORITHM,
    UNSIGNED_PAYLOAD,
};

/// Presigned URL errors
#[derive(Error, Debug)]
pub enum SignError {
    #[error("Invalid presigned URL: {0}")]
    InvalidUrl(String),

    #[error("Missing query parameter {0}")]
    MissingParameter(&'static str),

    #[error("Malformed query parameter {0}")]
    InvalidParameter(&'static str),

    #[error("Malformed credential scope: {0}")]
    InvalidScope(String),

    #[error("Unsupported signing algorithm: {0}")]
    UnsupportedAlgorithm(String),
}

pub type Result<T> = std::result::Result<T, SignError>;

//! AWS Signature Version 4 with a header-equivalent canonical request
//!
//! Presigned URLs carry their date and expiry as query parameters. A client
//! that sends those same values as headers must present a signature computed
//! over the header form of the request instead:
//!
//! ```text
//! GET
//! /bucket/key
//!
//! host:<host>
//! x-amz-date:<date>
//! x-amz-expires:<seconds>
//!
//! host;x-amz-date;x-amz-expires
//! UNSIGNED-PAYLOAD
//! ```
//!
//! - Fixed-size [u8; 32] arrays for HMAC results
//! - Signing key cached per credential scope (it only changes daily)

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Mutex;

use super::{Result, SignError};

type HmacSha256 = Hmac<Sha256>;

/// Signing algorithm identifier
pub const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// Payload hash sentinel: the body is not part of the signature
pub const UNSIGNED_PAYLOAD: &str = "UNSIGNED-PAYLOAD";

/// Signed header names, in canonical order
pub const SIGNED_HEADERS: &str = "host;x-amz-date;x-amz-expires";

/// Terminator of every credential scope
const SCOPE_TERMINATOR: &str = "aws4_request";

/// `yyyymmdd/region/service/aws4_request`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialScope {
    pub date: String,
    pub region: String,
    pub service: String,
}

impl CredentialScope {
    pub fn new(date: &str, region: &str, service: &str) -> Self {
        Self {
            date: date.to_string(),
            region: region.to_string(),
            service: service.to_string(),
        }
    }

    /// Parse a scope string, validating its shape.
    pub fn parse(scope: &str) -> Result<Self> {
        let parts: Vec<&str> = scope.split('/').collect();
        match parts.as_slice() {
            [date, region, service, terminator]
                if *terminator == SCOPE_TERMINATOR
                    && date.len() == 8
                    && date.bytes().all(|b| b.is_ascii_digit())
                    && !region.is_empty()
                    && !service.is_empty() =>
            {
                Ok(Self::new(date, region, service))
            }
            _ => Err(SignError::InvalidScope(scope.to_string())),
        }
    }
}

impl fmt::Display for CredentialScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.date, self.region, self.service, SCOPE_TERMINATOR
        )
    }
}

/// Header-form canonical request for a presigned resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalRequest {
    pub method: String,
    /// Already URI-encoded path, used as-is
    pub path: String,
    pub host: String,
    /// `X-Amz-Date` value (`yyyymmddThhmmssZ`)
    pub amz_date: String,
    /// `X-Amz-Expires` value in seconds
    pub expires: String,
    pub payload_hash: String,
}

impl CanonicalRequest {
    /// The exact bytes the verifying party hashes
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(
            self.method.len() + self.path.len() + self.host.len() + 128,
        );
        out.push_str(&self.method);
        out.push('\n');
        out.push_str(&self.path);
        out.push('\n');
        // Empty canonical query
        out.push('\n');
        out.push_str("host:");
        out.push_str(&self.host);
        out.push('\n');
        out.push_str("x-amz-date:");
        out.push_str(&self.amz_date);
        out.push('\n');
        out.push_str("x-amz-expires:");
        out.push_str(&self.expires);
        out.push('\n');
        out.push('\n');
        out.push_str(SIGNED_HEADERS);
        out.push('\n');
        out.push_str(&self.payload_hash);
        out
    }

    /// Hex SHA-256 of the rendered request
    pub fn hash(&self) -> String {
        hex::encode(Sha256::digest(self.render().as_bytes()))
    }
}

/// Everything that determines one signature
#[derive(Debug, Clone)]
pub struct SigningContext {
    pub request_date: String,
    pub scope: CredentialScope,
    pub secret_key: String,
    pub payload_hash: String,
    pub canonical_request_hash: String,
}

impl SigningContext {
    pub fn string_to_sign(&self) -> String {
        format!(
            "{}\n{}\n{}\n{}",
            ALGORITHM, self.request_date, self.scope, self.canonical_request_hash
        )
    }

    pub fn signing_key(&self) -> [u8; 32] {
        derive_signing_key(&self.secret_key, &self.scope)
    }

    /// Hex-encoded signature of the string to sign
    pub fn signature(&self) -> String {
        hex::encode(hmac_sha256(&self.signing_key(), self.string_to_sign().as_bytes()))
    }
}

/// Signer bound to one secret key
pub struct SigV4Signer {
    secret_key: String,
    /// Last derived signing key: (scope, key)
    cached_signing_key: Mutex<Option<(String, [u8; 32])>>,
}

impl Clone for SigV4Signer {
    fn clone(&self) -> Self {
        Self::new(self.secret_key.clone())
    }
}

impl fmt::Debug for SigV4Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigV4Signer").finish_non_exhaustive()
    }
}

impl SigV4Signer {
    pub fn new(secret_key: String) -> Self {
        Self {
            secret_key,
            cached_signing_key: Mutex::new(None),
        }
    }

    /// Build the full signing context for `request` under `scope`.
    pub fn context(&self, request: &CanonicalRequest, scope: &CredentialScope) -> SigningContext {
        SigningContext {
            request_date: request.amz_date.clone(),
            scope: scope.clone(),
            secret_key: self.secret_key.clone(),
            payload_hash: request.payload_hash.clone(),
            canonical_request_hash: request.hash(),
        }
    }

    /// Hex signature of `request` under `scope`
    pub fn sign(&self, request: &CanonicalRequest, scope: &CredentialScope) -> String {
        let context = self.context(request, scope);
        let key = self.signing_key(scope);
        hex::encode(hmac_sha256(&key, context.string_to_sign().as_bytes()))
    }

    fn signing_key(&self, scope: &CredentialScope) -> [u8; 32] {
        let scope_str = scope.to_string();
        if let Ok(mut cache) = self.cached_signing_key.lock() {
            if let Some((cached_scope, key)) = cache.as_ref() {
                if *cached_scope == scope_str {
                    return *key;
                }
            }
            let key = derive_signing_key(&self.secret_key, scope);
            *cache = Some((scope_str, key));
            return key;
        }
        derive_signing_key(&self.secret_key, scope)
    }
}

/// Four chained HMACs: date, region, service, `aws4_request`
pub fn derive_signing_key(secret_key: &str, scope: &CredentialScope) -> [u8; 32] {
    let seed = format!("AWS4{}", secret_key);
    let k_date = hmac_sha256(seed.as_bytes(), scope.date.as_bytes());
    let k_region = hmac_sha256(&k_date, scope.region.as_bytes());
    let k_service = hmac_sha256(&k_region, scope.service.as_bytes());
    hmac_sha256(&k_service, SCOPE_TERMINATOR.as_bytes())
}

/// HMAC-SHA256 returning a fixed-size array
pub fn hmac_sha256(key: &[u8], msg: &[u8]) -> [u8; 32] {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(msg);
    let result = mac.finalize().into_bytes();
    let mut output = [0u8; 32];
    output.copy_from_slice(&result);
    output
}

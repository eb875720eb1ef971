//! Presigned GET URL rewriting
//!
//! [`resign_url`] recomputes the signature of a presigned URL over the header
//! form of the request and swaps it into the `X-Amz-Signature` parameter.
//! Every other byte of the URL is left untouched. Paths under `/video/` keep
//! their original query-string signature.

use tracing::debug;

use super::signer::{CanonicalRequest, CredentialScope, SigV4Signer, ALGORITHM, UNSIGNED_PAYLOAD};
use super::{Result, SignError};

const PARAM_ALGORITHM: &str = "X-Amz-Algorithm";
const PARAM_CREDENTIAL: &str = "X-Amz-Credential";
const PARAM_DATE: &str = "X-Amz-Date";
const PARAM_EXPIRES: &str = "X-Amz-Expires";
const PARAM_SIGNATURE: &str = "X-Amz-Signature";

/// Path marker of resources whose signature is left as issued
const VIDEO_PATH_MARKER: &str = "/video/";

/// Borrowed components of a presigned URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresignedUrl<'a> {
    /// Everything up to and including `?`
    prefix: &'a str,
    pub host: &'a str,
    pub path: &'a str,
    pub query: &'a str,
    /// `#fragment`, if any
    suffix: &'a str,
}

impl<'a> PresignedUrl<'a> {
    /// Split `url` into host, path and query without allocating.
    ///
    /// The host has the scheme's default port stripped.
    pub fn parse(url: &'a str) -> Result<Self> {
        let (is_https, after_scheme) = if let Some(rest) = url.strip_prefix("https://") {
            (true, rest)
        } else if let Some(rest) = url.strip_prefix("http://") {
            (false, rest)
        } else {
            return Err(SignError::InvalidUrl(url.to_string()));
        };

        let (without_fragment, suffix) = match url.find('#') {
            Some(pos) => (&url[..pos], &url[pos..]),
            None => (url, ""),
        };
        let Some(query_start) = without_fragment.find('?') else {
            return Err(SignError::MissingParameter(PARAM_SIGNATURE));
        };
        let query = &without_fragment[query_start + 1..];

        let authority_and_path = &after_scheme[..query_start - (url.len() - after_scheme.len())];
        let (authority, path) = match authority_and_path.find('/') {
            Some(pos) => (&authority_and_path[..pos], &authority_and_path[pos..]),
            None => (authority_and_path, "/"),
        };
        if authority.is_empty() {
            return Err(SignError::InvalidUrl(url.to_string()));
        }

        let host = if is_https {
            authority.strip_suffix(":443").unwrap_or(authority)
        } else {
            authority.strip_suffix(":80").unwrap_or(authority)
        };

        Ok(Self {
            prefix: &without_fragment[..=query_start],
            host,
            path,
            query,
            suffix,
        })
    }

    /// Raw value of the first query parameter named `name`
    pub fn param(&self, name: &str) -> Option<&'a str> {
        self.query.split('&').find_map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (key == name).then_some(value)
        })
    }

    fn decoded_param(&self, name: &'static str) -> Result<String> {
        let raw = self.param(name).ok_or(SignError::MissingParameter(name))?;
        let decoded = urlencoding::decode(raw).map_err(|_| SignError::InvalidParameter(name))?;
        Ok(decoded.into_owned())
    }

    pub fn is_video(&self) -> bool {
        self.path.contains(VIDEO_PATH_MARKER)
    }

    /// Credential scope from `X-Amz-Credential` (`<access key>/<scope>`)
    pub fn scope(&self) -> Result<CredentialScope> {
        let credential = self.decoded_param(PARAM_CREDENTIAL)?;
        let (_access_key, scope) = credential
            .split_once('/')
            .ok_or(SignError::InvalidParameter(PARAM_CREDENTIAL))?;
        CredentialScope::parse(scope)
    }

    /// Header-form canonical GET request for this URL
    pub fn canonical_request(&self) -> Result<CanonicalRequest> {
        if let Some(algorithm) = self.param(PARAM_ALGORITHM) {
            if algorithm != ALGORITHM {
                return Err(SignError::UnsupportedAlgorithm(algorithm.to_string()));
            }
        }
        Ok(CanonicalRequest {
            method: "GET".to_string(),
            path: self.path.to_string(),
            host: self.host.to_string(),
            amz_date: self.decoded_param(PARAM_DATE)?,
            expires: self.decoded_param(PARAM_EXPIRES)?,
            payload_hash: UNSIGNED_PAYLOAD.to_string(),
        })
    }

    /// The URL with only the `X-Amz-Signature` value replaced
    pub fn with_signature(&self, signature: &str) -> Result<String> {
        let mut out = String::with_capacity(self.prefix.len() + self.query.len() + self.suffix.len());
        out.push_str(self.prefix);

        let mut replaced = false;
        for (i, pair) in self.query.split('&').enumerate() {
            if i > 0 {
                out.push('&');
            }
            match pair.split_once('=') {
                Some((key, _)) if key == PARAM_SIGNATURE && !replaced => {
                    out.push_str(key);
                    out.push('=');
                    out.push_str(signature);
                    replaced = true;
                }
                _ => out.push_str(pair),
            }
        }
        if !replaced {
            return Err(SignError::MissingParameter(PARAM_SIGNATURE));
        }

        out.push_str(self.suffix);
        Ok(out)
    }
}

/// Replace the query-string signature of `url` with the header-form one.
///
/// Video paths are returned unchanged.
pub fn resign_url(url: &str, signer: &SigV4Signer) -> Result<String> {
    let presigned = PresignedUrl::parse(url)?;
    if presigned.is_video() {
        debug!(path = %presigned.path, "Video path keeps its query signature");
        return Ok(url.to_string());
    }

    let request = presigned.canonical_request()?;
    let scope = presigned.scope()?;
    let signature = signer.sign(&request, &scope);
    debug!(path = %presigned.path, scope = %scope, "Resigned presigned URL");

    presigned.with_signature(&signature)
}

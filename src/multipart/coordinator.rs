//! Upload collaborators: initiation, part URL signing and completion
//!
//! The orchestrator only talks to the [`UploadCoordinator`] trait. The
//! [`HttpCoordinator`] implementation posts JSON to an application server that
//! owns the object-store credentials.

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::header::{AUTHORIZATION, CONTENT_TYPE};
use hyper::{Method, Request, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use super::types::{
    CompleteUploadRequest, CompleteUploadResponse, CreateUploadRequest, CreateUploadResponse,
    SignPartRequest, SignPartResponse,
};
use crate::transport::HttpClient;

/// Collaborator errors
#[derive(Error, Debug)]
pub enum CoordinatorError {
    #[error("HTTP error: {0}")]
    Http(#[from] hyper::http::Error),

    #[error("Hyper error: {0}")]
    Hyper(#[from] hyper::Error),

    #[error("Request failed: {0}")]
    Client(#[from] hyper_util::client::legacy::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Server error: {status} - {message}")]
    Status { status: StatusCode, message: String },

    #[error("Response field {0} is missing or empty")]
    MissingField(&'static str),
}

/// Server-side collaborators of a multipart upload
#[async_trait]
pub trait UploadCoordinator: Send + Sync {
    /// Register a new upload and obtain its stored name and upload id
    async fn create_upload(
        &self,
        request: &CreateUploadRequest,
    ) -> Result<CreateUploadResponse, CoordinatorError>;

    /// Obtain a presigned URL for one part
    async fn sign_part(&self, request: &SignPartRequest) -> Result<SignPartResponse, CoordinatorError>;

    /// Assemble the uploaded parts into the final object
    async fn complete_upload(
        &self,
        request: &CompleteUploadRequest,
    ) -> Result<CompleteUploadResponse, CoordinatorError>;
}

/// Endpoint paths relative to the coordinator base URL
#[derive(Debug, Clone)]
pub struct CoordinatorPaths {
    pub create: String,
    pub sign_part: String,
    pub complete: String,
}

impl Default for CoordinatorPaths {
    fn default() -> Self {
        Self {
            create: "/uploads/create".to_string(),
            sign_part: "/uploads/sign-part".to_string(),
            complete: "/uploads/complete".to_string(),
        }
    }
}

/// JSON-over-HTTP coordinator with optional bearer authorization
#[derive(Clone)]
pub struct HttpCoordinator {
    client: HttpClient,
    base_url: String,
    token: Option<String>,
    paths: CoordinatorPaths,
}

impl HttpCoordinator {
    pub fn new(client: HttpClient, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            token: None,
            paths: CoordinatorPaths::default(),
        }
    }

    /// Send `Authorization: Bearer <token>` on every call
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    pub fn with_paths(mut self, paths: CoordinatorPaths) -> Self {
        self.paths = paths;
        self
    }

    fn url(&self, path: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        if path.starts_with('/') {
            format!("{}{}", base, path)
        } else {
            format!("{}/{}", base, path)
        }
    }

    async fn post_json<Req, Resp>(&self, path: &str, body: &Req) -> Result<Resp, CoordinatorError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let url = self.url(path);
        let payload = serde_json::to_vec(body)?;

        let mut req = Request::builder()
            .method(Method::POST)
            .uri(&url)
            .header(CONTENT_TYPE, "application/json");
        if let Some(token) = &self.token {
            req = req.header(AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = req.body(Full::new(Bytes::from(payload)))?;

        let response = self.client.request(request).await?;
        let status = response.status();
        let body_bytes = response.collect().await?.to_bytes();
        debug!(url = %url, status = %status, "Coordinator call");

        if !status.is_success() {
            let message = String::from_utf8_lossy(&body_bytes).to_string();
            return Err(CoordinatorError::Status { status, message });
        }

        Ok(serde_json::from_slice(&body_bytes)?)
    }
}

#[async_trait]
impl UploadCoordinator for HttpCoordinator {
    async fn create_upload(
        &self,
        request: &CreateUploadRequest,
    ) -> Result<CreateUploadResponse, CoordinatorError> {
        self.post_json(&self.paths.create, request).await
    }

    async fn sign_part(&self, request: &SignPartRequest) -> Result<SignPartResponse, CoordinatorError> {
        let response: SignPartResponse = self.post_json(&self.paths.sign_part, request).await?;
        if response.signed_url.trim().is_empty() {
            return Err(CoordinatorError::MissingField("signedUrl"));
        }
        Ok(response)
    }

    async fn complete_upload(
        &self,
        request: &CompleteUploadRequest,
    ) -> Result<CompleteUploadResponse, CoordinatorError> {
        let response: CompleteUploadResponse = self.post_json(&self.paths.complete, request).await?;
        if response.file_id.is_empty() {
            return Err(CoordinatorError::MissingField("fileId"));
        }
        Ok(response)
    }
}

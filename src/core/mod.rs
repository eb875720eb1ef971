use anyhow::{Context, Result};
use std::sync::Arc;

use crate::config::{Config, Profile};
use crate::multipart::{BatchUploader, HttpCoordinator, MultipartUploader};
use crate::s3::SigV4Signer;
use crate::sse::SseClient;
use crate::transport::{build_http_client, HttpClient, StreamingUploadTransport, TransportSettings};

/// Core shared by every command
///
/// The HTTP client is created once; clones share one connection pool for
/// coordinator calls and event streams. Uploads dial their own connection.
#[derive(Clone)]
pub struct Core {
    pub config: Arc<Config>,
    settings: TransportSettings,
    http_client: HttpClient,
}

impl Core {
    pub fn new(config: Config) -> Result<Self> {
        let settings = config.transport.settings();
        let http_client =
            build_http_client(&settings).context("Failed to build HTTP client")?;

        Ok(Self {
            config: Arc::new(config),
            settings,
            http_client,
        })
    }

    /// The selected profile
    pub fn profile(&self) -> Result<&Profile> {
        self.config
            .get_profile(None)
            .ok_or_else(|| anyhow::anyhow!("No profile found in configuration"))
    }

    pub fn transport(&self) -> StreamingUploadTransport {
        StreamingUploadTransport::new(self.settings.clone())
    }

    pub fn coordinator(&self) -> Result<HttpCoordinator> {
        let profile = self.profile()?;
        Ok(HttpCoordinator::new(self.http_client.clone(), profile.api_base.clone())
            .with_token(profile.token.clone())
            .with_paths(self.config.multipart.coordinator_paths()))
    }

    pub fn multipart_uploader(&self) -> Result<MultipartUploader<HttpCoordinator>> {
        let config = self
            .config
            .multipart
            .multipart_config()
            .with_read_chunk_size(self.config.transport.chunk_size);
        Ok(MultipartUploader::new(self.coordinator()?, self.transport()).with_config(config))
    }

    pub fn batch_uploader(&self) -> Result<BatchUploader<HttpCoordinator>> {
        Ok(BatchUploader::new(self.multipart_uploader()?))
    }

    pub fn sse_client(&self) -> SseClient {
        SseClient::new(self.http_client.clone())
    }

    /// Absolute event-stream URL for `path`, or the configured stream path
    pub fn stream_url(&self, path: Option<&str>) -> Result<String> {
        let base = self.profile()?.api_base.trim_end_matches('/');
        let path = path.unwrap_or(&self.config.stream.path);
        if path.starts_with("http://") || path.starts_with("https://") {
            Ok(path.to_string())
        } else if path.starts_with('/') {
            Ok(format!("{}{}", base, path))
        } else {
            Ok(format!("{}/{}", base, path))
        }
    }

    /// Signer for `secret_key`, falling back to the profile's key
    pub fn signer(&self, secret_key: Option<&str>) -> Result<SigV4Signer> {
        let secret = match secret_key {
            Some(secret) => secret.to_string(),
            None => self
                .profile()?
                .secret_key
                .clone()
                .context("No secret key configured (set AWS_SECRET_ACCESS_KEY)")?,
        };
        Ok(SigV4Signer::new(secret))
    }
}

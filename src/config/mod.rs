use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::multipart::{CoordinatorPaths, MultipartConfig, MIN_PART_SIZE};
use crate::transport::{TransportSettings, DEFAULT_CHUNK_SIZE, DEFAULT_TICK_SIZE};

/// Application server profile: coordinator, event stream and signing credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    /// Base URL of the application server
    pub api_base: String,

    /// Bearer token sent to the coordinator and the event stream
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Owner/project identifier attached to new uploads
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,

    /// Secret access key used to re-sign presigned URLs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_key: Option<String>,

    /// AWS region (default: us-east-1)
    #[serde(default = "default_region")]
    pub region: String,

    /// Signing service name (default: s3)
    #[serde(default = "default_service")]
    pub service: String,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_service() -> String {
    "s3".to_string()
}

/// Upload transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// TCP connect timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Bytes per progress tick
    #[serde(default = "default_tick_size")]
    pub tick_size: usize,

    /// Chunk size of a streamed file source
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Disable certificate verification
    #[serde(default)]
    pub insecure_tls: bool,
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_tick_size() -> usize {
    DEFAULT_TICK_SIZE
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout(),
            tick_size: default_tick_size(),
            chunk_size: default_chunk_size(),
            insecure_tls: false,
        }
    }
}

impl TransportConfig {
    pub fn settings(&self) -> TransportSettings {
        TransportSettings {
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            tick_size: self.tick_size.max(1),
            insecure_tls: self.insecure_tls,
        }
    }
}

/// Multipart upload configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultipartSection {
    /// Buffered bytes that flush a part; never below 5 MiB
    #[serde(default = "default_part_size")]
    pub part_size: usize,

    #[serde(default = "default_create_path")]
    pub create_path: String,

    #[serde(default = "default_sign_part_path")]
    pub sign_part_path: String,

    #[serde(default = "default_complete_path")]
    pub complete_path: String,
}

fn default_part_size() -> usize {
    MIN_PART_SIZE
}

fn default_create_path() -> String {
    "/uploads/create".to_string()
}

fn default_sign_part_path() -> String {
    "/uploads/sign-part".to_string()
}

fn default_complete_path() -> String {
    "/uploads/complete".to_string()
}

impl Default for MultipartSection {
    fn default() -> Self {
        Self {
            part_size: default_part_size(),
            create_path: default_create_path(),
            sign_part_path: default_sign_part_path(),
            complete_path: default_complete_path(),
        }
    }
}

impl MultipartSection {
    pub fn multipart_config(&self) -> MultipartConfig {
        MultipartConfig::default().with_part_size(self.part_size)
    }

    pub fn coordinator_paths(&self) -> CoordinatorPaths {
        CoordinatorPaths {
            create: self.create_path.clone(),
            sign_part: self.sign_part_path.clone(),
            complete: self.complete_path.clone(),
        }
    }
}

/// Event stream configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Path of the event-stream endpoint (default: /stream)
    #[serde(default = "default_stream_path")]
    pub path: String,
}

fn default_stream_path() -> String {
    "/stream".to_string()
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            path: default_stream_path(),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Named application server profiles
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,

    #[serde(default)]
    pub transport: TransportConfig,

    #[serde(default)]
    pub multipart: MultipartSection,

    #[serde(default)]
    pub stream: StreamConfig,

    /// Profile used when none is named
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_profile: Option<String>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a profile by name, or the default profile if not specified
    pub fn get_profile(&self, name: Option<&str>) -> Option<&Profile> {
        if let Some(name) = name {
            self.profiles.get(name)
        } else if let Some(default) = &self.default_profile {
            self.profiles.get(default)
        } else {
            self.profiles.values().next()
        }
    }
}

/// Load configuration from a YAML file
pub fn load_from_yaml<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = std::fs::read_to_string(path.as_ref())
        .context(format!("Failed to read config file: {:?}", path.as_ref()))?;

    let config: Config =
        serde_yaml::from_str(&content).context("Failed to parse YAML configuration")?;

    Ok(config)
}

/// Load configuration from environment variables
///
/// - PARTSTREAM_API_BASE (creates the `default` profile)
/// - PARTSTREAM_TOKEN, PARTSTREAM_OWNER_ID (optional)
/// - AWS_SECRET_ACCESS_KEY / PARTSTREAM_SECRET (optional)
/// - AWS_REGION (optional, defaults to us-east-1)
/// - PARTSTREAM_PART_SIZE, PARTSTREAM_STREAM_PATH (optional)
pub fn load_from_env() -> Result<Config> {
    // Try to load .env file if it exists (don't fail if it doesn't)
    let _ = dotenvy::dotenv();

    let mut config = Config::new();

    // Without an API base there is no profile; URL-only commands still work
    match std::env::var("PARTSTREAM_API_BASE") {
        Ok(api_base) if !api_base.trim().is_empty() => {
            let secret_key = std::env::var("AWS_SECRET_ACCESS_KEY")
                .or_else(|_| std::env::var("PARTSTREAM_SECRET"))
                .ok();

            let profile = Profile {
                api_base: api_base.trim().to_string(),
                token: std::env::var("PARTSTREAM_TOKEN").ok(),
                owner_id: std::env::var("PARTSTREAM_OWNER_ID").ok(),
                secret_key,
                region: std::env::var("AWS_REGION").unwrap_or_else(|_| default_region()),
                service: default_service(),
            };

            config.profiles.insert("default".to_string(), profile);
            config.default_profile = Some("default".to_string());
        }
        _ => tracing::debug!("PARTSTREAM_API_BASE not set; no profile configured"),
    }

    if let Ok(size) = std::env::var("PARTSTREAM_PART_SIZE") {
        let size: usize = size
            .parse()
            .context(format!("Invalid PARTSTREAM_PART_SIZE: {}", size))?;
        config.multipart.part_size = size.max(MIN_PART_SIZE);
    }

    if let Ok(path) = std::env::var("PARTSTREAM_STREAM_PATH") {
        config.stream.path = path;
    }

    Ok(config)
}

/// Load configuration from file or environment
///
/// Reads the YAML file when a path is given, otherwise falls back to
/// environment variables. A named profile must exist in the file.
pub fn load_config(config_path: Option<&str>, profile_name: Option<&str>) -> Result<Config> {
    if let Some(path) = config_path {
        let mut config = load_from_yaml(path)?;

        if let Some(name) = profile_name {
            if !config.profiles.contains_key(name) {
                anyhow::bail!("Profile '{}' not found in config file", name);
            }
            config.default_profile = Some(name.to_string());
        }

        Ok(config)
    } else {
        load_from_env()
    }
}

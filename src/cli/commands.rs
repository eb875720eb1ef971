use anyhow::{Context, Result};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::core::Core;
use crate::s3::{resign_url, PresignedUrl};
use crate::sse::{SseHandler, SseRequest, SseState};
use crate::transport::{GroupedProgressEvent, UploadMethod, UploadSource};

/// Batch upload command
pub async fn cmd_upload(core: &Core, files: &[PathBuf], owner: Option<&str>) -> Result<()> {
    if files.is_empty() {
        anyhow::bail!("No files given");
    }

    let owner_id = match owner {
        Some(owner) => owner.to_string(),
        None => core
            .profile()?
            .owner_id
            .clone()
            .context("No owner id given (use --owner or set PARTSTREAM_OWNER_ID)")?,
    };

    let batch = core.batch_uploader()?;
    let mut bars = BatchBars::new()?;

    let uploaded = batch
        .upload_files(files, &owner_id, |event| bars.update(event))
        .await;
    bars.finish();
    let uploaded = uploaded?;

    for file in &uploaded {
        println!(
            "{} -> {} ({}, {} parts)",
            file.name,
            file.file_id,
            format_bytes(file.size),
            file.parts
        );
    }

    Ok(())
}

/// Single-connection upload of one file to a URL
pub async fn cmd_put(
    core: &Core,
    url: &str,
    file: &Path,
    method: UploadMethod,
    chunk_size: Option<usize>,
) -> Result<()> {
    let chunk_size = chunk_size.unwrap_or(core.config.transport.chunk_size);
    let source = UploadSource::file(file, chunk_size)
        .await
        .context(format!("Failed to open {}", file.display()))?;

    let total = source.total();
    println!("{} -> {} ({})", file.display(), url, format_bytes(total));

    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {bytes}/{total_bytes} {msg}")?
            .progress_chars("=>-"),
    );

    let response = core
        .transport()
        .upload(method, url, source, |event| pb.set_position(event.loaded))
        .await;
    pb.finish_and_clear();
    let response = response?;

    println!("  status: {}", response.status);
    if let Some(etag) = response.etag() {
        println!("  etag: {}", etag);
    }
    if !response.text.is_empty() {
        println!("{}", response.text);
    }

    if !response.status.is_success() {
        anyhow::bail!("Upload rejected with status {}", response.status);
    }
    Ok(())
}

/// Prints every message as one JSON line
#[derive(Default)]
struct PrintHandler {
    messages: usize,
    error: Option<String>,
}

impl SseHandler for PrintHandler {
    fn on_message(&mut self, message: Value) -> Result<()> {
        self.messages += 1;
        println!("{}", serde_json::to_string(&message)?);
        Ok(())
    }

    fn on_error(&mut self, error: &str) {
        self.error = Some(error.to_string());
    }

    fn on_done(&mut self) {
        debug!(messages = self.messages, "Stream done");
    }
}

/// Event stream command
pub async fn cmd_stream(core: &Core, path: Option<&str>, body: Option<&str>) -> Result<()> {
    let url = core.stream_url(path)?;
    let body: Value = match body {
        Some(body) => serde_json::from_str(body).context("Request body is not valid JSON")?,
        None => Value::Object(Default::default()),
    };

    let mut request = SseRequest::new(url, body);
    if let Some(token) = &core.profile()?.token {
        request = request.bearer(token);
    }

    let mut stream = core.sse_client().open(request);
    let stop = stream.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted; stopping stream");
            stop.stop();
        }
    });

    let mut handler = PrintHandler::default();
    let state = stream.run(&mut handler).await;
    info!(messages = handler.messages, state = ?state, "Stream finished");

    match (state, handler.error) {
        (SseState::Errored, Some(error)) => anyhow::bail!("Stream error: {}", error),
        _ => Ok(()),
    }
}

/// Presigned URL re-signing command
pub async fn cmd_resign(core: &Core, url: &str, secret_key: Option<&str>) -> Result<()> {
    let signer = core.signer(secret_key)?;
    let scope = PresignedUrl::parse(url).and_then(|presigned| presigned.scope());
    if let (Ok(profile), Ok(scope)) = (core.profile(), scope) {
        if scope.region != profile.region || scope.service != profile.service {
            warn!(
                url_region = %scope.region,
                url_service = %scope.service,
                profile_region = %profile.region,
                profile_service = %profile.service,
                "Credential scope differs from profile; signing with the URL's scope"
            );
        }
    }
    let resigned = resign_url(url, &signer).context("Failed to re-sign URL")?;
    println!("{}", resigned);
    Ok(())
}

/// Overall and per-file bars driven by grouped progress
struct BatchBars {
    multi: MultiProgress,
    overall: Option<ProgressBar>,
    files: HashMap<String, ProgressBar>,
    file_style: ProgressStyle,
    overall_style: ProgressStyle,
}

impl BatchBars {
    fn new() -> Result<Self> {
        Ok(Self {
            multi: MultiProgress::new(),
            overall: None,
            files: HashMap::new(),
            file_style: ProgressStyle::default_bar()
                .template("{msg:30} {bar:40.cyan/blue} {bytes}/{total_bytes}")?
                .progress_chars("=>-"),
            overall_style: ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.green/blue} {bytes}/{total_bytes} {bytes_per_sec}")?
                .progress_chars("=>-"),
        })
    }

    fn update(&mut self, event: &GroupedProgressEvent) {
        if self.overall.is_none() {
            let pb = self.multi.add(ProgressBar::new(event.overall.total));
            pb.set_style(self.overall_style.clone());
            self.overall = Some(pb);

            for (name, file) in &event.individual {
                let pb = self.multi.add(ProgressBar::new(file.total));
                pb.set_style(self.file_style.clone());
                pb.set_message(name.clone());
                self.files.insert(name.clone(), pb);
            }
        }

        if let Some(pb) = &self.overall {
            pb.set_position(event.overall.loaded);
        }
        for (name, file) in &event.individual {
            if let Some(pb) = self.files.get(name) {
                pb.set_position(file.loaded);
            }
        }
    }

    fn finish(&self) {
        for pb in self.files.values() {
            pb.finish();
        }
        if let Some(pb) = &self.overall {
            pb.finish();
        }
    }
}

/// Human-readable size with binary multiples ("512 B", "1.50 MB")
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["KB", "MB", "GB", "TB", "PB"];

    if bytes < 1024 {
        return format!("{} B", bytes);
    }

    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.2} {}", value, UNITS[unit])
}

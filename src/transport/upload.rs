//! Single-connection upload with incremental progress
//!
//! [`StreamingUploadTransport::upload`] dials exactly one connection per call
//! and sends either:
//! - a single pre-built buffer as the whole request body (multipart parts), or
//! - a stream of chunks as sequential requests on that same connection, each
//!   tagged with a `Content-Range` describing its offset in the whole file.
//!
//! Progress ticks are relayed synchronously on the caller's task. No retry is
//! attempted; a failed call must be re-invoked by the caller.

use bytes::{Bytes, BytesMut};
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::header::{HeaderMap, HeaderValue, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, HOST};
use hyper::{Method, Request, Response, StatusCode};
use std::path::Path;
use std::pin::Pin;
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info};

use super::body::ProgressBody;
use super::connection::{parse_url, request_target, UploadConnection};
use super::progress::{ProgressEvent, ProgressTracker};
use super::{Result, TransportError, TransportSettings};

/// A source of sequential chunks
pub type ChunkStream = BoxStream<'static, std::io::Result<Bytes>>;

/// Upload verbs accepted by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadMethod {
    Post,
    Put,
}

impl UploadMethod {
    pub fn as_method(self) -> Method {
        match self {
            UploadMethod::Post => Method::POST,
            UploadMethod::Put => Method::PUT,
        }
    }
}

/// What to upload
pub enum UploadSource {
    /// A whole file as a stream of chunks with its declared total size
    Stream { total: u64, chunks: ChunkStream },
    /// One pre-built chunk sent as the entire request body
    Buffer(Bytes),
}

impl UploadSource {
    pub fn buffer(data: impl Into<Bytes>) -> Self {
        UploadSource::Buffer(data.into())
    }

    pub fn stream(total: u64, chunks: ChunkStream) -> Self {
        UploadSource::Stream { total, chunks }
    }

    /// Open `path` as a stream source of `chunk_size` chunks.
    pub async fn file(path: &Path, chunk_size: usize) -> std::io::Result<Self> {
        let file = tokio::fs::File::open(path).await?;
        let total = file.metadata().await?.len();
        Ok(UploadSource::Stream {
            total,
            chunks: file_chunks(file, chunk_size),
        })
    }

    /// Declared size in bytes
    pub fn total(&self) -> u64 {
        match self {
            UploadSource::Stream { total, .. } => *total,
            UploadSource::Buffer(data) => data.len() as u64,
        }
    }
}

/// Read a file as a stream of chunks of exactly `chunk_size` bytes (the last
/// one may be shorter).
pub fn file_chunks(file: tokio::fs::File, chunk_size: usize) -> ChunkStream {
    let chunk_size = chunk_size.max(1);
    stream::try_unfold(file, move |mut file| async move {
        let mut buf = BytesMut::with_capacity(chunk_size);
        while buf.len() < chunk_size {
            let want = (chunk_size - buf.len()) as u64;
            if (&mut file).take(want).read_buf(&mut buf).await? == 0 {
                break;
            }
        }
        if buf.is_empty() {
            Ok::<_, std::io::Error>(None)
        } else {
            Ok(Some((buf.freeze(), file)))
        }
    })
    .boxed()
}

/// Terminal response of an upload call
#[derive(Debug, Clone)]
pub struct UploadResponse {
    pub status: StatusCode,
    /// Response headers; lookups are case-insensitive
    pub headers: HeaderMap,
    pub text: String,
}

impl UploadResponse {
    async fn read(response: Response<Incoming>) -> Result<Self> {
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.into_body().collect().await?.to_bytes();
        Ok(Self {
            status,
            headers,
            text: String::from_utf8_lossy(&body).into_owned(),
        })
    }

    /// Header value by name, if present and valid UTF-8
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// ETag with surrounding quotes removed
    pub fn etag(&self) -> Option<String> {
        self.header("etag")
            .map(|s| s.trim_matches('"').to_string())
            .filter(|s| !s.is_empty())
    }
}

/// Uploads content over one connection per call
#[derive(Debug, Clone, Default)]
pub struct StreamingUploadTransport {
    settings: TransportSettings,
}

/// Per-call state: the connection, the tick channel and the byte counter
struct UploadCall {
    conn: UploadConnection,
    ticks_tx: UnboundedSender<u64>,
    ticks_rx: UnboundedReceiver<u64>,
    tracker: ProgressTracker,
    tick_size: usize,
}

impl UploadCall {
    fn build_request(
        &self,
        method: &Method,
        target: &hyper::Uri,
        data: Bytes,
        content_range: Option<String>,
    ) -> Result<Request<ProgressBody>> {
        let mut builder = Request::builder()
            .method(method.clone())
            .uri(target.clone())
            .header(HOST, self.conn.host())
            .header(CONTENT_TYPE, HeaderValue::from_static("application/octet-stream"))
            .header(CONTENT_LENGTH, data.len());
        if let Some(range) = content_range {
            builder = builder.header(CONTENT_RANGE, range);
        }
        let body = ProgressBody::new(data, self.tick_size, self.ticks_tx.clone());
        Ok(builder.body(body)?)
    }

    /// Send one request, relaying ticks to `on_progress` while it is in flight.
    async fn send<F>(&mut self, request: Request<ProgressBody>, on_progress: &mut F) -> Result<UploadResponse>
    where
        F: FnMut(ProgressEvent),
    {
        let response = {
            let send = self.conn.send(request);
            tokio::pin!(send);
            loop {
                tokio::select! {
                    biased;
                    Some(n) = self.ticks_rx.recv() => on_progress(self.tracker.advance(n)),
                    res = &mut send => break res?,
                }
            }
        };
        while let Ok(n) = self.ticks_rx.try_recv() {
            on_progress(self.tracker.advance(n));
        }
        UploadResponse::read(response).await
    }
}

impl StreamingUploadTransport {
    pub fn new(settings: TransportSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &TransportSettings {
        &self.settings
    }

    /// Upload `source` to `url` and resolve with the terminal response.
    ///
    /// `on_progress` fires once with `loaded = 0` when the call starts and
    /// then on every transmission tick.
    pub async fn upload<F>(
        &self,
        method: UploadMethod,
        url: &str,
        source: UploadSource,
        mut on_progress: F,
    ) -> Result<UploadResponse>
    where
        F: FnMut(ProgressEvent),
    {
        let uri = parse_url(url)?;
        let target = request_target(&uri)?;
        let method = method.as_method();
        let total = source.total();

        let conn = UploadConnection::open(&uri, &self.settings).await?;
        let (ticks_tx, ticks_rx) = mpsc::unbounded_channel();
        let mut call = UploadCall {
            conn,
            ticks_tx,
            ticks_rx,
            tracker: ProgressTracker::new(total),
            tick_size: self.settings.tick_size,
        };
        on_progress(call.tracker.start());

        let response = match source {
            UploadSource::Buffer(data) => {
                debug!(url = %url, bytes = data.len(), "Uploading buffer");
                let request = call.build_request(&method, &target, data, None)?;
                call.send(request, &mut on_progress).await?
            }
            UploadSource::Stream { total, chunks } => {
                self.upload_chunks(&mut call, &method, &target, total, chunks, &mut on_progress)
                    .await?
            }
        };

        info!(
            url = %url,
            status = %response.status,
            bytes = call.tracker.loaded(),
            "Upload finished"
        );
        Ok(response)
    }

    async fn upload_chunks<F>(
        &self,
        call: &mut UploadCall,
        method: &Method,
        target: &hyper::Uri,
        total: u64,
        chunks: ChunkStream,
        on_progress: &mut F,
    ) -> Result<UploadResponse>
    where
        F: FnMut(ProgressEvent),
    {
        let mut chunks = chunks
            .try_filter(|chunk| futures::future::ready(!chunk.is_empty()))
            .boxed()
            .peekable();
        let mut offset = 0u64;
        let mut last = None;

        while let Some(chunk) = chunks.next().await {
            let chunk = chunk?;
            let len = chunk.len() as u64;
            if offset + len > total {
                return Err(TransportError::LengthMismatch {
                    declared: total,
                    actual: offset + len,
                });
            }

            let range = format!("bytes {}-{}/{}", offset, offset + len - 1, total);
            let is_final = Pin::new(&mut chunks).peek().await.is_none();
            debug!(range = %range, is_final, "Sending chunk");

            let request = call.build_request(method, target, chunk, Some(range))?;
            let response = call.send(request, on_progress).await?;
            if !is_final && !response.status.is_success() {
                return Err(TransportError::Rejected {
                    offset,
                    status: response.status,
                    body: response.text,
                });
            }

            offset += len;
            last = Some(response);
        }

        if offset != total {
            return Err(TransportError::LengthMismatch {
                declared: total,
                actual: offset,
            });
        }

        match last {
            Some(response) => Ok(response),
            None => {
                let request = call.build_request(
                    method,
                    target,
                    Bytes::new(),
                    Some(format!("bytes */{}", total)),
                )?;
                call.send(request, on_progress).await
            }
        }
    }
}

//! POST-initiated event-stream client
//!
//! One [`SseStream`] sends one POST request with a JSON body and arbitrary
//! headers, then consumes the chunked response frame by frame:
//!
//! ```text
//! Connecting -> Streaming -> Done | Errored | Stopped
//! ```
//!
//! Every terminal state is final for the stream; there is no reconnect. The
//! [`StopHandle`] is checked before the request is sent and before each body
//! read, so a read already in flight may still be dispatched after `stop()`.

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use hyper::{Method, Request, Response};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use super::frame::{Frame, FrameDecoder};
use super::{Result, SseError};
use crate::transport::HttpClient;

/// Callbacks for one event stream
pub trait SseHandler {
    /// A parsed JSON message. An `Err` is logged and the stream continues.
    fn on_message(&mut self, message: Value) -> anyhow::Result<()>;

    /// An application or transport error; always followed by `on_done`.
    fn on_error(&mut self, error: &str);

    /// The stream is finished from the client's point of view.
    fn on_done(&mut self);
}

/// Stream events as channel messages
#[derive(Debug, Clone, PartialEq)]
pub enum SseEvent {
    Message(Value),
    Error(String),
    Done,
}

/// Forwards every callback into a channel, in order
impl SseHandler for UnboundedSender<SseEvent> {
    fn on_message(&mut self, message: Value) -> anyhow::Result<()> {
        self.send(SseEvent::Message(message))
            .map_err(|_| anyhow::anyhow!("event receiver dropped"))
    }

    fn on_error(&mut self, error: &str) {
        let _ = self.send(SseEvent::Error(error.to_string()));
    }

    fn on_done(&mut self) {
        let _ = self.send(SseEvent::Done);
    }
}

/// Lifecycle of one stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SseState {
    Connecting,
    Streaming,
    Done,
    Errored,
    Stopped,
}

impl SseState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SseState::Done | SseState::Errored | SseState::Stopped)
    }
}

/// Cancels a stream at its next loop boundary
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Request that opens a stream
#[derive(Debug, Clone)]
pub struct SseRequest {
    pub url: String,
    pub body: Value,
    pub headers: Vec<(String, String)>,
}

impl SseRequest {
    pub fn new(url: impl Into<String>, body: Value) -> Self {
        Self {
            url: url.into(),
            body,
            headers: Vec::new(),
        }
    }

    /// Add `Authorization: Bearer <token>`
    pub fn bearer(self, token: &str) -> Self {
        self.header(AUTHORIZATION.as_str(), &format!("Bearer {}", token))
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }
}

/// Opens event streams over the shared HTTP client
#[derive(Clone)]
pub struct SseClient {
    client: HttpClient,
}

impl SseClient {
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }

    /// Prepare a stream; nothing is sent until [`SseStream::run`].
    pub fn open(&self, request: SseRequest) -> SseStream {
        SseStream {
            client: self.client.clone(),
            request,
            stop: StopHandle::default(),
            state: SseState::Connecting,
        }
    }
}

/// One event stream and its stop flag
pub struct SseStream {
    client: HttpClient,
    request: SseRequest,
    stop: StopHandle,
    state: SseState,
}

impl SseStream {
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn state(&self) -> SseState {
        self.state
    }

    /// Send the request and dispatch frames to `handler` until a terminal
    /// state is reached.
    pub async fn run<H: SseHandler>(&mut self, handler: &mut H) -> SseState {
        if self.state.is_terminal() {
            return self.state;
        }
        self.state = self.consume(handler).await;
        self.state
    }

    async fn consume<H: SseHandler>(&mut self, handler: &mut H) -> SseState {
        if self.stop.is_stopped() {
            return SseState::Stopped;
        }

        self.state = SseState::Connecting;
        let response = match self.connect().await {
            Ok(response) => response,
            Err(_) if self.stop.is_stopped() => return SseState::Stopped,
            Err(e) => return self.fail(handler, &e.to_string()),
        };
        if self.stop.is_stopped() {
            return SseState::Stopped;
        }

        let status = response.status();
        if !status.is_success() {
            let text = match response.into_body().collect().await {
                Ok(body) => String::from_utf8_lossy(&body.to_bytes()).into_owned(),
                Err(e) => e.to_string(),
            };
            return self.fail(handler, &format!("HTTP {}: {}", status.as_u16(), text));
        }

        info!(url = %self.request.url, "Event stream opened");
        self.state = SseState::Streaming;
        let mut body = response.into_body();
        let mut decoder = FrameDecoder::new();

        loop {
            if self.stop.is_stopped() {
                debug!(url = %self.request.url, "Event stream stopped");
                return SseState::Stopped;
            }

            match body.frame().await {
                Some(Ok(frame)) => {
                    let Ok(data) = frame.into_data() else {
                        continue;
                    };
                    for text in decoder.push(&data) {
                        if let Some(state) = self.dispatch(handler, &text) {
                            return state;
                        }
                    }
                }
                Some(Err(e)) => {
                    let error = SseError::from(e);
                    return self.fail(handler, &error.to_string());
                }
                None => {
                    if let Some(text) = decoder.finish() {
                        if let Some(state) = self.dispatch(handler, &text) {
                            return state;
                        }
                    }
                    debug!(url = %self.request.url, "Event stream ended without sentinel");
                    handler.on_done();
                    self.stop.stop();
                    return SseState::Done;
                }
            }
        }
    }

    async fn connect(&self) -> Result<Response<Incoming>> {
        let payload = serde_json::to_vec(&self.request.body)?;
        let mut req = Request::builder()
            .method(Method::POST)
            .uri(&self.request.url)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "text/event-stream");
        for (name, value) in &self.request.headers {
            req = req.header(name.as_str(), value.as_str());
        }
        let request = req.body(Full::new(Bytes::from(payload)))?;

        debug!(url = %self.request.url, "Opening event stream");
        Ok(self.client.request(request).await?)
    }

    /// Handle one frame; returns the terminal state if the frame ends the stream.
    fn dispatch<H: SseHandler>(&self, handler: &mut H, text: &str) -> Option<SseState> {
        match Frame::parse(text) {
            Frame::Done => {
                handler.on_done();
                self.stop.stop();
                Some(SseState::Done)
            }
            Frame::Error(message) => {
                warn!(error = %message, "Event stream reported an error");
                handler.on_error(&message);
                handler.on_done();
                self.stop.stop();
                Some(SseState::Errored)
            }
            Frame::Message(value) => {
                if let Err(e) = handler.on_message(value) {
                    warn!(error = %e, "Message handler failed");
                }
                None
            }
            Frame::Ignored => None,
        }
    }

    fn fail<H: SseHandler>(&self, handler: &mut H, error: &str) -> SseState {
        warn!(url = %self.request.url, error = %error, "Event stream failed");
        handler.on_error(error);
        handler.on_done();
        self.stop.stop();
        SseState::Errored
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{build_http_client, TransportSettings};
    use serde_json::json;
    use tokio::sync::mpsc;

    #[test]
    fn test_request_builders() {
        let request = SseRequest::new("http://localhost/stream", json!({"q": 1}))
            .bearer("tok")
            .header("x-trace", "abc");
        assert_eq!(
            request.headers,
            vec![
                ("authorization".to_string(), "Bearer tok".to_string()),
                ("x-trace".to_string(), "abc".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_stop_before_start_fires_nothing() {
        let client = SseClient::new(build_http_client(&TransportSettings::default()).unwrap());
        let mut stream = client.open(SseRequest::new("http://127.0.0.1:1/stream", json!({})));
        stream.stop_handle().stop();

        let (tx, mut rx) = mpsc::unbounded_channel::<SseEvent>();
        let mut handler = tx;
        assert_eq!(stream.run(&mut handler).await, SseState::Stopped);
        drop(handler);
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn test_channel_handler_forwards_in_order() {
        let (mut tx, mut rx) = mpsc::unbounded_channel::<SseEvent>();
        tx.on_message(json!({"a": 1})).unwrap();
        tx.on_error("bad");
        tx.on_done();
        assert_eq!(rx.try_recv().unwrap(), SseEvent::Message(json!({"a": 1})));
        assert_eq!(rx.try_recv().unwrap(), SseEvent::Error("bad".to_string()));
        assert_eq!(rx.try_recv().unwrap(), SseEvent::Done);
    }
}

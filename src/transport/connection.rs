//! One dialed HTTP/1.1 connection owned by a single upload call
//!
//! The connection is dialed once (plain TCP or TLS, chosen by the URL scheme),
//! handshaken, and then used for one or more sequential requests. Dropping the
//! [`UploadConnection`] closes it.

use hyper::body::Incoming;
use hyper::client::conn::http1;
use hyper::{Request, Response, Uri};
use hyper_tls::HttpsConnector;
use std::future::poll_fn;
use tower_service::Service;
use tracing::{debug, warn};

use super::body::ProgressBody;
use super::client::{http_connector, tls_connector};
use super::{Result, TransportError, TransportSettings};

/// Parse an absolute http(s) URL.
pub fn parse_url(url: &str) -> Result<Uri> {
    let uri: Uri = url
        .parse()
        .map_err(|e| TransportError::InvalidUrl(format!("{}: {}", url, e)))?;
    match uri.scheme_str() {
        Some("http") | Some("https") => {}
        _ => return Err(TransportError::InvalidUrl(format!("{}: expected http(s) scheme", url))),
    }
    if uri.host().is_none() {
        return Err(TransportError::InvalidUrl(format!("{}: missing host", url)));
    }
    Ok(uri)
}

/// Host header value: the authority with the scheme's default port stripped.
pub fn host_header(uri: &Uri) -> String {
    let authority = uri.authority().map(|a| a.as_str()).unwrap_or_default();
    let default_port = if uri.scheme_str() == Some("https") {
        ":443"
    } else {
        ":80"
    };
    authority
        .strip_suffix(default_port)
        .unwrap_or(authority)
        .to_string()
}

/// Origin-form request target (`/path?query`) for a dialed connection.
pub fn request_target(uri: &Uri) -> Result<Uri> {
    let target = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    target
        .parse()
        .map_err(|e| TransportError::InvalidUrl(format!("{}: {}", target, e)))
}

/// An exclusively owned HTTP/1.1 connection
pub struct UploadConnection {
    sender: http1::SendRequest<ProgressBody>,
    host: String,
}

impl UploadConnection {
    /// Dial the host of `uri` and perform the HTTP/1.1 handshake.
    pub async fn open(uri: &Uri, settings: &TransportSettings) -> Result<Self> {
        let host = host_header(uri);
        debug!(host = %host, "Dialing upload connection");

        let http = http_connector(settings);
        let tls = tls_connector(settings)?;
        let mut https = HttpsConnector::from((http, tls.into()));

        poll_fn(|cx| https.poll_ready(cx))
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        let io = https
            .call(uri.clone())
            .await
            .map_err(|e| TransportError::Connect(format!("{}: {}", host, e)))?;

        let (sender, conn) = http1::handshake(io).await?;

        // Drive the connection until the sender is dropped
        let conn_host = host.clone();
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                warn!(host = %conn_host, error = %e, "Upload connection error");
            }
        });

        Ok(Self { sender, host })
    }

    /// Host header value for requests on this connection
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Send one request and wait for its response head.
    pub async fn send(&mut self, request: Request<ProgressBody>) -> Result<Response<Incoming>> {
        self.sender.ready().await?;
        Ok(self.sender.send_request(request).await?)
    }
}

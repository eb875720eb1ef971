//! Pooled HTTP client for small JSON calls and event streams
//!
//! Uploads never go through this client: each upload dials its own
//! [`UploadConnection`](super::UploadConnection) so all of its bytes travel
//! over exactly one connection.

use bytes::Bytes;
use http_body_util::Full;
use hyper_tls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client as HyperClient;
use hyper_util::rt::TokioExecutor;
use native_tls::TlsConnector;
use std::time::Duration;

use super::{Result, TransportSettings};

/// Hyper client over HTTP or HTTPS with a buffered request body
pub type HttpClient = HyperClient<HttpsConnector<HttpConnector>, Full<Bytes>>;

/// Build the TCP half of a connector with the transport's socket options
pub(crate) fn http_connector(settings: &TransportSettings) -> HttpConnector {
    let mut http = HttpConnector::new();
    http.set_nodelay(true);
    http.enforce_http(false);
    http.set_connect_timeout(Some(settings.connect_timeout));
    http.set_keepalive(Some(Duration::from_secs(90)));
    http
}

/// Build the TLS connector, optionally without certificate verification
pub(crate) fn tls_connector(settings: &TransportSettings) -> Result<TlsConnector> {
    if settings.insecure_tls {
        tracing::warn!("INSECURE TLS MODE ENABLED: Certificate verification is disabled!");
        Ok(TlsConnector::builder()
            .danger_accept_invalid_certs(true)
            .danger_accept_invalid_hostnames(true)
            .build()?)
    } else {
        Ok(TlsConnector::new()?)
    }
}

/// Create the shared client.
///
/// Clone is cheap: clones share one connection pool.
pub fn build_http_client(settings: &TransportSettings) -> Result<HttpClient> {
    let http = http_connector(settings);
    let tls = tls_connector(settings)?;
    let https = HttpsConnector::from((http, tls.into()));

    Ok(HyperClient::builder(TokioExecutor::new())
        .pool_idle_timeout(Duration::from_secs(90))
        .set_host(true)
        .build(https))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_is_clone() {
        let client = build_http_client(&TransportSettings::default()).unwrap();
        let _clone = client.clone();
    }
}

//! Delivery endpoint for serialized batches.

use std::future::Future;

use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use thiserror::Error;
use tracing::debug;

/// Transport-level delivery failure.
///
/// A response from the server is never an error here, whatever its
/// status: any delivered response surfaces as a status code so the
/// reporter can classify it.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("connect failed: {0}")]
    Connect(#[source] std::io::Error),

    #[error("request failed: {0}")]
    Http(#[from] hyper::Error),

    #[error("invalid request: {0}")]
    Request(#[from] http::Error),
}

/// Capability to deliver one serialized batch to the collector.
pub trait Sink: Send + Sync + 'static {
    fn send(
        &self,
        body: Bytes,
        headers: HeaderMap,
    ) -> impl Future<Output = Result<StatusCode, SinkError>> + Send;
}

/// POSTs batches to the collector's `/updates/` endpoint.
///
/// Connections are per-request: connect, handshake, one POST. The
/// reporter's cadence does not justify a pooled client.
pub struct HttpSink {
    addr: String,
}

impl HttpSink {
    /// `addr` is the collector's `host:port`.
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }
}

impl Sink for HttpSink {
    async fn send(&self, body: Bytes, headers: HeaderMap) -> Result<StatusCode, SinkError> {
        let stream = tokio::net::TcpStream::connect(&self.addr)
            .await
            .map_err(SinkError::Connect)?;
        let io = hyper_util::rt::TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io).await?;

        // Drive the connection in the background.
        tokio::spawn(async move {
            let _ = conn.await;
        });

        let mut req = http::Request::builder()
            .method(http::Method::POST)
            .uri(format!("http://{}/updates/", self.addr))
            .header(http::header::HOST, &self.addr)
            .header(http::header::CONTENT_TYPE, "application/json")
            .header(http::header::CONTENT_ENCODING, "gzip")
            .body(http_body_util::Full::new(body))?;
        req.headers_mut().extend(headers);

        let resp = sender.send_request(req).await?;
        debug!(status = %resp.status(), "batch posted");
        Ok(resp.status())
    }
}

//! Push transport: opens one long-lived stream of raw frames.

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use reqwest::header::ACCEPT;
use thiserror::Error;
use tokio_util::codec::{FramedRead, LinesCodec};
use tokio_util::io::StreamReader;
use tracing::debug;

use super::codec::MAX_FRAME_BYTES;

/// Errors reported by a transport. None of them are fatal to a subscription.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Endpoint responded with status {0}")]
    Status(u16),

    #[error("Stream read failed: {0}")]
    Read(String),
}

/// Everything needed to open one subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeRequest {
    pub url: String,
    pub topic: String,
    pub token: Option<String>,
}

impl SubscribeRequest {
    /// The endpoint URL with `topic` appended as a query parameter.
    pub fn endpoint(&self) -> String {
        let separator = if self.url.contains('?') { '&' } else { '?' };
        format!(
            "{}{}topic={}",
            self.url,
            separator,
            urlencoding::encode(&self.topic)
        )
    }
}

/// A stream of undecoded lines; `Err` items and the end of the stream both
/// mean the connection is gone.
pub type FrameStream = BoxStream<'static, Result<String, TransportError>>;

#[async_trait]
pub trait EventTransport: Send + Sync {
    /// Open a connection. Resolves once the server accepted the subscription.
    async fn open(&self, request: &SubscribeRequest) -> Result<FrameStream, TransportError>;
}

/// HTTP streaming transport (SSE / Mercure hubs, NDJSON endpoints).
pub struct HttpEventTransport {
    client: reqwest::Client,
}

impl HttpEventTransport {
    /// The client has no overall timeout: the response body never ends on its own.
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl EventTransport for HttpEventTransport {
    async fn open(&self, request: &SubscribeRequest) -> Result<FrameStream, TransportError> {
        let endpoint = request.endpoint();
        debug!("Opening push stream {}", endpoint);

        let mut builder = self
            .client
            .get(&endpoint)
            .header(ACCEPT, "text/event-stream");
        if let Some(token) = &request.token {
            builder = builder.bearer_auth(token);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        if !response.status().is_success() {
            return Err(TransportError::Status(response.status().as_u16()));
        }

        let body = response.bytes_stream().map_err(std::io::Error::other);
        let lines = FramedRead::new(
            StreamReader::new(body),
            LinesCodec::new_with_max_length(MAX_FRAME_BYTES),
        )
        .map_err(|e| TransportError::Read(e.to_string()));

        Ok(lines.boxed())
    }
}

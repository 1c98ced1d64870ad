//! Stream Transport
//!
//! The seam between the consumer and the network. A transport opens one
//! connection per call and hands back a stream of decoded envelopes. Once
//! the cancellation token fires the stream yields nothing further.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use plan_pipeline_core::{Envelope, GenerationRequest};
use reqwest::header::ACCEPT;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::TransportError;
use crate::sse::parse_envelope_stream;

/// Default connect timeout in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Decoded envelopes from one open connection.
pub type EnvelopeStream = Pin<Box<dyn Stream<Item = Result<Envelope, TransportError>> + Send>>;

#[async_trait]
pub trait StreamTransport: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Open a connection for `request`.
    ///
    /// Fails with the server's status and body when the open is rejected.
    async fn open(
        &self,
        request: &GenerationRequest,
        cancel: CancellationToken,
    ) -> Result<EnvelopeStream, TransportError>;
}

/// Configuration for [`HttpTransport`].
#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    /// Applies to connecting only. Streams stay open as long as the run lasts.
    pub connect_timeout: Duration,
    /// Optional bearer token.
    pub auth_token: Option<String>,
    pub user_agent: String,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            auth_token: None,
            user_agent: format!("plan-pipeline/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// POSTs the request as JSON and reads the response body as SSE.
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
    config: HttpTransportConfig,
}

impl HttpTransport {
    pub fn new(
        endpoint: impl Into<String>,
        config: HttpTransportConfig,
    ) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| TransportError::Client(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            config,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn send(&self, request: &GenerationRequest) -> Result<reqwest::Response, TransportError> {
        let mut req_builder = self
            .client
            .post(&self.endpoint)
            .header(ACCEPT, "text/event-stream")
            .json(request);

        if let Some(ref token) = self.config.auth_token {
            req_builder = req_builder.bearer_auth(token);
        }

        let response = req_builder.send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Http {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl StreamTransport for HttpTransport {
    fn name(&self) -> &str {
        "http"
    }

    async fn open(
        &self,
        request: &GenerationRequest,
        cancel: CancellationToken,
    ) -> Result<EnvelopeStream, TransportError> {
        debug!(endpoint = %self.endpoint, "opening event stream");

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TransportError::Cancelled),
            response = self.send(request) => response?,
        };

        info!(endpoint = %self.endpoint, status = response.status().as_u16(), "event stream open");
        let envelopes = parse_envelope_stream(response.bytes_stream());
        Ok(Box::pin(envelopes.take_until(cancel.cancelled_owned())))
    }
}

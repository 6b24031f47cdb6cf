//! HTTP transport for serialized span batches.

use crate::error::TransportError;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde_json::Value;
use std::fmt::Debug;
use std::time::Duration;
use tracing::debug;

/// Delivers one serialized batch to the ingestion endpoint.
///
/// Implementations perform a single attempt and carry no retry logic of
/// their own; retry and requeue policy is owned entirely by the exporter's
/// flush loop.
pub trait Transport: Send + Sync + Debug {
    /// Send one batch of serialized spans.
    ///
    /// Success means the endpoint acknowledged the batch with a 2xx response.
    /// Anything else, including timeouts, is a [`TransportError`].
    fn send(&self, batch: &[Value]) -> Result<(), TransportError>;
}

/// Blocking HTTP transport posting JSON batches to `{server_url}/span`.
#[derive(Debug)]
pub struct HttpTransport {
    client: reqwest::blocking::Client,
    endpoint: String,
    api_key: String,
}

impl HttpTransport {
    /// Create a transport with a bounded per-request timeout.
    pub fn new(
        server_url: &str,
        api_key: &str,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;
        Ok(HttpTransport {
            client,
            endpoint: span_endpoint(server_url),
            api_key: api_key.to_owned(),
        })
    }
}

impl Transport for HttpTransport {
    fn send(&self, batch: &[Value]) -> Result<(), TransportError> {
        let body = serde_json::to_vec(batch)?;
        debug!(spans = batch.len(), bytes = body.len(), endpoint = %self.endpoint, "sending span batch");

        let mut request = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .body(body);
        if !self.api_key.is_empty() {
            request = request.header(AUTHORIZATION, format!("ApiKey {}", self.api_key));
        }

        let response = request.send()?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        Err(TransportError::Rejected {
            status: status.as_u16(),
            body: response.text().unwrap_or_default(),
        })
    }
}

fn span_endpoint(server_url: &str) -> String {
    format!("{}/span", server_url.trim_end_matches('/'))
}

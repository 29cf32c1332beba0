use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

use crate::error::{NotifyError, Result};

pub const CONTENT_TYPE: &str = "application/json; charset=utf-8";
/// Client-level timeout for one POST, independent of the retry delay.
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(15);

/// Status and body of a completed HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

/// One POST to the push server.
///
/// `Err` means the server was not reached at all; any HTTP status, error
/// statuses included, comes back as `Ok`.
#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn post_json(&self, url: &str, body: Vec<u8>) -> Result<TransportResponse>;
}

pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| NotifyError::Http(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PushTransport for ReqwestTransport {
    async fn post_json(&self, url: &str, body: Vec<u8>) -> Result<TransportResponse> {
        debug!(%url, bytes = body.len(), "POST push payload");
        let resp = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, CONTENT_TYPE)
            .body(body)
            .send()
            .await
            .map_err(|e| NotifyError::Http(e.to_string()))?;

        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        Ok(TransportResponse { status, body })
    }
}

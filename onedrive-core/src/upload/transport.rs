use std::io;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::HeaderMap;
use reqwest::{Client, StatusCode};
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// A single PUT against an upload session URL. Only the status matters to the
/// caller; response bodies are discarded.
#[async_trait]
pub trait UploadTransport: Send + Sync {
    async fn put(
        &self,
        url: &Url,
        body: Bytes,
        headers: HeaderMap,
    ) -> Result<StatusCode, TransportError>;
}

/// Session URLs are pre-authorized, so no `Authorization` header is sent.
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransport {
    http: Client,
    request_timeout: Option<Duration>,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_http(http: Client) -> Self {
        Self {
            http,
            request_timeout: None,
        }
    }

    pub fn request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }
}

#[async_trait]
impl UploadTransport for ReqwestTransport {
    async fn put(
        &self,
        url: &Url,
        body: Bytes,
        headers: HeaderMap,
    ) -> Result<StatusCode, TransportError> {
        let mut request = self.http.put(url.clone()).headers(headers).body(body);
        if let Some(timeout) = self.request_timeout {
            request = request.timeout(timeout);
        }
        let response = request.send().await?;
        Ok(response.status())
    }
}

//! Origin HTTP client.
//!
//! The proxy talks to the origin in exactly two ways: a conditional GET when
//! serving a miss, and a HEAD probe during revalidation. Both go through the
//! [`OriginClient`] trait so the freshness evaluator and the orchestrator can
//! be exercised against scripted responses in tests.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, StatusCode};

use crate::error::OriginError;

/// A fully collected origin response.
#[derive(Debug, Clone)]
pub struct OriginResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl OriginResponse {
    /// Returns a header value as a string, if present and valid UTF-8.
    pub fn header_str(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }
}

#[async_trait]
pub trait OriginClient: Send + Sync {
    /// Issues a HEAD request, used to revalidate a stored entry.
    async fn head(&self, url: &str) -> Result<OriginResponse, OriginError>;

    /// Issues a GET carrying the given (possibly conditional) headers.
    async fn get(&self, url: &str, headers: HeaderMap) -> Result<OriginResponse, OriginError>;
}

/// Production [`OriginClient`] backed by `reqwest`.
#[derive(Clone)]
pub struct HttpOriginClient {
    client: reqwest::Client,
}

impl HttpOriginClient {
    /// Builds the client. No request-level timeout is imposed; once issued,
    /// a call runs to completion or transport failure. The connect timeout
    /// is the one tunable exposed here.
    pub fn new(connect_timeout: Option<Duration>) -> Result<Self, OriginError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
        })
    }

    async fn collect(response: reqwest::Response) -> Result<OriginResponse, OriginError> {
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;
        Ok(OriginResponse {
            status,
            headers,
            body,
        })
    }
}

#[async_trait]
impl OriginClient for HttpOriginClient {
    async fn head(&self, url: &str) -> Result<OriginResponse, OriginError> {
        let response = self.client.head(url).send().await?;
        Self::collect(response).await
    }

    async fn get(&self, url: &str, headers: HeaderMap) -> Result<OriginResponse, OriginError> {
        let response = self.client.get(url).headers(headers).send().await?;
        Self::collect(response).await
    }
}

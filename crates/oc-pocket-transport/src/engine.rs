//! Substitutable transport engine.
//!
//! The factory's clients never talk to the network directly; they hand fully
//! prepared requests to an [`HttpEngine`]. Production code uses
//! [`ReqwestEngine`]; tests plug in a recording engine.

use async_trait::async_trait;
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt, stream::BoxStream};
use oc_pocket_core::ApiError;
use reqwest::{Method, header::HeaderMap};

use crate::TransportConfig;

/// Streamed response body.
pub type ByteStream = BoxStream<'static, Result<Bytes, ApiError>>;

/// A request ready to be sent, headers already applied.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl TransportRequest {
    #[must_use]
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: None,
        }
    }
}

/// Fully buffered response.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Bytes,
}

/// Response whose body is consumed incrementally.
pub struct StreamResponse {
    pub status: u16,
    pub body: ByteStream,
}

impl std::fmt::Debug for StreamResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamResponse")
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

/// Sends prepared requests. Performs no retries and does not interpret status codes.
#[async_trait]
pub trait HttpEngine: Send + Sync {
    /// Send a request and buffer the whole response.
    async fn execute(&self, request: TransportRequest) -> Result<TransportResponse, ApiError>;

    /// Send a request and return the body as a stream.
    async fn open_stream(&self, request: TransportRequest) -> Result<StreamResponse, ApiError>;
}

/// reqwest-backed engine with separate clients for calls and streams.
#[derive(Debug, Clone)]
pub struct ReqwestEngine {
    rest: reqwest::Client,
    stream: reqwest::Client,
}

impl ReqwestEngine {
    /// Build both clients from `config`.
    ///
    /// # Errors
    /// Returns error if the TLS backend cannot be initialised.
    pub fn new(config: &TransportConfig) -> Result<Self, ApiError> {
        let rest = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(network_error)?;

        let stream = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .read_timeout(config.stream_read_timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(network_error)?;

        Ok(Self { rest, stream })
    }

    fn prepare(client: &reqwest::Client, request: TransportRequest) -> reqwest::RequestBuilder {
        let mut builder = client
            .request(request.method, request.url)
            .headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }
        builder
    }
}

fn network_error(e: reqwest::Error) -> ApiError {
    ApiError::Network(e.to_string())
}

#[async_trait]
impl HttpEngine for ReqwestEngine {
    async fn execute(&self, request: TransportRequest) -> Result<TransportResponse, ApiError> {
        let response = Self::prepare(&self.rest, request)
            .send()
            .await
            .map_err(network_error)?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(network_error)?;
        Ok(TransportResponse { status, body })
    }

    async fn open_stream(&self, request: TransportRequest) -> Result<StreamResponse, ApiError> {
        let response = Self::prepare(&self.stream, request)
            .send()
            .await
            .map_err(network_error)?;
        let status = response.status().as_u16();
        let body = response.bytes_stream().map_err(network_error).boxed();
        Ok(StreamResponse { status, body })
    }
}

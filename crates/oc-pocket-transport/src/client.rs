//! Request/response and streaming clients.

use std::sync::Arc;

use bytes::Bytes;
use futures::StreamExt;
use oc_pocket_core::ApiError;
use reqwest::{
    Method, StatusCode, Url,
    header::{ACCEPT, CACHE_CONTROL, CONTENT_TYPE, HeaderValue},
};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::{
    HttpEngine, TransportRequest,
    factory::HeaderPolicy,
    sse::{FrameStream, sse_frames},
};

/// Longest error body kept in an error message.
const MAX_ERROR_BODY: usize = 512;

/// Map a non-2xx status (and its body) to a typed error.
#[must_use]
pub fn map_status(status: u16, body: &[u8]) -> ApiError {
    let message = error_message(status, body);
    match status {
        401 | 403 => ApiError::Unauthorized(message),
        404 => ApiError::NotFound(message),
        _ => ApiError::Http { status, message },
    }
}

fn error_message(status: u16, body: &[u8]) -> String {
    if let Ok(Value::Object(obj)) = serde_json::from_slice::<Value>(body) {
        let nested = obj.get("data").and_then(|d| d.get("message"));
        let found = [obj.get("message"), nested, obj.get("error"), obj.get("name")]
            .into_iter()
            .flatten()
            .find_map(Value::as_str);
        if let Some(message) = found {
            return message.to_string();
        }
    }

    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    if text.is_empty() {
        return StatusCode::from_u16(status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("request failed")
            .to_string();
    }
    text.chars().take(MAX_ERROR_BODY).collect()
}

fn join_url(base_url: &str, segments: &[&str], query: &[(&str, String)]) -> Result<String, ApiError> {
    let mut url = Url::parse(base_url).map_err(|e| ApiError::Network(format!("invalid URL: {e}")))?;
    url.path_segments_mut()
        .map_err(|()| ApiError::Network(format!("invalid base URL: {base_url}")))?
        .pop_if_empty()
        .extend(segments);
    if !query.is_empty() {
        url.query_pairs_mut()
            .extend_pairs(query.iter().map(|(k, v)| (*k, v.as_str())));
    }
    Ok(url.into())
}

/// Request/response client.
#[derive(Clone)]
pub struct RestClient {
    base_url: String,
    engine: Arc<dyn HttpEngine>,
    policy: HeaderPolicy,
}

impl std::fmt::Debug for RestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl RestClient {
    pub(crate) fn new(base_url: String, engine: Arc<dyn HttpEngine>, policy: HeaderPolicy) -> Self {
        Self {
            base_url,
            engine,
            policy,
        }
    }

    /// Start a request to the path made of `segments` under the base URL.
    ///
    /// Segments are percent-encoded, so ids may contain any character.
    ///
    /// # Errors
    /// Returns error if the resulting URL is invalid.
    pub fn request(
        &self,
        method: Method,
        segments: &[&str],
        query: &[(&str, String)],
    ) -> Result<TransportRequest, ApiError> {
        Ok(TransportRequest::new(
            method,
            join_url(&self.base_url, segments, query)?,
        ))
    }

    /// Apply the header policy, send, and check the status.
    ///
    /// # Errors
    /// Returns the engine's error or the mapped non-2xx status.
    pub async fn send(&self, mut request: TransportRequest) -> Result<Bytes, ApiError> {
        self.policy.apply(&mut request.headers);
        let (method, url) = (request.method.clone(), request.url.clone());

        let response = self.engine.execute(request).await?;
        if (200..300).contains(&response.status) {
            tracing::debug!(%method, %url, status = response.status, "Request succeeded");
            Ok(response.body)
        } else {
            tracing::debug!(%method, %url, status = response.status, "Request failed");
            Err(map_status(response.status, &response.body))
        }
    }

    /// Send and decode a JSON response.
    ///
    /// # Errors
    /// Returns error if the request fails or the body does not decode.
    pub async fn send_json<T: DeserializeOwned>(&self, request: TransportRequest) -> Result<T, ApiError> {
        let body = self.send(request).await?;
        serde_json::from_slice(&body).map_err(|e| ApiError::Parse(e.to_string()))
    }

    /// `GET` a JSON resource.
    ///
    /// # Errors
    /// See [`RestClient::send_json`].
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        query: &[(&str, String)],
    ) -> Result<T, ApiError> {
        self.send_json(self.request(Method::GET, segments, query)?).await
    }

    /// Build a request carrying a JSON body.
    ///
    /// # Errors
    /// Returns error if the URL is invalid or the body does not serialize.
    pub fn json_request<B: Serialize>(
        &self,
        method: Method,
        segments: &[&str],
        body: &B,
    ) -> Result<TransportRequest, ApiError> {
        let mut request = self.request(method, segments, &[])?;
        let json = serde_json::to_vec(body).map_err(|e| ApiError::Parse(e.to_string()))?;
        request
            .headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        request.body = Some(Bytes::from(json));
        Ok(request)
    }
}

/// Persistent event-stream client.
#[derive(Clone)]
pub struct StreamClient {
    base_url: String,
    engine: Arc<dyn HttpEngine>,
    policy: HeaderPolicy,
}

impl std::fmt::Debug for StreamClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl StreamClient {
    pub(crate) fn new(base_url: String, engine: Arc<dyn HttpEngine>, policy: HeaderPolicy) -> Self {
        Self {
            base_url,
            engine,
            policy,
        }
    }

    /// Open the event stream at `segments` and split it into frames.
    ///
    /// # Errors
    /// Returns the engine's error or the mapped non-2xx status.
    pub async fn connect(&self, segments: &[&str]) -> Result<FrameStream, ApiError> {
        let mut request =
            TransportRequest::new(Method::GET, join_url(&self.base_url, segments, &[])?);
        request
            .headers
            .insert(ACCEPT, HeaderValue::from_static("text/event-stream"));
        request
            .headers
            .insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        self.policy.apply(&mut request.headers);

        let url = request.url.clone();
        tracing::debug!(%url, "Connecting event stream");
        let response = self.engine.open_stream(request).await?;
        tracing::debug!(%url, status = response.status, "Event stream responded");

        if !(200..300).contains(&response.status) {
            let mut body = Vec::new();
            let mut chunks = response.body;
            while let Some(Ok(chunk)) = chunks.next().await {
                body.extend_from_slice(&chunk);
                if body.len() >= MAX_ERROR_BODY {
                    break;
                }
            }
            return Err(map_status(response.status, &body));
        }

        Ok(sse_frames(response.body))
    }
}

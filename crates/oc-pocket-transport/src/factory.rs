//! Authenticated transport factory.
//!
//! Builds the request/response client and the streaming client from one
//! shared configuration. Both clients apply the same header policy to every
//! request:
//!
//! - `Authorization: Bearer <token>` when the token provider yields a
//!   non-blank value, otherwise no `Authorization` header at all.
//! - `x-opencode-directory`: a value already set on the request wins and the
//!   provider is not consulted; otherwise the provider's value, if any. The
//!   header is never sent twice.
//!
//! Providers are polled per request, so rotating or clearing the token takes
//! effect without rebuilding the clients.

use std::sync::Arc;

use oc_pocket_core::{ApiError, DirectoryProvider, TokenProvider};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};

use crate::{
    HttpEngine, ReqwestEngine, TransportConfig,
    client::{RestClient, StreamClient},
};

/// Directory scope header.
pub const DIRECTORY_HEADER: &str = "x-opencode-directory";

/// Per-request header injection.
#[derive(Clone, Default)]
pub struct HeaderPolicy {
    token_provider: Option<TokenProvider>,
    directory_provider: Option<DirectoryProvider>,
}

impl std::fmt::Debug for HeaderPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeaderPolicy")
            .field("token_provider", &self.token_provider.is_some())
            .field("directory_provider", &self.directory_provider.is_some())
            .finish()
    }
}

impl HeaderPolicy {
    #[must_use]
    pub fn new(
        token_provider: Option<TokenProvider>,
        directory_provider: Option<DirectoryProvider>,
    ) -> Self {
        Self {
            token_provider,
            directory_provider,
        }
    }

    /// Apply the authorization and directory rules to `headers`.
    pub fn apply(&self, headers: &mut HeaderMap) {
        apply_auth_headers(
            headers,
            self.token_provider.as_deref(),
            self.directory_provider.as_deref(),
        );
    }
}

/// Apply the authorization and directory rules with explicit providers.
pub fn apply_auth_headers(
    headers: &mut HeaderMap,
    token_provider: Option<&(dyn Fn() -> Option<String> + Send + Sync)>,
    directory_provider: Option<&(dyn Fn() -> Option<String> + Send + Sync)>,
) {
    headers.remove(AUTHORIZATION);
    if let Some(token) = token_provider.and_then(|p| non_blank(p())) {
        match HeaderValue::from_str(&format!("Bearer {token}")) {
            Ok(mut value) => {
                value.set_sensitive(true);
                headers.insert(AUTHORIZATION, value);
            }
            Err(_) => tracing::warn!("Token contains characters not allowed in a header, omitting"),
        }
    }

    if let Some(existing) = headers.get(DIRECTORY_HEADER).cloned() {
        // `insert` drops any extra values a caller appended.
        headers.insert(DIRECTORY_HEADER, existing);
        return;
    }
    if let Some(dir) = directory_provider.and_then(|p| non_blank(p())) {
        match HeaderValue::from_bytes(dir.as_bytes()) {
            Ok(value) => {
                headers.insert(DIRECTORY_HEADER, value);
            }
            Err(_) => tracing::warn!(directory = %dir, "Directory not usable as a header value, omitting"),
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Builds clients sharing one engine and header policy.
#[derive(Clone)]
pub struct TransportFactory {
    base_url: String,
    engine: Arc<dyn HttpEngine>,
    policy: HeaderPolicy,
}

impl std::fmt::Debug for TransportFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportFactory")
            .field("base_url", &self.base_url)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl TransportFactory {
    /// Create a factory backed by [`ReqwestEngine`].
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, config: &TransportConfig) -> Result<Self, ApiError> {
        Ok(Self::with_engine(base_url, Arc::new(ReqwestEngine::new(config)?)))
    }

    /// Create a factory backed by a custom engine.
    #[must_use]
    pub fn with_engine(base_url: impl Into<String>, engine: Arc<dyn HttpEngine>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            engine,
            policy: HeaderPolicy::default(),
        }
    }

    /// Set the token provider polled on every request.
    #[must_use]
    pub fn token_provider(mut self, provider: TokenProvider) -> Self {
        self.policy.token_provider = Some(provider);
        self
    }

    /// Set the default directory scope provider.
    #[must_use]
    pub fn directory_provider(mut self, provider: DirectoryProvider) -> Self {
        self.policy.directory_provider = Some(provider);
        self
    }

    /// Server base URL, without a trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Request/response client.
    #[must_use]
    pub fn rest_client(&self) -> RestClient {
        RestClient::new(
            self.base_url.clone(),
            Arc::clone(&self.engine),
            self.policy.clone(),
        )
    }

    /// Persistent streaming client.
    #[must_use]
    pub fn stream_client(&self) -> StreamClient {
        StreamClient::new(
            self.base_url.clone(),
            Arc::clone(&self.engine),
            self.policy.clone(),
        )
    }
}

//! Transport configuration.

use std::time::Duration;

/// Timeouts and identification for the HTTP engine.
///
/// Request/response calls fail fast; streams may sit idle for a long time
/// between events, so they only carry a read timeout.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Time allowed to establish a connection.
    pub connect_timeout: Duration,
    /// Total time allowed for a request/response call.
    pub request_timeout: Duration,
    /// Maximum silence on an open stream before it is considered dead.
    pub stream_read_timeout: Duration,
    /// `User-Agent` sent with every request.
    pub user_agent: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            stream_read_timeout: Duration::from_secs(600),
            user_agent: format!("oc-pocket/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

//! Authenticated transport for an oc-pocket server.
//!
//! Provides:
//! - `TransportFactory` - Builds clients sharing one header policy
//! - `HttpEngine` - Substitutable engine (reqwest by default)
//! - `RestClient` / `StreamClient` - Request/response and event-stream clients
//! - Server-sent events framing
//! - HTTP implementation of the notification API

pub mod client;
pub mod config;
pub mod engine;
pub mod factory;
pub mod notifications;
pub mod sse;

pub use client::{RestClient, StreamClient, map_status};
pub use config::TransportConfig;
pub use engine::{ByteStream, HttpEngine, ReqwestEngine, StreamResponse, TransportRequest, TransportResponse};
pub use factory::{DIRECTORY_HEADER, HeaderPolicy, TransportFactory, apply_auth_headers};
pub use notifications::{EventSource, HttpNotificationApi, NotificationStreamClient};
pub use sse::{FrameStream, SseFrame, SseParser};

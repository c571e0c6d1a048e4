//! Notification endpoints over the authenticated clients.

use async_trait::async_trait;
use oc_pocket_core::{
    ApiError, MarkNotificationRequest, NotificationApi, NotificationRecord,
    NotificationsListResponse, UnreadCountResponse,
};
use reqwest::Method;

use crate::{
    TransportFactory,
    client::{RestClient, StreamClient},
    sse::FrameStream,
};

const NOTIFICATIONS: &str = "notifications";
const UNREAD_COUNT: &str = "unread-count";
const STREAM: &str = "stream";

/// [`NotificationApi`] backed by the REST client.
#[derive(Debug, Clone)]
pub struct HttpNotificationApi {
    client: RestClient,
}

impl HttpNotificationApi {
    #[must_use]
    pub const fn new(client: RestClient) -> Self {
        Self { client }
    }

    #[must_use]
    pub fn from_factory(factory: &TransportFactory) -> Self {
        Self::new(factory.rest_client())
    }
}

#[async_trait]
impl NotificationApi for HttpNotificationApi {
    async fn list(&self, limit: u32, offset: u32) -> Result<NotificationsListResponse, ApiError> {
        self.client
            .get_json(
                &[NOTIFICATIONS],
                &[("limit", limit.to_string()), ("offset", offset.to_string())],
            )
            .await
    }

    async fn unread_count(&self) -> Result<UnreadCountResponse, ApiError> {
        self.client.get_json(&[NOTIFICATIONS, UNREAD_COUNT], &[]).await
    }

    async fn get(&self, id: &str) -> Result<NotificationRecord, ApiError> {
        self.client.get_json(&[NOTIFICATIONS, id], &[]).await
    }

    async fn mark(&self, id: &str, request: MarkNotificationRequest) -> Result<(), ApiError> {
        let request = self
            .client
            .json_request(Method::PATCH, &[NOTIFICATIONS, id], &request)?;
        self.client.send(request).await.map(|_| ())
    }
}

/// Source of realtime frames, one connection per call.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Open a new connection.
    async fn connect(&self) -> Result<FrameStream, ApiError>;
}

/// [`EventSource`] for the notification stream endpoint.
#[derive(Debug, Clone)]
pub struct NotificationStreamClient {
    client: StreamClient,
}

impl NotificationStreamClient {
    #[must_use]
    pub const fn new(client: StreamClient) -> Self {
        Self { client }
    }

    #[must_use]
    pub fn from_factory(factory: &TransportFactory) -> Self {
        Self::new(factory.stream_client())
    }
}

#[async_trait]
impl EventSource for NotificationStreamClient {
    async fn connect(&self) -> Result<FrameStream, ApiError> {
        self.client.connect(&[NOTIFICATIONS, STREAM]).await
    }
}

//! Collaborator traits and the shared API error.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::{
    MarkNotificationRequest, NotificationRecord, NotificationsListResponse, ProactiveOutreach,
    UnreadCountResponse,
};

/// Typed transport failure. Never retried by the core.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },
    #[error("Parse error: {0}")]
    Parse(String),
}

impl ApiError {
    /// The access token is presumed invalid; the user should re-pair.
    #[must_use]
    pub const fn requires_repair(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }

    /// Corrective message for the UI.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Network(_) => "Can't reach your server. Check the connection and try again.".into(),
            Self::Unauthorized(_) => {
                "Your server rejected this device's access token. Pair again to reconnect.".into()
            }
            Self::NotFound(what) => format!("Not found: {what}"),
            Self::Http { status, message } => format!("Server error ({status}): {message}"),
            Self::Parse(_) => "The server sent a response this app doesn't understand.".into(),
        }
    }
}

/// Notification REST API.
#[async_trait]
pub trait NotificationApi: Send + Sync {
    /// Fetch one page of notifications.
    async fn list(&self, limit: u32, offset: u32) -> Result<NotificationsListResponse, ApiError>;

    /// Fetch the server's unread count.
    async fn unread_count(&self) -> Result<UnreadCountResponse, ApiError>;

    /// Fetch a single notification.
    async fn get(&self, id: &str) -> Result<NotificationRecord, ApiError>;

    /// Mark a notification read/archived.
    async fn mark(&self, id: &str, request: MarkNotificationRequest) -> Result<(), ApiError>;
}

#[async_trait]
impl<T: NotificationApi + ?Sized> NotificationApi for Arc<T> {
    async fn list(&self, limit: u32, offset: u32) -> Result<NotificationsListResponse, ApiError> {
        (**self).list(limit, offset).await
    }

    async fn unread_count(&self) -> Result<UnreadCountResponse, ApiError> {
        (**self).unread_count().await
    }

    async fn get(&self, id: &str) -> Result<NotificationRecord, ApiError> {
        (**self).get(id).await
    }

    async fn mark(&self, id: &str, request: MarkNotificationRequest) -> Result<(), ApiError> {
        (**self).mark(id, request).await
    }
}

/// Receives proactive outreach for navigation.
///
/// Called from the ingestion loop; must return promptly.
pub trait DeepLinkHandler: Send + Sync {
    fn open(&self, outreach: &ProactiveOutreach);
}

/// Handler that drops every event.
#[derive(Debug, Default, Clone)]
pub struct IgnoreDeepLinks;

impl DeepLinkHandler for IgnoreDeepLinks {
    fn open(&self, outreach: &ProactiveOutreach) {
        tracing::debug!(event_id = %outreach.event_id, "No deep link handler, dropping outreach");
    }
}

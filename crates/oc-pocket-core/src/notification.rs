//! Notification records and their REST shapes.
//!
//! Timestamps are Unix epoch milliseconds.

use serde::{Deserialize, Serialize};

/// Default page size used by the server when `limit` is omitted.
pub const DEFAULT_PAGE_LIMIT: u32 = 50;

/// Type-specific links attached to a notification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meeting_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deep_link_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
}

/// A notification, keyed by `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: String,
    /// Server-defined kind; kept as a string so new kinds pass through.
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub body: String,
    pub created_at: i64,
    #[serde(default)]
    pub read_at: Option<i64>,
    #[serde(default)]
    pub archived_at: Option<i64>,
    #[serde(default)]
    pub metadata: Option<NotificationMetadata>,
}

impl NotificationRecord {
    /// Neither read nor archived.
    #[must_use]
    pub const fn is_unread(&self) -> bool {
        self.read_at.is_none() && self.archived_at.is_none()
    }
}

/// Partial update carried by a patch envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPatch {
    pub id: String,
    #[serde(default)]
    pub read_at: Option<i64>,
    #[serde(default)]
    pub archived_at: Option<i64>,
}

impl NotificationPatch {
    /// Merge the present fields into `record`, leaving absent ones untouched.
    ///
    /// Patches only ever set timestamps; they never clear them.
    /// Returns true if the record changed.
    pub fn apply_to(&self, record: &mut NotificationRecord) -> bool {
        let mut changed = false;
        if let Some(read_at) = self.read_at {
            changed |= record.read_at.replace(read_at) != Some(read_at);
        }
        if let Some(archived_at) = self.archived_at {
            changed |= record.archived_at.replace(archived_at) != Some(archived_at);
        }
        changed
    }
}

/// `GET /notifications` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationsListResponse {
    pub notifications: Vec<NotificationRecord>,
    #[serde(default)]
    pub total: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
    #[serde(default)]
    pub has_more: Option<bool>,
}

const fn default_limit() -> u32 {
    DEFAULT_PAGE_LIMIT
}

impl NotificationsListResponse {
    /// Explicit server flag, else `offset + returned < total`.
    #[must_use]
    pub fn computed_has_more(&self) -> bool {
        self.has_more.unwrap_or_else(|| {
            u64::from(self.offset) + (self.notifications.len() as u64) < u64::from(self.total)
        })
    }
}

/// Ordered page of notifications as exposed to UI collaborators.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotificationListView {
    pub notifications: Vec<NotificationRecord>,
    pub total: u32,
    pub limit: u32,
    pub offset: u32,
    pub has_more: bool,
}

impl From<NotificationsListResponse> for NotificationListView {
    fn from(response: NotificationsListResponse) -> Self {
        let has_more = response.computed_has_more();
        Self {
            notifications: response.notifications,
            total: response.total,
            limit: response.limit,
            offset: response.offset,
            has_more,
        }
    }
}

/// `GET /notifications/unread-count` response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnreadCountResponse {
    #[serde(default)]
    pub count: Option<u32>,
    #[serde(default)]
    pub unread_count: Option<u32>,
}

impl UnreadCountResponse {
    /// `count`, else `unread_count`, else zero.
    #[must_use]
    pub fn value(&self) -> u32 {
        self.count.or(self.unread_count).unwrap_or(0)
    }
}

/// `PATCH /notifications/{id}` body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkNotificationRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archived: Option<bool>,
}

/// Tri-state mark flags. `None` leaves the timestamp untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MarkFlags {
    pub read: Option<bool>,
    pub archived: Option<bool>,
}

impl MarkFlags {
    #[must_use]
    pub const fn read() -> Self {
        Self {
            read: Some(true),
            archived: None,
        }
    }

    #[must_use]
    pub const fn archived() -> Self {
        Self {
            read: None,
            archived: Some(true),
        }
    }

    /// Apply to `record` using `now` for newly set timestamps.
    ///
    /// Idempotent: an already-set timestamp is kept, not refreshed.
    /// Returns true if the record changed.
    pub fn apply_to(&self, record: &mut NotificationRecord, now: i64) -> bool {
        let read = apply_flag(&mut record.read_at, self.read, now);
        let archived = apply_flag(&mut record.archived_at, self.archived, now);
        read || archived
    }
}

fn apply_flag(slot: &mut Option<i64>, flag: Option<bool>, now: i64) -> bool {
    match (flag, *slot) {
        (Some(true), None) => {
            *slot = Some(now);
            true
        }
        (Some(false), Some(_)) => {
            *slot = None;
            true
        }
        _ => false,
    }
}

impl From<MarkFlags> for MarkNotificationRequest {
    fn from(flags: MarkFlags) -> Self {
        Self {
            read: flags.read,
            archived: flags.archived,
        }
    }
}

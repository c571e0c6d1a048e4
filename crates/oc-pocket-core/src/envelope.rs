//! Versioned realtime envelopes.
//!
//! Decoding is permissive: unknown fields are ignored, any `schema_version`
//! is accepted, and only the fields the sync engine consumes are validated.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::{NotificationPatch, NotificationRecord};

/// Event name for a newly created notification.
pub const CREATED_EVENT: &str = "notification.created";
/// Event name for a partial notification update.
pub const UPDATED_EVENT: &str = "notification.updated";
/// Event name (and payload `type`) for proactive outreach.
pub const PROACTIVE_EVENT: &str = "proactive_outreach";

/// Schema version this client was written against.
pub const CURRENT_SCHEMA_VERSION: u64 = 1;

/// Deep link used when a proactive event does not carry one.
pub const DEFAULT_DEEP_LINK: &str = "oc-pocket://chat";

/// Envelope decoding error.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("envelope is not a JSON object")]
    NotAnObject,
}

/// Proactive outreach: routed to navigation, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProactiveOutreach {
    #[serde(skip)]
    pub schema_version: u64,
    pub event_id: String,
    pub session_id: String,
    pub title: String,
    pub body: String,
    #[serde(default = "default_deep_link")]
    pub deep_link: String,
}

fn default_deep_link() -> String {
    DEFAULT_DEEP_LINK.to_string()
}

/// One realtime event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Envelope {
    Created {
        schema_version: u64,
        record: NotificationRecord,
    },
    Patched {
        schema_version: u64,
        patch: NotificationPatch,
    },
    Proactive(ProactiveOutreach),
}

#[derive(Deserialize)]
struct CreatedWire {
    notification: NotificationRecord,
}

#[derive(Deserialize)]
struct PatchedWire {
    notification: NotificationPatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Created,
    Patched,
    Proactive,
}

impl Envelope {
    /// Decode one event.
    ///
    /// `event` is the stream's event name, if it sent one. Returns `Ok(None)`
    /// for event types this client does not handle.
    ///
    /// # Errors
    /// Returns error if the payload is not JSON or lacks a consumed field.
    pub fn decode(event: Option<&str>, data: &str) -> Result<Option<Self>, EnvelopeError> {
        let value: Value = serde_json::from_str(data)?;
        if !value.is_object() {
            return Err(EnvelopeError::NotAnObject);
        }

        let kind = match event.map(str::trim) {
            Some(CREATED_EVENT) => Some(Kind::Created),
            Some(UPDATED_EVENT) => Some(Kind::Patched),
            Some(PROACTIVE_EVENT) => Some(Kind::Proactive),
            None | Some("" | "message") => infer_kind(&value),
            Some(_) => None,
        };
        let Some(kind) = kind else {
            return Ok(None);
        };

        let schema_version = value
            .get("schema_version")
            .and_then(Value::as_u64)
            .unwrap_or(CURRENT_SCHEMA_VERSION);
        if schema_version > CURRENT_SCHEMA_VERSION {
            tracing::debug!(schema_version, "decoding envelope from a newer schema");
        }

        let envelope = match kind {
            Kind::Created => {
                let wire: CreatedWire = serde_json::from_value(value)?;
                Self::Created {
                    schema_version,
                    record: wire.notification,
                }
            }
            Kind::Patched => {
                let wire: PatchedWire = serde_json::from_value(value)?;
                Self::Patched {
                    schema_version,
                    patch: wire.notification,
                }
            }
            Kind::Proactive => {
                let mut outreach: ProactiveOutreach = serde_json::from_value(value)?;
                outreach.schema_version = schema_version;
                Self::Proactive(outreach)
            }
        };
        Ok(Some(envelope))
    }

    /// Schema version the envelope was sent with.
    #[must_use]
    pub const fn schema_version(&self) -> u64 {
        match self {
            Self::Created { schema_version, .. } | Self::Patched { schema_version, .. } => {
                *schema_version
            }
            Self::Proactive(outreach) => outreach.schema_version,
        }
    }

    /// Short label for logs.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Created { .. } => CREATED_EVENT,
            Self::Patched { .. } => UPDATED_EVENT,
            Self::Proactive(_) => PROACTIVE_EVENT,
        }
    }
}

fn infer_kind(value: &Value) -> Option<Kind> {
    if value.get("type").and_then(Value::as_str) == Some(PROACTIVE_EVENT) {
        return Some(Kind::Proactive);
    }
    let notification = value.get("notification")?.as_object()?;
    if notification.contains_key("created_at") {
        Some(Kind::Created)
    } else {
        Some(Kind::Patched)
    }
}

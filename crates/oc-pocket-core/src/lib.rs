//! Core building blocks for an oc-pocket client.
//!
//! This crate provides the pure, I/O-free pieces:
//! - `PairingPayload` - Codec for the out-of-band pairing string
//! - `Credential` - Shared bearer token holder and provider functions
//! - `DeviceIdentity` - Stable installation identifier
//! - `NotificationRecord` and REST shapes
//! - `Envelope` - Realtime event decoding
//! - `NotificationApi` and `DeepLinkHandler` traits

pub mod credential;
pub mod envelope;
pub mod identity;
pub mod notification;
pub mod pairing;
pub mod traits;

pub use credential::{Credential, DirectoryProvider, TokenProvider};
pub use envelope::{Envelope, EnvelopeError, ProactiveOutreach};
pub use identity::{DeviceIdentity, InstallationPaths};
pub use notification::{
    MarkFlags, MarkNotificationRequest, NotificationListView, NotificationMetadata,
    NotificationPatch, NotificationRecord, NotificationsListResponse, UnreadCountResponse,
};
pub use pairing::{PairingError, PairingPayload, decode_pairing_code};
pub use traits::{ApiError, DeepLinkHandler, IgnoreDeepLinks, NotificationApi};

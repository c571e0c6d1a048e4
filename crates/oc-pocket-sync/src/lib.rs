//! Realtime notification reconciliation.
//!
//! Provides:
//! - `NotificationSyncEngine` - Bulk fetch, ordered envelope ingestion, marks
//! - `ConnectionState` - Realtime connection state for the UI
//! - `NotificationStore` - Records keyed by id with derived aggregates
//! - `SyncFeed` - Latest state then live updates for subscribers
//! - `DedupeWindow` - Proactive event de-duplication

pub mod config;
pub mod connection;
pub mod dedupe;
pub mod engine;
pub mod feed;
pub mod store;

pub use config::{SyncConfig, UnknownPatchPolicy};
pub use connection::ConnectionState;
pub use dedupe::DedupeWindow;
pub use engine::{NotificationSyncEngine, SyncError};
pub use feed::{Subscription, SyncFeed, SyncUpdate};
pub use store::{LocalChange, NotificationStore};

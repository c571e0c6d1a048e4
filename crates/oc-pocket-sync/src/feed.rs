//! Change feed: latest state for new subscribers, then live updates.

use std::sync::{Arc, PoisonError, RwLock};

use futures::{StreamExt, stream::BoxStream};
use oc_pocket_core::NotificationRecord;
use tokio::{sync::broadcast, task::JoinHandle};
use tokio_stream::wrappers::BroadcastStream;

const CHANNEL_CAPACITY: usize = 256;

/// One observable change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncUpdate {
    /// Full ordered record list after a change.
    Records(Arc<Vec<NotificationRecord>>),
    UnreadCount(u32),
}

#[derive(Debug, Default)]
struct Latest {
    records: Arc<Vec<NotificationRecord>>,
    unread: u32,
}

/// Broadcast of [`SyncUpdate`]s that remembers the latest of each kind.
///
/// Updates carry whole snapshots, so a subscriber that falls behind is
/// resynchronized by replaying the latest state.
#[derive(Debug)]
pub struct SyncFeed {
    latest: Arc<RwLock<Latest>>,
    sender: broadcast::Sender<SyncUpdate>,
}

impl Default for SyncFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncFeed {
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            latest: Arc::new(RwLock::new(Latest::default())),
            sender,
        }
    }

    /// Publish a new record list.
    pub fn publish_records(&self, records: Vec<NotificationRecord>) {
        let records = Arc::new(records);
        self.latest
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .records = Arc::clone(&records);
        let _ = self.sender.send(SyncUpdate::Records(records));
    }

    /// Publish the unread count if it differs from the last one.
    pub fn publish_unread(&self, count: u32) -> bool {
        {
            let mut latest = self.latest.write().unwrap_or_else(PoisonError::into_inner);
            if latest.unread == count {
                return false;
            }
            latest.unread = count;
        }
        let _ = self.sender.send(SyncUpdate::UnreadCount(count));
        true
    }

    /// Latest state as updates: records first, then the unread count.
    #[must_use]
    pub fn snapshot(&self) -> Vec<SyncUpdate> {
        snapshot_of(&self.latest)
    }

    /// Stream that yields the latest state, then live updates.
    #[must_use]
    pub fn stream(&self) -> BoxStream<'static, SyncUpdate> {
        // Subscribe before reading the snapshot so nothing falls in between.
        let rx = self.sender.subscribe();
        let snapshot = self.snapshot();

        let latest = Arc::clone(&self.latest);
        let live = BroadcastStream::new(rx).flat_map(move |res| {
            let updates = match res {
                Ok(update) => vec![update],
                Err(e) => {
                    tracing::debug!(error = %e, "Subscriber lagged, replaying latest state");
                    snapshot_of(&latest)
                }
            };
            futures::stream::iter(updates)
        });

        futures::stream::iter(snapshot).chain(live).boxed()
    }

    /// Drive `stream()` into the two callbacks on a background task.
    ///
    /// # Panics
    /// Panics if called outside a Tokio runtime.
    pub fn subscribe<R, U>(&self, on_records: R, on_unread: U) -> Subscription
    where
        R: Fn(&[NotificationRecord]) + Send + 'static,
        U: Fn(u32) + Send + 'static,
    {
        let mut updates = self.stream();
        let handle = tokio::spawn(async move {
            while let Some(update) = updates.next().await {
                match update {
                    SyncUpdate::Records(records) => on_records(records.as_slice()),
                    SyncUpdate::UnreadCount(count) => on_unread(count),
                }
            }
        });
        Subscription { handle }
    }
}

fn snapshot_of(latest: &RwLock<Latest>) -> Vec<SyncUpdate> {
    let latest = latest.read().unwrap_or_else(PoisonError::into_inner);
    vec![
        SyncUpdate::Records(Arc::clone(&latest.records)),
        SyncUpdate::UnreadCount(latest.unread),
    ]
}

/// Handle to a callback subscription. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    handle: JoinHandle<()>,
}

impl Subscription {
    /// Stop delivering updates.
    pub fn cancel(self) {
        drop(self);
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.handle.is_finished()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

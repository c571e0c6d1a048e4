//! Notification sync engine.

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use futures::{Stream, StreamExt, stream::BoxStream};
use oc_pocket_core::{
    ApiError, DeepLinkHandler, Envelope, IgnoreDeepLinks, MarkFlags, NotificationApi,
    NotificationListView, NotificationPatch, NotificationRecord, ProactiveOutreach,
};
use oc_pocket_transport::{EventSource, SseFrame};
use tokio::sync::{Mutex, RwLock, watch};

use crate::{
    ConnectionState, DedupeWindow, SyncConfig, UnknownPatchPolicy,
    connection::DisconnectOnDrop,
    feed::{Subscription, SyncFeed, SyncUpdate},
    store::{LocalChange, NotificationStore, now_millis},
};

/// Sync engine error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Api(#[from] ApiError),
}

impl SyncError {
    /// The server rejected the credentials; the user should re-pair.
    #[must_use]
    pub const fn requires_repair(&self) -> bool {
        match self {
            Self::Api(e) => e.requires_repair(),
        }
    }
}

/// Counts a bulk fetch as in flight until dropped, including on cancellation.
struct FetchGuard<'a>(&'a AtomicUsize);

impl<'a> FetchGuard<'a> {
    fn new(fetches: &'a AtomicUsize) -> Self {
        fetches.fetch_add(1, Ordering::SeqCst);
        Self(fetches)
    }
}

impl Drop for FetchGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

enum Attempt {
    Finished(Result<(), SyncError>),
    ScopeChanged,
}

/// Keeps a local notification list in step with the server.
///
/// Bulk fetches and mark requests may run concurrently with ingestion.
/// Every mutation goes through one write lock and is published while that
/// lock is held, so subscribers see changes in the order they were applied.
/// Changes made while a bulk fetch is in flight are journaled and
/// re-applied over the fetched page. Envelopes from one stream are applied
/// strictly in arrival order.
pub struct NotificationSyncEngine<A>
where
    A: NotificationApi,
{
    api: A,
    config: SyncConfig,
    store: RwLock<NotificationStore>,
    fetches: AtomicUsize,
    paging: Mutex<()>,
    dedupe: Mutex<DedupeWindow>,
    deep_links: Arc<dyn DeepLinkHandler>,
    feed: SyncFeed,
    state: watch::Sender<ConnectionState>,
}

impl<A> NotificationSyncEngine<A>
where
    A: NotificationApi,
{
    /// Create an engine with an empty store.
    #[must_use]
    pub fn new(api: A, config: SyncConfig) -> Self {
        let dedupe = DedupeWindow::new(config.proactive_window);
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            api,
            config,
            store: RwLock::new(NotificationStore::new()),
            fetches: AtomicUsize::new(0),
            paging: Mutex::new(()),
            dedupe: Mutex::new(dedupe),
            deep_links: Arc::new(IgnoreDeepLinks),
            feed: SyncFeed::new(),
            state,
        }
    }

    /// Route proactive outreach to `handler`.
    #[must_use]
    pub fn with_deep_link_handler(mut self, handler: Arc<dyn DeepLinkHandler>) -> Self {
        self.deep_links = handler;
        self
    }

    #[must_use]
    pub const fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Watch the realtime connection state.
    #[must_use]
    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Replace local state with the first page and the server's unread count.
    ///
    /// Local changes applied while the fetch was in flight are kept.
    ///
    /// # Errors
    /// Returns error if either fetch fails; local state is then untouched.
    pub async fn resync(&self) -> Result<(), SyncError> {
        let _fetch = FetchGuard::new(&self.fetches);
        let since = self.store.read().await.generation();

        let (page, unread) = tokio::try_join!(
            self.api.list(self.config.page_size, 0),
            self.api.unread_count()
        )?;
        tracing::debug!(
            returned = page.notifications.len(),
            total = page.total,
            "Resynced notifications"
        );

        let mut store = self.store.write().await;
        store.replace_page(page, unread.value(), since);
        self.publish(&store);
        Ok(())
    }

    /// Fetch the next server page.
    ///
    /// Returns whether the server has more. Calls are serialized; a page
    /// that raced with a resync is discarded.
    ///
    /// # Errors
    /// Returns error if the fetch fails.
    pub async fn load_more(&self) -> Result<bool, SyncError> {
        let _paging = self.paging.lock().await;
        let _fetch = FetchGuard::new(&self.fetches);
        let (offset, epoch, since) = {
            let store = self.store.read().await;
            (store.cursor(), store.epoch(), store.generation())
        };

        let page = self.api.list(self.config.page_size, offset).await?;

        let mut store = self.store.write().await;
        if !store.merge_page(page, epoch, since) {
            tracing::debug!(offset, "Discarding page fetched before a resync");
        }
        self.publish(&store);
        Ok(store.has_more())
    }

    /// Fetch and publish the server's unread count.
    ///
    /// # Errors
    /// Returns error if the fetch fails.
    pub async fn refresh_unread_count(&self) -> Result<u32, SyncError> {
        let count = self.api.unread_count().await?.value();
        let mut store = self.store.write().await;
        store.set_unread(count);
        self.feed.publish_unread(count);
        Ok(count)
    }

    /// Apply one decoded envelope. Never fails.
    pub async fn apply(&self, envelope: Envelope) {
        tracing::debug!(
            event = envelope.label(),
            schema_version = envelope.schema_version(),
            "Applying envelope"
        );
        match envelope {
            Envelope::Created { record, .. } => {
                let mut store = self.store.write().await;
                if self.commit(&mut store, LocalChange::Created(record)) {
                    self.publish(&store);
                }
            }
            Envelope::Patched { patch, .. } => self.apply_patch(patch).await,
            Envelope::Proactive(outreach) => self.route_proactive(&outreach).await,
        }
    }

    async fn apply_patch(&self, patch: NotificationPatch) {
        {
            let mut store = self.store.write().await;
            let known = store.contains(&patch.id);
            if known || self.config.unknown_patch == UnknownPatchPolicy::Drop {
                if !known {
                    tracing::debug!(id = %patch.id, "Dropping patch for unknown notification");
                }
                // Journaled even when unknown, so a page in flight picks it up.
                if self.commit(&mut store, LocalChange::Patched(patch)) {
                    self.publish(&store);
                }
                return;
            }
        }

        match self.api.get(&patch.id).await {
            Ok(record) => {
                let mut store = self.store.write().await;
                if self.commit(&mut store, LocalChange::Fetched { record, patch }) {
                    self.publish(&store);
                }
            }
            Err(e) => {
                tracing::warn!(id = %patch.id, error = %e, "Failed to fetch patched notification");
            }
        }
    }

    async fn route_proactive(&self, outreach: &ProactiveOutreach) {
        if !self.dedupe.lock().await.insert(&outreach.event_id) {
            tracing::debug!(event_id = %outreach.event_id, "Suppressing duplicate outreach");
            return;
        }
        self.deep_links.open(outreach);
    }

    /// Decode and apply one frame. Malformed frames are logged and dropped.
    pub async fn ingest_frame(&self, frame: &SseFrame) {
        match Envelope::decode(frame.event.as_deref(), &frame.data) {
            Ok(Some(envelope)) => self.apply(envelope).await,
            Ok(None) => {
                tracing::debug!(event = ?frame.event, "Ignoring unrecognized event");
            }
            Err(e) => {
                tracing::warn!(event = ?frame.event, error = %e, "Dropping malformed envelope");
            }
        }
    }

    /// Apply frames in arrival order until the stream ends.
    ///
    /// # Errors
    /// Returns the transport error that ended the stream.
    pub async fn ingest<S>(&self, frames: S) -> Result<(), ApiError>
    where
        S: Stream<Item = Result<SseFrame, ApiError>> + Send,
    {
        tokio::pin!(frames);
        while let Some(frame) = frames.next().await {
            self.ingest_frame(&frame?).await;
        }
        Ok(())
    }

    /// Keep the store live: connect, resync, ingest, and reconnect with
    /// jittered backoff whenever the stream ends or fails.
    ///
    /// Runs until the server rejects the credentials and returns that
    /// error. Drop the future to stop it.
    pub async fn run<E>(&self, source: &E) -> SyncError
    where
        E: EventSource + ?Sized,
    {
        let (_scope, scope) = watch::channel(());
        self.run_scoped(source, scope).await
    }

    /// Like [`Self::run`], but reconnects at once whenever `scope` changes
    /// to a different value, such as a new directory scope. Streams are
    /// scoped when they are opened, so a new scope needs a new connection.
    pub async fn run_scoped<E, K>(&self, source: &E, mut scope: watch::Receiver<K>) -> SyncError
    where
        E: EventSource + ?Sized,
        K: Clone + PartialEq + Send + Sync,
    {
        let _disconnect = DisconnectOnDrop(&self.state);
        let mut current = scope.borrow_and_update().clone();
        let mut delay = self.config.reconnect_delay;
        let mut attempt: u32 = 0;

        loop {
            self.state.send_replace(ConnectionState::Connecting);
            let outcome = tokio::select! {
                result = self.connect_once(source) => Attempt::Finished(result),
                () = scope_changed(&mut scope, &mut current) => Attempt::ScopeChanged,
            };

            match outcome {
                Attempt::ScopeChanged => {
                    tracing::info!("Connection scope changed, reconnecting");
                    delay = self.config.reconnect_delay;
                    attempt = 0;
                    continue;
                }
                Attempt::Finished(result) => {
                    if self.state.borrow().is_connected() {
                        delay = self.config.reconnect_delay;
                        attempt = 0;
                    }
                    match result {
                        Ok(()) => tracing::info!("Notification stream ended"),
                        Err(e) if e.requires_repair() => {
                            tracing::warn!(error = %e, "Notification stream unauthorized, stopping");
                            return e;
                        }
                        Err(e) => tracing::warn!(error = %e, "Notification stream failed"),
                    }
                }
            }

            attempt = attempt.saturating_add(1);
            let wait = self.config.jittered(delay);
            self.state.send_replace(ConnectionState::Reconnecting {
                attempt,
                retry_in: wait,
            });
            tracing::info!(attempt, delay_ms = wait.as_millis(), "Reconnecting notification stream");

            let changed = tokio::select! {
                () = tokio::time::sleep(wait) => false,
                () = scope_changed(&mut scope, &mut current) => true,
            };
            if changed {
                tracing::info!("Connection scope changed, reconnecting");
                delay = self.config.reconnect_delay;
                attempt = 0;
            } else {
                delay = self.config.next_delay(delay);
            }
        }
    }

    async fn connect_once<E>(&self, source: &E) -> Result<(), SyncError>
    where
        E: EventSource + ?Sized,
    {
        let frames = source.connect().await?;
        tracing::info!("Notification stream connected");

        // Events that arrive during the resync stay buffered in the stream
        // and are applied on top of the fresh state.
        self.resync().await?;
        self.state.send_replace(ConnectionState::Connected);
        self.ingest(frames).await?;
        Ok(())
    }

    /// Mark a notification read and/or archived.
    ///
    /// The server is updated first; the local record follows on success.
    /// Ids not held locally are still sent, so notifications reached by
    /// deep link can be marked before they are paged in. Flags that are
    /// all unspecified are a no-op.
    ///
    /// # Errors
    /// Returns error if the request fails.
    pub async fn mark_notification(&self, id: &str, flags: MarkFlags) -> Result<(), SyncError> {
        if flags == MarkFlags::default() {
            return Ok(());
        }

        self.api.mark(id, flags.into()).await?;

        let mut store = self.store.write().await;
        if !store.contains(id) {
            tracing::debug!(id, "Marked notification is not held locally");
        }
        let change = LocalChange::Marked {
            id: id.to_string(),
            flags,
            at: now_millis(),
        };
        if self.commit(&mut store, change) {
            self.publish(&store);
        }
        Ok(())
    }

    pub async fn current_unread_count(&self) -> u32 {
        self.store.read().await.unread_count()
    }

    /// Records newest first.
    pub async fn records(&self) -> Vec<NotificationRecord> {
        self.store.read().await.ordered()
    }

    pub async fn get(&self, id: &str) -> Option<NotificationRecord> {
        self.store.read().await.get(id).cloned()
    }

    /// Everything held as one page, with the server's `has_more`.
    pub async fn list_view(&self) -> NotificationListView {
        self.store.read().await.view()
    }

    /// Deliver the current state, then every change, to two callbacks.
    ///
    /// # Panics
    /// Panics if called outside a Tokio runtime.
    pub fn subscribe<R, U>(&self, on_records: R, on_unread: U) -> Subscription
    where
        R: Fn(&[NotificationRecord]) + Send + 'static,
        U: Fn(u32) + Send + 'static,
    {
        self.feed.subscribe(on_records, on_unread)
    }

    /// Current state followed by every change, as a stream.
    #[must_use]
    pub fn updates(&self) -> BoxStream<'static, SyncUpdate> {
        self.feed.stream()
    }

    /// Apply `change`, journaling it while a bulk fetch is in flight.
    fn commit(&self, store: &mut NotificationStore, change: LocalChange) -> bool {
        let changed = store.apply(&change);
        if self.fetches.load(Ordering::SeqCst) > 0 {
            store.remember(change);
        } else {
            store.forget();
        }
        changed
    }

    fn publish(&self, store: &NotificationStore) {
        self.feed.publish_records(store.ordered());
        self.feed.publish_unread(store.unread_count());
    }
}

/// Resolves once `scope` holds a value different from `current`.
/// Never resolves if the sender is gone.
async fn scope_changed<K>(scope: &mut watch::Receiver<K>, current: &mut K)
where
    K: Clone + PartialEq,
{
    loop {
        if scope.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
        let next = scope.borrow_and_update().clone();
        if next != *current {
            *current = next;
            return;
        }
    }
}

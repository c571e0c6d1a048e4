//! In-memory notification store.
//!
//! Not synchronized: the engine owns it behind a single lock.

use std::{
    collections::HashMap,
    time::{SystemTime, UNIX_EPOCH},
};

use oc_pocket_core::{
    MarkFlags, NotificationListView, NotificationPatch, NotificationRecord,
    NotificationsListResponse,
};

/// A local mutation, kept so it can be re-applied over a page that was
/// fetched while it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalChange {
    /// Record from a creation envelope.
    Created(NotificationRecord),
    /// Patch for a record already held.
    Patched(NotificationPatch),
    /// Record fetched by id because a patch named it, plus that patch.
    Fetched {
        record: NotificationRecord,
        patch: NotificationPatch,
    },
    /// Mark confirmed by the server, stamped at `at`.
    Marked {
        id: String,
        flags: MarkFlags,
        at: i64,
    },
}

/// Records keyed by id plus the server-derived aggregates.
///
/// The unread count starts from the server's value and moves by one on
/// every local unread transition. `cursor` is the position in the server's
/// list where the next page starts; records fetched by id do not move it.
#[derive(Debug, Default)]
pub struct NotificationStore {
    records: HashMap<String, NotificationRecord>,
    total: u32,
    limit: u32,
    has_more: bool,
    unread: u32,
    cursor: u32,
    epoch: u64,
    generation: u64,
    journal: Vec<(u64, LocalChange)>,
}

/// Current time in Unix epoch milliseconds.
pub(crate) fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

fn page_len(page: &NotificationsListResponse) -> u32 {
    u32::try_from(page.notifications.len()).unwrap_or(u32::MAX)
}

impl NotificationStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace everything with a first page and a fresh unread count, then
    /// re-apply local changes journaled after generation `since`.
    pub fn replace_page(&mut self, page: NotificationsListResponse, unread: u32, since: u64) {
        self.has_more = page.computed_has_more();
        self.total = page.total;
        self.limit = page.limit;
        self.unread = unread;
        self.cursor = page.offset.saturating_add(page_len(&page));
        self.epoch += 1;
        self.records = page
            .notifications
            .into_iter()
            .map(|record| (record.id.clone(), record))
            .collect();
        self.replay_since(since);
    }

    /// Merge the page that starts at the cursor as of `epoch`.
    ///
    /// New records are already part of the server's unread count; records
    /// held locally are overwritten by the page copy and the count follows.
    /// Returns false, merging nothing, if a [`Self::replace_page`] happened
    /// since.
    pub fn merge_page(&mut self, page: NotificationsListResponse, epoch: u64, since: u64) -> bool {
        if epoch != self.epoch {
            return false;
        }
        self.has_more = page.computed_has_more();
        self.total = page.total;
        // Creations applied while the page was in flight already moved the
        // cursor, so advance from where it is now.
        self.cursor = self.cursor.saturating_add(page_len(&page));
        for record in page.notifications {
            let unread = record.is_unread();
            if let Some(previous) = self.records.insert(record.id.clone(), record) {
                self.shift_unread(previous.is_unread(), unread);
            }
        }
        self.replay_since(since);
        true
    }

    /// Apply a local change. Returns true if the stored state changed.
    pub fn apply(&mut self, change: &LocalChange) -> bool {
        match change {
            LocalChange::Created(record) => self.upsert(record.clone()),
            LocalChange::Patched(patch) => self.patch(patch).unwrap_or(false),
            LocalChange::Fetched { record, patch } => self.insert_fetched(record.clone(), patch),
            LocalChange::Marked { id, flags, at } => self.mark(id, *flags, *at).unwrap_or(false),
        }
    }

    /// Keep `change` for replay over pages fetched before it.
    pub fn remember(&mut self, change: LocalChange) {
        self.generation += 1;
        self.journal.push((self.generation, change));
    }

    /// Drop the journal once no fetch is in flight.
    pub fn forget(&mut self) {
        self.journal.clear();
    }

    fn replay_since(&mut self, since: u64) {
        let journal = std::mem::take(&mut self.journal);
        for (_, change) in journal.iter().filter(|(generation, _)| *generation > since) {
            self.apply(change);
        }
        self.journal = journal;
    }

    /// Insert or overwrite by id. Returns true if the stored state changed.
    ///
    /// A new id is a server-side creation: it counts toward `total` and
    /// shifts the paging cursor.
    pub fn upsert(&mut self, record: NotificationRecord) -> bool {
        let unread = record.is_unread();
        match self.records.insert(record.id.clone(), record) {
            Some(previous) => {
                let changed = self.records.get(&previous.id) != Some(&previous);
                self.shift_unread(previous.is_unread(), unread);
                changed
            }
            None => {
                self.total = self.total.saturating_add(1);
                self.cursor = self.cursor.saturating_add(1);
                self.shift_unread(false, unread);
                true
            }
        }
    }

    /// Insert a record fetched by id for `patch`, then apply the patch.
    ///
    /// The record already exists on the server, so `total` and the cursor
    /// stay put and it is assumed to be part of the server's unread count.
    /// The count only moves for the transition the patch itself causes,
    /// judged as if the fields the patch sets were unset before it.
    pub fn insert_fetched(
        &mut self,
        mut record: NotificationRecord,
        patch: &NotificationPatch,
    ) -> bool {
        if self.records.contains_key(&record.id) {
            return self.patch(patch).unwrap_or(false);
        }
        let was_unread = (patch.read_at.is_some() || record.read_at.is_none())
            && (patch.archived_at.is_some() || record.archived_at.is_none());
        patch.apply_to(&mut record);
        self.shift_unread(was_unread, record.is_unread());
        self.records.insert(record.id.clone(), record);
        true
    }

    /// Merge a patch into a known record.
    ///
    /// Returns `None` if the id is unknown, else whether anything changed.
    pub fn patch(&mut self, patch: &NotificationPatch) -> Option<bool> {
        let record = self.records.get_mut(&patch.id)?;
        let was_unread = record.is_unread();
        let changed = patch.apply_to(record);
        let unread = record.is_unread();
        self.shift_unread(was_unread, unread);
        Some(changed)
    }

    /// Apply mark flags to a known record, stamping with `now`.
    pub fn mark(&mut self, id: &str, flags: MarkFlags, now: i64) -> Option<bool> {
        let record = self.records.get_mut(id)?;
        let was_unread = record.is_unread();
        let changed = flags.apply_to(record, now);
        let unread = record.is_unread();
        self.shift_unread(was_unread, unread);
        Some(changed)
    }

    /// Overwrite the unread count with a fresh server value.
    pub fn set_unread(&mut self, unread: u32) {
        self.unread = unread;
    }

    fn shift_unread(&mut self, before: bool, after: bool) {
        match (before, after) {
            (false, true) => self.unread = self.unread.saturating_add(1),
            (true, false) => self.unread = self.unread.saturating_sub(1),
            _ => {}
        }
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&NotificationRecord> {
        self.records.get(id)
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub const fn unread_count(&self) -> u32 {
        self.unread
    }

    #[must_use]
    pub const fn has_more(&self) -> bool {
        self.has_more
    }

    /// Offset of the next server page.
    #[must_use]
    pub const fn cursor(&self) -> u32 {
        self.cursor
    }

    /// Bumped by every [`Self::replace_page`].
    #[must_use]
    pub const fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Generation of the newest journaled change.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Records newest first, ties broken by id.
    #[must_use]
    pub fn ordered(&self) -> Vec<NotificationRecord> {
        let mut records: Vec<_> = self.records.values().cloned().collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        records
    }

    /// Everything held, as one page starting at offset zero.
    #[must_use]
    pub fn view(&self) -> NotificationListView {
        NotificationListView {
            notifications: self.ordered(),
            total: self.total,
            limit: self.limit,
            offset: 0,
            has_more: self.has_more,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, created_at: i64) -> NotificationRecord {
        NotificationRecord {
            id: id.into(),
            kind: "task_update".into(),
            title: format!("Task {id}"),
            body: String::new(),
            created_at,
            read_at: None,
            archived_at: None,
            metadata: None,
        }
    }

    fn page(records: Vec<NotificationRecord>, total: u32) -> NotificationsListResponse {
        NotificationsListResponse {
            notifications: records,
            total,
            limit: 2,
            offset: 0,
            has_more: None,
        }
    }

    fn read_patch(id: &str, at: i64) -> NotificationPatch {
        NotificationPatch {
            id: id.into(),
            read_at: Some(at),
            archived_at: None,
        }
    }

    #[test]
    fn test_replace_page_sets_aggregates() {
        let mut store = NotificationStore::new();
        store.replace_page(page(vec![record("a", 1), record("b", 2)], 5), 4, 0);

        assert_eq!(store.len(), 2);
        assert_eq!(store.unread_count(), 4);
        assert_eq!(store.cursor(), 2);
        assert!(store.has_more());
        let ids: Vec<_> = store.ordered().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn test_merge_page_overwrites_held_record() {
        let mut store = NotificationStore::new();
        store.replace_page(page(vec![record("a", 3)], 3), 3, 0);
        store.insert_fetched(record("c", 1), &read_patch("c", 9));
        assert_eq!(store.unread_count(), 2);

        // The page copy predates the read.
        let epoch = store.epoch();
        assert!(store.merge_page(page(vec![record("b", 2), record("c", 1)], 3), epoch, 0));

        assert!(store.get("c").is_some_and(NotificationRecord::is_unread));
        assert_eq!(store.unread_count(), 3);
    }

    #[test]
    fn test_upsert_is_idempotent() {
        let mut store = NotificationStore::new();
        assert!(store.upsert(record("a", 1)));
        assert!(!store.upsert(record("a", 1)));

        assert_eq!(store.len(), 1);
        assert_eq!(store.unread_count(), 1);
        assert_eq!(store.cursor(), 1);
        assert_eq!(store.view().total, 1);
    }

    #[test]
    fn test_patch_moves_unread_once() {
        let mut store = NotificationStore::new();
        store.replace_page(page(vec![record("a", 1)], 1), 1, 0);

        let patch = read_patch("a", 10);
        assert_eq!(store.patch(&patch), Some(true));
        assert_eq!(store.patch(&patch), Some(false));
        assert_eq!(store.unread_count(), 0);
        assert_eq!(store.get("a").and_then(|r| r.read_at), Some(10));
    }

    #[test]
    fn test_patch_unknown_id() {
        let mut store = NotificationStore::new();
        assert_eq!(store.patch(&read_patch("ghost", 1)), None);
        assert!(store.is_empty());
    }

    #[test]
    fn test_fetched_record_leaves_cursor_and_total() {
        let mut store = NotificationStore::new();
        store.replace_page(page(vec![record("a", 5), record("b", 4)], 5), 3, 0);

        assert!(store.insert_fetched(record("e", 1), &read_patch("e", 9)));

        assert_eq!(store.cursor(), 2);
        assert_eq!(store.view().total, 5);
        assert_eq!(store.unread_count(), 2);
    }

    #[test]
    fn test_fetched_record_already_read_by_server() {
        let mut store = NotificationStore::new();
        store.replace_page(page(vec![record("a", 5)], 3), 3, 0);

        let mut fetched = record("c", 1);
        fetched.read_at = Some(9);
        store.insert_fetched(fetched, &read_patch("c", 9));
        assert_eq!(store.unread_count(), 2);

        // A patch that sets nothing new leaves an already-read record alone.
        let mut read = record("d", 1);
        read.read_at = Some(3);
        store.insert_fetched(
            read,
            &NotificationPatch {
                id: "d".into(),
                read_at: None,
                archived_at: None,
            },
        );
        assert_eq!(store.unread_count(), 2);
    }

    #[test]
    fn test_unread_count_never_underflows() {
        let mut store = NotificationStore::new();
        store.replace_page(page(vec![record("a", 1)], 1), 0, 0);
        assert_eq!(store.mark("a", MarkFlags::archived(), 5), Some(true));
        assert_eq!(store.unread_count(), 0);
    }

    #[test]
    fn test_merge_page_advances_cursor() {
        let mut store = NotificationStore::new();
        store.replace_page(page(vec![record("a", 3), record("b", 2)], 3), 3, 0);
        let epoch = store.epoch();
        assert!(store.merge_page(
            NotificationsListResponse {
                notifications: vec![record("c", 1)],
                total: 3,
                limit: 2,
                offset: 2,
                has_more: None,
            },
            epoch,
            store.generation(),
        ));

        assert_eq!(store.len(), 3);
        assert_eq!(store.cursor(), 3);
        assert_eq!(store.unread_count(), 3);
        assert!(!store.has_more());
    }

    #[test]
    fn test_merge_page_discarded_after_replace() {
        let mut store = NotificationStore::new();
        store.replace_page(page(vec![record("a", 3)], 3), 3, 0);
        let epoch = store.epoch();
        store.replace_page(page(vec![record("a", 3)], 3), 3, 0);

        assert!(!store.merge_page(page(vec![record("z", 0)], 3), epoch, 0));
        assert!(!store.contains("z"));
    }

    #[test]
    fn test_replace_replays_newer_changes() {
        let mut store = NotificationStore::new();
        let since = store.generation();
        let change = LocalChange::Marked {
            id: "a".into(),
            flags: MarkFlags::read(),
            at: 42,
        };
        // Applied while the page was in flight; the record is not held yet.
        assert!(!store.apply(&change));
        store.remember(change);

        store.replace_page(page(vec![record("a", 1)], 1), 1, since);

        assert_eq!(store.get("a").and_then(|r| r.read_at), Some(42));
        assert_eq!(store.unread_count(), 0);

        // Changes at or before `since` are not replayed.
        store.replace_page(page(vec![record("a", 1)], 1), 1, store.generation());
        assert_eq!(store.get("a").and_then(|r| r.read_at), None);
    }
}

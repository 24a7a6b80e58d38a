use parking_lot::Mutex;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;
use thiserror::Error;

use super::persist::BincodeClipFile;
use crate::models::{ClipItem, ItemId};
use crate::relay::{Listeners, Subscription};

/// Errors raised by clip stores
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to encode clip list: {0}")]
    Encode(String),

    #[error("clip file {path:?} has unsupported format version {version}")]
    UnsupportedVersion { path: PathBuf, version: u32 },
}

/// Callback for live queries; receives the owner's full list, newest first
pub type QueryCallback = Box<dyn Fn(&[ClipItem]) + Send + Sync>;

/// Handle that closes a live query
pub type QuerySubscription = Subscription<StoreChange>;

/// Ordered, owner-scoped list of clips
///
/// This is the surface the sync consumer needs from a document store: append,
/// remove and a live query. Creation times are assigned by the store.
pub trait ClipStore: Send + Sync {
    /// Append a new item for `owner_id`. The store does not deduplicate
    fn append(&self, text: &str, owner_id: &str) -> Result<ClipItem, StoreError>;

    /// Remove an item. Returns false if no such item exists
    fn remove(&self, item_id: &ItemId) -> Result<bool, StoreError>;

    /// Items of `owner_id`, newest first
    fn items(&self, owner_id: &str) -> Result<Vec<ClipItem>, StoreError>;

    /// Look up a single item by id
    fn get(&self, item_id: &ItemId) -> Result<Option<ClipItem>, StoreError>;

    /// Call `callback` with the owner's current list now and after every later change to it
    fn live_query(&self, owner_id: &str, callback: QueryCallback) -> Result<QuerySubscription, StoreError>;

    /// Pick up changes made by other writers and push them to live queries
    fn refresh(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Notification sent to live queries after a mutation
pub struct StoreChange {
    revision: u64,
    /// Owner whose items changed; None when the whole list was reloaded
    owner_id: Option<String>,
    items: Arc<Vec<ClipItem>>,
}

impl StoreChange {
    fn affects(&self, owner_id: &str) -> bool {
        self.owner_id.as_deref().is_none_or(|owner| owner == owner_id)
    }
}

struct State {
    /// Newest first
    items: Vec<ClipItem>,
    revision: u64,
    /// Modification time of the backing file as of the last load or save
    file_mtime: Option<SystemTime>,
}

/// Clip store kept in memory, optionally persisted to a bincode file
///
/// With a backing file, every mutation is written through, and the file is
/// re-read when another process has modified it since this store last saw it.
pub struct LocalStore {
    state: Mutex<State>,
    file: Option<BincodeClipFile>,
    queries: Arc<Listeners<StoreChange>>,
}

impl LocalStore {
    /// Store with no persistence
    pub fn in_memory() -> Self {
        LocalStore {
            state: Mutex::new(State {
                items: Vec::new(),
                revision: 1,
                file_mtime: None,
            }),
            file: None,
            queries: Arc::new(Listeners::new()),
        }
    }

    /// Store persisted at `path`, loading whatever is already there
    pub fn open(path: PathBuf) -> Result<Self, StoreError> {
        let file = BincodeClipFile::new(path);
        let items = file.load()?;
        let file_mtime = file.modified();

        Ok(LocalStore {
            state: Mutex::new(State {
                items,
                revision: 1,
                file_mtime,
            }),
            file: Some(file),
            queries: Arc::new(Listeners::new()),
        })
    }

    /// Number of items across all owners
    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }

    /// Number of open live queries
    pub fn query_count(&self) -> usize {
        self.queries.len()
    }

    /// Reload from disk if the file changed underneath us
    /// Returns true when the in-memory list was replaced
    fn reload_if_changed(&self, state: &mut State) -> Result<bool, StoreError> {
        let Some(file) = &self.file else {
            return Ok(false);
        };

        let mtime = file.modified();
        if mtime == state.file_mtime {
            return Ok(false);
        }

        log::debug!("Clip file {:?} changed on disk, reloading", file.path());
        state.items = file.load()?;
        state.file_mtime = file.modified();
        state.revision += 1;
        Ok(true)
    }

    fn persist(&self, state: &mut State) -> Result<(), StoreError> {
        if let Some(file) = &self.file {
            file.save(&state.items)?;
            state.file_mtime = file.modified();
        }
        Ok(())
    }

    fn change(state: &State, owner_id: Option<&str>) -> StoreChange {
        StoreChange {
            revision: state.revision,
            owner_id: owner_id.map(str::to_string),
            items: Arc::new(state.items.clone()),
        }
    }

    /// Run `mutate` under the lock, persist, then notify live queries outside the lock
    /// `mutate` returns the affected owner, or None when nothing changed
    /// A failed save restores the previous list
    fn mutate(
        &self,
        mutate: impl FnOnce(&mut Vec<ClipItem>) -> Option<String>,
    ) -> Result<bool, StoreError> {
        let mut changes = Vec::new();
        let changed = {
            let mut state = self.state.lock();
            if self.reload_if_changed(&mut state)? {
                changes.push(Self::change(&state, None));
            }

            let previous = state.items.clone();
            match mutate(&mut state.items) {
                Some(owner_id) => {
                    if let Err(e) = self.persist(&mut state) {
                        state.items = previous;
                        drop(state);
                        self.notify(&changes);
                        return Err(e);
                    }
                    state.revision += 1;
                    changes.push(Self::change(&state, Some(&owner_id)));
                    true
                }
                None => false,
            }
        };

        self.notify(&changes);
        Ok(changed)
    }

    /// Run a read under the lock after picking up any on-disk changes
    fn read<T>(&self, read: impl FnOnce(&[ClipItem]) -> T) -> Result<T, StoreError> {
        let (value, reloaded) = {
            let mut state = self.state.lock();
            let reloaded = if self.reload_if_changed(&mut state)? {
                Some(Self::change(&state, None))
            } else {
                None
            };
            (read(state.items.as_slice()), reloaded)
        };

        if let Some(change) = reloaded {
            self.notify(&[change]);
        }
        Ok(value)
    }

    fn notify(&self, changes: &[StoreChange]) {
        for change in changes {
            self.queries.dispatch(change);
        }
    }
}

impl ClipStore for LocalStore {
    fn append(&self, text: &str, owner_id: &str) -> Result<ClipItem, StoreError> {
        let item = ClipItem::new(text, owner_id);
        self.mutate(|items| {
            items.insert(0, item.clone());
            Some(item.owner_id.clone())
        })?;

        log::debug!("Appended clip {} for owner '{}'", item.id, owner_id);
        Ok(item)
    }

    fn remove(&self, item_id: &ItemId) -> Result<bool, StoreError> {
        let removed = self.mutate(|items| {
            let pos = items.iter().position(|item| &item.id == item_id)?;
            let item = items.remove(pos);
            Some(item.owner_id)
        })?;

        if removed {
            log::debug!("Removed clip {}", item_id);
        }
        Ok(removed)
    }

    fn items(&self, owner_id: &str) -> Result<Vec<ClipItem>, StoreError> {
        self.read(|items| {
            items
                .iter()
                .filter(|item| item.is_owned_by(owner_id))
                .cloned()
                .collect()
        })
    }

    fn get(&self, item_id: &ItemId) -> Result<Option<ClipItem>, StoreError> {
        self.read(|items| items.iter().find(|item| &item.id == item_id).cloned())
    }

    fn live_query(&self, owner_id: &str, callback: QueryCallback) -> Result<QuerySubscription, StoreError> {
        let owner = owner_id.to_string();
        let callback: Arc<dyn Fn(&[ClipItem]) + Send + Sync> = Arc::from(callback);

        // Deliveries can race with the initial snapshot; only strictly newer revisions get through
        let last_revision = Arc::new(AtomicU64::new(0));
        let deliver = {
            let owner = owner.clone();
            move |revision: u64, items: &[ClipItem]| {
                if last_revision.fetch_max(revision, Ordering::AcqRel) >= revision {
                    return;
                }
                let owned: Vec<ClipItem> = items
                    .iter()
                    .filter(|item| item.is_owned_by(&owner))
                    .cloned()
                    .collect();
                callback(&owned);
            }
        };

        let (initial, id) = {
            let mut state = self.state.lock();
            self.reload_if_changed(&mut state)?;
            let initial = Self::change(&state, Some(&owner));
            let deliver = deliver.clone();
            let owner = owner.clone();
            let id = self.queries.add(move |change: &StoreChange| {
                if change.affects(&owner) {
                    deliver(change.revision, change.items.as_slice());
                }
            });
            (initial, id)
        };

        deliver(initial.revision, initial.items.as_slice());
        log::debug!("Opened live query {} for owner '{}'", id, owner);
        Ok(Subscription::new(&self.queries, id))
    }

    fn refresh(&self) -> Result<(), StoreError> {
        self.read(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn texts(items: &[ClipItem]) -> Vec<&str> {
        items.iter().map(|item| item.text.as_str()).collect()
    }

    fn collecting_query(store: &LocalStore, owner: &str) -> (Arc<Mutex<Vec<Vec<String>>>>, QuerySubscription) {
        let snapshots = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&snapshots);
        let subscription = store
            .live_query(
                owner,
                Box::new(move |items: &[ClipItem]| {
                    sink.lock()
                        .push(items.iter().map(|item| item.text.clone()).collect());
                }),
            )
            .unwrap();
        (snapshots, subscription)
    }

    #[test]
    fn test_items_are_newest_first_and_owner_scoped() {
        let store = LocalStore::in_memory();
        store.append("first", "alice").unwrap();
        store.append("other", "bob").unwrap();
        store.append("second", "alice").unwrap();

        assert_eq!(texts(&store.items("alice").unwrap()), vec!["second", "first"]);
        assert_eq!(texts(&store.items("bob").unwrap()), vec!["other"]);
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_append_does_not_deduplicate() {
        let store = LocalStore::in_memory();
        let a = store.append("same", "me").unwrap();
        let b = store.append("same", "me").unwrap();

        assert_ne!(a.id, b.id);
        assert_eq!(store.items("me").unwrap().len(), 2);
    }

    #[test]
    fn test_remove_and_get() {
        let store = LocalStore::in_memory();
        let item = store.append("gone soon", "me").unwrap();

        assert_eq!(store.get(&item.id).unwrap(), Some(item.clone()));
        assert!(store.remove(&item.id).unwrap());
        assert!(!store.remove(&item.id).unwrap());
        assert_eq!(store.get(&item.id).unwrap(), None);
        assert!(store.is_empty());
    }

    #[test]
    fn test_live_query_delivers_initial_and_updates() {
        let store = LocalStore::in_memory();
        store.append("existing", "me").unwrap();

        let (snapshots, subscription) = collecting_query(&store, "me");
        let added = store.append("new", "me").unwrap();
        store.remove(&added.id).unwrap();

        assert_eq!(
            *snapshots.lock(),
            vec![
                vec!["existing".to_string()],
                vec!["new".to_string(), "existing".to_string()],
                vec!["existing".to_string()],
            ]
        );

        subscription.unsubscribe();
        store.append("unseen", "me").unwrap();
        assert_eq!(snapshots.lock().len(), 3);
        assert_eq!(store.query_count(), 0);
    }

    #[test]
    fn test_live_query_ignores_other_owners() {
        let store = LocalStore::in_memory();
        let (snapshots, _subscription) = collecting_query(&store, "alice");

        store.append("bob's", "bob").unwrap();
        store.append("alice's", "alice").unwrap();

        assert_eq!(
            *snapshots.lock(),
            vec![Vec::<String>::new(), vec!["alice's".to_string()]]
        );
    }

    #[test]
    fn test_persisted_store_reopens() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("clips.bin");

        {
            let store = LocalStore::open(path.clone()).unwrap();
            store.append("kept", "me").unwrap();
            store.append("also kept", "me").unwrap();
        }

        let reopened = LocalStore::open(path).unwrap();
        assert_eq!(texts(&reopened.items("me").unwrap()), vec!["also kept", "kept"]);
    }

    #[test]
    fn test_refresh_pushes_foreign_delete_to_live_query() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("clips.bin");

        let watcher_side = LocalStore::open(path.clone()).unwrap();
        let item = watcher_side.append("deleted elsewhere", "me").unwrap();
        let (snapshots, _subscription) = collecting_query(&watcher_side, "me");

        std::thread::sleep(std::time::Duration::from_millis(20));
        LocalStore::open(path).unwrap().remove(&item.id).unwrap();

        // Nothing reaches the query until the store looks at the file again
        assert_eq!(snapshots.lock().len(), 1);
        watcher_side.refresh().unwrap();
        assert_eq!(snapshots.lock().last().unwrap(), &Vec::<String>::new());

        // A second refresh with no new writes delivers nothing
        watcher_side.refresh().unwrap();
        assert_eq!(snapshots.lock().len(), 2);
    }

    #[test]
    fn test_store_sees_changes_from_another_handle() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("clips.bin");

        let watcher_side = LocalStore::open(path.clone()).unwrap();
        let item = watcher_side.append("to delete", "me").unwrap();
        let (snapshots, _subscription) = collecting_query(&watcher_side, "me");

        // Make sure the second write lands on a different mtime
        std::thread::sleep(std::time::Duration::from_millis(20));
        let cli_side = LocalStore::open(path).unwrap();
        assert!(cli_side.remove(&item.id).unwrap());

        assert!(watcher_side.items("me").unwrap().is_empty());
        watcher_side.append("after", "me").unwrap();

        assert_eq!(snapshots.lock().last().unwrap(), &vec!["after".to_string()]);
        assert_eq!(texts(&cli_side.items("me").unwrap()), vec!["after"]);
    }
}

//! Mirrors relayed clipboard text into a clip store
//!
//! The consumer keeps a live projection of the owner's list and skips any text
//! that is already in it. This dedup is best-effort: two devices copying the
//! same text at nearly the same time can both append it.

use parking_lot::RwLock;
use std::sync::Arc;

use crate::models::ClipItem;
use crate::relay::{Bridge, ChangeEvent, Subscription};
use crate::storage::{ClipStore, QuerySubscription, StoreError};

/// What happened to one relayed text
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    Appended,
    Duplicate,
    Failed,
}

/// Bridge subscriber that appends new clipboard text to a store
pub struct SyncConsumer {
    owner_id: String,
    projection: Arc<RwLock<Vec<ClipItem>>>,
    subscription: Subscription<ChangeEvent>,
    query: QuerySubscription,
}

impl SyncConsumer {
    /// Open a live query for `owner_id` and start consuming events from `bridge`
    pub fn attach(
        bridge: &Bridge,
        store: Arc<dyn ClipStore>,
        owner_id: impl Into<String>,
    ) -> Result<Self, StoreError> {
        let owner_id = owner_id.into();
        let projection = Arc::new(RwLock::new(Vec::new()));

        let query = {
            let projection = Arc::clone(&projection);
            store.live_query(
                &owner_id,
                Box::new(move |items: &[ClipItem]| *projection.write() = items.to_vec()),
            )?
        };

        let subscription = {
            let projection = Arc::clone(&projection);
            let owner_id = owner_id.clone();
            bridge.subscribe(move |event| {
                record(store.as_ref(), &projection, &owner_id, event.text());
            })
        };

        log::info!(
            "Syncing clipboard changes for owner '{}' ({} existing clips)",
            owner_id,
            projection.read().len()
        );

        Ok(SyncConsumer {
            owner_id,
            projection,
            subscription,
            query,
        })
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    /// Current projection of the owner's list, newest first
    pub fn items(&self) -> Vec<ClipItem> {
        self.projection.read().clone()
    }

    /// Stop consuming events and close the live query
    pub fn detach(self) {
        self.subscription.unsubscribe();
        self.query.unsubscribe();
        log::info!("Stopped syncing clipboard changes for owner '{}'", self.owner_id);
    }
}

/// Append `text` unless the projection already holds it
/// Store failures end here; they never reach the relay
pub fn record(
    store: &dyn ClipStore,
    projection: &RwLock<Vec<ClipItem>>,
    owner_id: &str,
    text: &str,
) -> RecordOutcome {
    // Deletes from other processes must reach the projection before the duplicate check
    if let Err(e) = store.refresh() {
        log::warn!("Could not refresh clip list, checking against last known items: {}", e);
    }

    let exists = projection.read().iter().any(|item| item.text == text);
    if exists {
        log::debug!("Clip already in list, skipping ({} bytes)", text.len());
        return RecordOutcome::Duplicate;
    }

    match store.append(text, owner_id) {
        Ok(item) => {
            log::info!("Stored clip {} ({})", item.id.short(), item.preview(40));
            RecordOutcome::Appended
        }
        Err(e) => {
            log::error!("Failed to store clip: {}", e);
            RecordOutcome::Failed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ItemId;
    use crate::relay::Relay;
    use crate::storage::{LocalStore, QueryCallback};

    fn texts(items: &[ClipItem]) -> Vec<&str> {
        items.iter().map(|item| item.text.as_str()).collect()
    }

    #[test]
    fn test_new_text_is_appended_and_projected() {
        let relay = Relay::new();
        let store = Arc::new(LocalStore::in_memory());
        let consumer = SyncConsumer::attach(&relay.bridge(), store.clone(), "me").unwrap();

        relay.publish(&ChangeEvent::new("hello"));
        relay.publish(&ChangeEvent::new("world"));

        assert_eq!(texts(&store.items("me").unwrap()), vec!["world", "hello"]);
        assert_eq!(texts(&consumer.items()), vec!["world", "hello"]);
    }

    #[test]
    fn test_text_already_listed_is_skipped() {
        let relay = Relay::new();
        let store = Arc::new(LocalStore::in_memory());
        store.append("old copy", "me").unwrap();
        let _consumer = SyncConsumer::attach(&relay.bridge(), store.clone(), "me").unwrap();

        relay.publish(&ChangeEvent::new("old copy"));
        relay.publish(&ChangeEvent::new("fresh"));
        relay.publish(&ChangeEvent::new("old copy"));

        assert_eq!(texts(&store.items("me").unwrap()), vec!["fresh", "old copy"]);
    }

    #[test]
    fn test_dedup_is_per_owner() {
        let relay = Relay::new();
        let store = Arc::new(LocalStore::in_memory());
        store.append("shared", "someone else").unwrap();
        let _consumer = SyncConsumer::attach(&relay.bridge(), store.clone(), "me").unwrap();

        relay.publish(&ChangeEvent::new("shared"));

        assert_eq!(texts(&store.items("me").unwrap()), vec!["shared"]);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_removed_text_can_be_recorded_again() {
        let relay = Relay::new();
        let store = Arc::new(LocalStore::in_memory());
        let consumer = SyncConsumer::attach(&relay.bridge(), store.clone(), "me").unwrap();

        relay.publish(&ChangeEvent::new("again"));
        let id = consumer.items()[0].id.clone();
        store.remove(&id).unwrap();
        assert!(consumer.items().is_empty());

        relay.publish(&ChangeEvent::new("again"));
        assert_eq!(texts(&consumer.items()), vec!["again"]);
    }

    #[test]
    fn test_text_deleted_by_another_handle_is_recorded_again() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("clips.bin");
        let relay = Relay::new();
        let watch_side = Arc::new(LocalStore::open(path.clone()).unwrap());
        let consumer = SyncConsumer::attach(&relay.bridge(), watch_side.clone(), "me").unwrap();

        relay.publish(&ChangeEvent::new("copied twice"));
        let id = consumer.items()[0].id.clone();

        // Later write must land on a different mtime
        std::thread::sleep(std::time::Duration::from_millis(20));
        let cli_side = LocalStore::open(path.clone()).unwrap();
        assert!(cli_side.remove(&id).unwrap());

        relay.publish(&ChangeEvent::new("copied twice"));

        assert_eq!(texts(&consumer.items()), vec!["copied twice"]);
        assert_ne!(consumer.items()[0].id, id);
        let reopened = LocalStore::open(path).unwrap();
        assert_eq!(texts(&reopened.items("me").unwrap()), vec!["copied twice"]);
    }

    #[test]
    fn test_detach_stops_recording() {
        let relay = Relay::new();
        let store = Arc::new(LocalStore::in_memory());
        let consumer = SyncConsumer::attach(&relay.bridge(), store.clone(), "me").unwrap();

        consumer.detach();
        relay.publish(&ChangeEvent::new("ignored"));

        assert!(store.is_empty());
        assert_eq!(relay.subscriber_count(), 0);
        assert_eq!(store.query_count(), 0);
    }

    struct FailingStore;

    impl ClipStore for FailingStore {
        fn append(&self, _text: &str, _owner_id: &str) -> Result<ClipItem, StoreError> {
            Err(StoreError::Encode("store offline".into()))
        }

        fn remove(&self, _item_id: &ItemId) -> Result<bool, StoreError> {
            Ok(false)
        }

        fn items(&self, _owner_id: &str) -> Result<Vec<ClipItem>, StoreError> {
            Ok(Vec::new())
        }

        fn get(&self, _item_id: &ItemId) -> Result<Option<ClipItem>, StoreError> {
            Ok(None)
        }

        fn live_query(&self, owner_id: &str, callback: QueryCallback) -> Result<QuerySubscription, StoreError> {
            LocalStore::in_memory().live_query(owner_id, callback)
        }
    }

    #[test]
    fn test_store_failure_stays_with_consumer() {
        let projection = RwLock::new(Vec::new());
        assert_eq!(
            record(&FailingStore, &projection, "me", "text"),
            RecordOutcome::Failed
        );

        let relay = Relay::new();
        let _consumer = SyncConsumer::attach(&relay.bridge(), Arc::new(FailingStore), "me").unwrap();
        let dispatch = relay.publish(&ChangeEvent::new("text"));
        assert_eq!(dispatch.failed, 0);
        assert_eq!(dispatch.delivered, 1);
    }
}

use std::sync::Arc;

use tracing::{debug, trace};

use crate::bus::ListenerId;
use crate::error::Result;
use crate::hn_client::{fetch_as, item_path, Gateway};
use crate::models::{Item, ItemId};
use crate::store::KeyValueStore;
use crate::task::join_detached;

const LOG_TARGET: &str = "hn_store::item_store";

/// Cache of items fetched one by one or in bulk.
///
/// Failures are not cached and not retried; the cache is left as it was.
/// Clones are handles to the same cache.
#[derive(Clone)]
pub struct ItemStore {
    gateway: Arc<dyn Gateway>,
    items: Arc<KeyValueStore<Item>>,
}

impl ItemStore {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        Self {
            gateway,
            items: Arc::new(KeyValueStore::new()),
        }
    }

    pub fn gateway(&self) -> &Arc<dyn Gateway> {
        &self.gateway
    }

    pub fn get_item(&self, id: ItemId) -> Option<Item> {
        self.items.get(&id)
    }

    pub fn set_item(&self, item: Item) {
        self.items.set(item);
    }

    pub fn get_items(&self, ids: &[ItemId]) -> Vec<Option<Item>> {
        self.items.get_many(ids)
    }

    pub fn get_all_items(&self) -> Vec<Item> {
        self.items.get_all()
    }

    pub fn contains(&self, id: ItemId) -> bool {
        self.items.contains(&id)
    }

    /// Cache first; on a miss fetches `item/{id}` and caches the result.
    pub async fn fetch_item(&self, id: ItemId) -> Result<Option<Item>> {
        if let Some(item) = self.items.get(&id) {
            trace!(target: LOG_TARGET, id, "Cache hit");
            return Ok(Some(item));
        }
        self.refresh_item(id).await
    }

    /// Fetches `item/{id}` regardless of the cache and replaces the entry.
    pub async fn refresh_item(&self, id: ItemId) -> Result<Option<Item>> {
        debug!(target: LOG_TARGET, id, "Fetching item");
        let item: Option<Item> = fetch_as(self.gateway.as_ref(), &item_path(id)).await?;
        if let Some(item) = &item {
            self.items.set(item.clone());
        }
        Ok(item)
    }

    /// Fetches every id concurrently; results follow the input order.
    ///
    /// The first failure fails the whole call. Each id is fetched on its own
    /// task, so siblings still in flight finish and are cached afterwards.
    pub async fn fetch_items(&self, ids: &[ItemId]) -> Result<Vec<Option<Item>>> {
        join_detached(ids.iter().map(|&id| {
            let store = self.clone();
            async move { store.fetch_item(id).await }
        }))
        .await
    }

    pub fn subscribe(&self, listener: impl Fn() + Send + Sync + 'static) -> ListenerId {
        self.items.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.items.unsubscribe(id)
    }

    pub fn emit_change(&self) {
        self.items.emit_change();
    }

    /// Drops every cached item and every subscriber.
    pub fn reset(&self) {
        self.items.reset();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::error::Error;
    use crate::testing::MockGateway;

    fn setup() -> (Arc<MockGateway>, ItemStore) {
        let gateway = Arc::new(MockGateway::new());
        let store = ItemStore::new(gateway.clone());
        (gateway, store)
    }

    #[test_log::test(tokio::test)]
    async fn never_fetched_is_absent_and_fetched_is_cached() {
        let (gateway, store) = setup();
        gateway.set_json("item/1", json!({ "id": 1, "title": "Test Item" }));

        assert_eq!(store.get_item(1), None);
        let fetched = store.fetch_item(1).await.unwrap().unwrap();

        assert_eq!(gateway.calls(), vec!["item/1"]);
        assert_eq!(store.get_item(1), Some(fetched));
    }

    #[test_log::test(tokio::test)]
    async fn cached_item_skips_the_network() {
        let (gateway, store) = setup();
        store.set_item(Item::new(1));

        store.fetch_item(1).await.unwrap();

        assert!(gateway.calls().is_empty());
    }

    #[test_log::test(tokio::test)]
    async fn failure_propagates_and_leaves_cache_alone() {
        let (gateway, store) = setup();
        gateway.fail("item/1", 503);

        let err = store.fetch_item(1).await.unwrap_err();

        assert!(matches!(err, Error::Status { status: 503, .. }));
        assert_eq!(store.get_item(1), None);

        // No negative caching: the next call goes back to the gateway
        let _ = store.fetch_item(1).await;
        assert_eq!(gateway.call_count("item/1"), 2);
    }

    #[test_log::test(tokio::test)]
    async fn null_payload_is_absent_not_an_error() {
        let (_gateway, store) = setup();
        assert_eq!(store.fetch_item(404).await.unwrap(), None);
        assert!(!store.contains(404));
    }

    #[test_log::test(tokio::test)]
    async fn fetch_items_matches_input_order() {
        let (gateway, store) = setup();
        gateway.set_json("item/1", json!({ "id": 1, "title": "Test Item 1" }));
        gateway.set_json("item/2", json!({ "id": 2, "title": "Test Item 2" }));

        let items = store.fetch_items(&[2, 1]).await.unwrap();

        let ids: Vec<_> = items.iter().map(|i| i.as_ref().unwrap().id).collect();
        assert_eq!(ids, vec![2, 1]);
        assert_eq!(gateway.call_count("item/1"), 1);
        assert_eq!(gateway.call_count("item/2"), 1);
        assert!(store.get_item(1).is_some() && store.get_item(2).is_some());
    }

    #[test_log::test(tokio::test)]
    async fn fetch_items_fails_fast_but_keeps_resolved_siblings() {
        let (gateway, store) = setup();
        gateway.set_json("item/1", json!({ "id": 1 }));
        gateway.fail("item/2", 500);

        let result = store.fetch_items(&[1, 2]).await;

        assert!(result.is_err());
        assert!(store.get_item(1).is_some());
        assert!(store.get_item(2).is_none());
    }

    #[test_log::test(tokio::test)]
    async fn fetch_items_failure_lets_slow_siblings_land() {
        let (gateway, store) = setup();
        gateway.set_json("item/1", json!({ "id": 1 }));
        gateway.delay("item/1", Duration::from_millis(50));
        gateway.fail("item/2", 500);

        let result = store.fetch_items(&[1, 2]).await;

        assert!(result.is_err());
        assert!(!store.contains(1));
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(store.contains(1));
    }

    #[test_log::test(tokio::test)]
    async fn refresh_replaces_the_entry() {
        let (gateway, store) = setup();
        gateway.set_json("item/1", json!({ "id": 1, "score": 1 }));
        store.fetch_item(1).await.unwrap();

        gateway.set_json("item/1", json!({ "id": 1, "title": "edited" }));
        store.refresh_item(1).await.unwrap();

        let item = store.get_item(1).unwrap();
        assert_eq!(item.score, None);
        assert_eq!(item.title.as_deref(), Some("edited"));
    }

    #[test_log::test(tokio::test)]
    async fn fetch_notifies_subscribers() {
        let (gateway, store) = setup();
        gateway.set_json("item/1", json!({ "id": 1 }));
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        store.subscribe(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });

        store.fetch_item(1).await.unwrap();
        store.fetch_item(1).await.unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn reset_clears_cache_and_listeners() {
        let (_gateway, store) = setup();
        store.set_item(Item::new(1));
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        store.subscribe(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });

        store.reset();

        assert_eq!(store.get_item(1), None);
        store.set_item(Item::new(2));
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(store.get_all_items(), vec![Item::new(2)]);
    }
}

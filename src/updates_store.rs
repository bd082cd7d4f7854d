use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tracing::debug;

use crate::bus::{ChangeBus, ListenerId};
use crate::error::Result;
use crate::hn_client::{fetch_as, item_path, user_path, Gateway, UPDATES_PATH};
use crate::models::{Item, ItemId, UpdatesPayload, UpdatesSnapshot, UserProfile};
use crate::task::join_detached;

const LOG_TARGET: &str = "hn_store::updates_store";

/// Holds the latest "recently changed" snapshot.
///
/// Lookups only see the current snapshot; nothing is merged across
/// refreshes and nothing goes into the shared item cache.
pub struct UpdatesStore {
    gateway: Arc<dyn Gateway>,
    snapshot: Mutex<Option<Arc<UpdatesSnapshot>>>,
    bus: ChangeBus,
}

impl UpdatesStore {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        Self {
            gateway,
            snapshot: Mutex::new(None),
            bus: ChangeBus::new(),
        }
    }

    fn snapshot(&self) -> MutexGuard<'_, Option<Arc<UpdatesSnapshot>>> {
        self.snapshot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fetches `updates`, resolves every item and profile it names, then
    /// replaces the current snapshot. On failure the previous snapshot stays.
    pub async fn fetch_updates(&self) -> Result<Arc<UpdatesSnapshot>> {
        debug!(target: LOG_TARGET, "Fetching updates");
        let payload: UpdatesPayload = fetch_as(self.gateway.as_ref(), UPDATES_PATH)
            .await?
            .unwrap_or_default();

        let item_fetches = payload.items.iter().map(|&id| {
            let gateway = self.gateway.clone();
            async move { fetch_as::<Item>(gateway.as_ref(), &item_path(id)).await }
        });
        let profile_fetches = payload.profiles.iter().map(|handle| {
            let gateway = self.gateway.clone();
            let path = user_path(handle);
            async move { fetch_as::<UserProfile>(gateway.as_ref(), &path).await }
        });
        let (items, profiles) = futures::try_join!(
            join_detached(item_fetches),
            join_detached(profile_fetches),
        )?;

        let snapshot = UpdatesSnapshot {
            item_ids: payload.items,
            profile_ids: payload.profiles,
            items: items.into_iter().flatten().collect(),
            profiles: profiles.into_iter().flatten().collect(),
            fetched_at: Some(Utc::now()),
        };
        debug!(
            target: LOG_TARGET,
            items = snapshot.items.len(),
            profiles = snapshot.profiles.len(),
            "Updates resolved"
        );

        Ok(self.set_updates(snapshot))
    }

    /// Replaces the snapshot wholesale and notifies.
    pub fn set_updates(&self, snapshot: UpdatesSnapshot) -> Arc<UpdatesSnapshot> {
        let snapshot = Arc::new(snapshot);
        *self.snapshot() = Some(snapshot.clone());
        self.bus.emit();
        snapshot
    }

    /// `None` before the first successful fetch.
    pub fn get_updates(&self) -> Option<Arc<UpdatesSnapshot>> {
        self.snapshot().clone()
    }

    pub fn get_item(&self, id: ItemId) -> Option<Item> {
        self.get_updates()?.item(id).cloned()
    }

    pub fn get_items(&self, ids: &[ItemId]) -> Vec<Option<Item>> {
        let snapshot = self.get_updates();
        ids.iter()
            .map(|&id| snapshot.as_ref().and_then(|s| s.item(id).cloned()))
            .collect()
    }

    pub fn get_profile(&self, handle: &str) -> Option<UserProfile> {
        self.get_updates()?.profile(handle).cloned()
    }

    pub fn subscribe(&self, listener: impl Fn() + Send + Sync + 'static) -> ListenerId {
        self.bus.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.bus.unsubscribe(id)
    }

    /// Forgets the snapshot and every subscriber.
    pub fn reset(&self) {
        *self.snapshot() = None;
        self.bus.clear();
    }
}

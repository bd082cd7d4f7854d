use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::bus::ListenerId;
use crate::config::DEFAULT_STORIES_PER_PAGE;
use crate::error::Result;
use crate::hn_client::{fetch_as, Gateway};
use crate::item_store::ItemStore;
use crate::models::{Item, ItemId, Listing};

const LOG_TARGET: &str = "hn_store::story_store";

/// Window of one page over a ranked listing.
///
/// Signed on purpose: out-of-range pages produce out-of-range indices rather
/// than being clamped. Arithmetic saturates at the `i64` bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageInfo {
    pub page_num: i64,
    pub start_index: i64,
    pub end_index: i64,
    pub has_next: bool,
    pub has_prev: bool,
}

pub fn page_calc(page_num: i64, per_page: i64, total: i64) -> PageInfo {
    let start_index = page_num.saturating_sub(1).saturating_mul(per_page);
    let end_index = page_num.saturating_mul(per_page).min(total);
    PageInfo {
        page_num,
        start_index,
        end_index,
        has_next: end_index < total,
        has_prev: page_num > 1,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoryPage {
    pub listing: Listing,
    pub page: PageInfo,
    /// Stories on the page in rank order; ids the API no longer serves are skipped.
    pub stories: Vec<Item>,
}

/// Item cache specialised for ranked story listings.
pub struct StoryStore {
    items: ItemStore,
    story_ids: Mutex<HashMap<Listing, Vec<ItemId>>>,
    stories_per_page: usize,
}

impl StoryStore {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        Self::with_page_size(gateway, DEFAULT_STORIES_PER_PAGE)
    }

    pub fn with_page_size(gateway: Arc<dyn Gateway>, stories_per_page: usize) -> Self {
        Self {
            items: ItemStore::new(gateway),
            story_ids: Mutex::new(HashMap::new()),
            stories_per_page: stories_per_page.max(1),
        }
    }

    fn story_ids(&self) -> MutexGuard<'_, HashMap<Listing, Vec<ItemId>>> {
        self.story_ids.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The underlying item cache (`get_item`, `set_item`, `fetch_item`, ...).
    pub fn items(&self) -> &ItemStore {
        &self.items
    }

    pub fn stories_per_page(&self) -> usize {
        self.stories_per_page
    }

    pub fn cached_story_ids(&self, listing: Listing) -> Option<Vec<ItemId>> {
        self.story_ids().get(&listing).cloned()
    }

    /// Ranked ids for `listing`, fetched once and then served from memory
    /// until [`invalidate_story_ids`](Self::invalidate_story_ids).
    pub async fn get_story_ids(&self, listing: Listing) -> Result<Vec<ItemId>> {
        if let Some(ids) = self.cached_story_ids(listing) {
            return Ok(ids);
        }

        debug!(target: LOG_TARGET, %listing, "Fetching story ids");
        let ids: Vec<ItemId> = fetch_as(self.items.gateway().as_ref(), listing.path())
            .await?
            .unwrap_or_default();

        self.story_ids().insert(listing, ids.clone());
        self.items.emit_change();
        Ok(ids)
    }

    pub async fn get_top_story_ids(&self) -> Result<Vec<ItemId>> {
        self.get_story_ids(Listing::Top).await
    }

    pub fn invalidate_story_ids(&self, listing: Listing) {
        self.story_ids().remove(&listing);
    }

    pub async fn get_story(&self, id: ItemId) -> Result<Option<Item>> {
        self.items.fetch_item(id).await
    }

    pub async fn get_stories(&self, ids: &[ItemId]) -> Result<Vec<Option<Item>>> {
        self.items.fetch_items(ids).await
    }

    /// Materializes page `page` (1-based) of `listing`.
    pub async fn get_page(&self, listing: Listing, page: usize) -> Result<StoryPage> {
        let ids = self.get_story_ids(listing).await?;
        let info = page_calc(
            i64::try_from(page.max(1)).unwrap_or(i64::MAX),
            self.stories_per_page as i64,
            ids.len() as i64,
        );

        let start = usize::try_from(info.start_index).unwrap_or(0).min(ids.len());
        let end = usize::try_from(info.end_index).unwrap_or(0).clamp(start, ids.len());
        debug!(target: LOG_TARGET, %listing, page, start, end, "Loading story page");

        let stories = self
            .get_stories(&ids[start..end])
            .await?
            .into_iter()
            .flatten()
            .collect();

        Ok(StoryPage {
            listing,
            page: info,
            stories,
        })
    }

    pub fn subscribe(&self, listener: impl Fn() + Send + Sync + 'static) -> ListenerId {
        self.items.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.items.unsubscribe(id)
    }

    /// Drops cached stories, listings and subscribers.
    pub fn reset(&self) {
        self.story_ids().clear();
        self.items.reset();
    }
}

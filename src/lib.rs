//! Client-side data layer for a Hacker News reader.
//!
//! Each store caches one kind of record fetched through a [`Gateway`] and
//! notifies subscribers when its contents change. [`Stores`] wires the
//! standard set together around one shared item cache.

pub mod bus;
pub mod comment_thread;
pub mod config;
pub mod db;
pub mod error;
pub mod hn_client;
pub mod item_store;
pub mod models;
pub mod settings;
pub mod store;
pub mod story_comment_thread_store;
pub mod story_store;
mod task;
pub mod updates_store;
pub mod user_store;

#[cfg(test)]
mod testing;

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, warn};

pub use bus::{ChangeBus, ListenerId};
pub use comment_thread::{CommentThreadStore, LoadState};
pub use config::Config;
pub use db::Database;
pub use error::{Error, Result};
pub use hn_client::{Gateway, HackerNewsClient};
pub use item_store::ItemStore;
pub use models::{CommentNode, Item, ItemId, ItemKind, Listing, UpdatesSnapshot, UserProfile};
pub use settings::{Settings, SettingsStore};
pub use store::KeyValueStore;
pub use story_comment_thread_store::StoryCommentThreadStore;
pub use story_store::{page_calc, PageInfo, StoryPage, StoryStore};
pub use updates_store::UpdatesStore;
pub use user_store::UserStore;

const LOG_TARGET: &str = "hn_store";

/// Runs `future` and hands its outcome to `callback`, for callers that
/// consume results through a completion hook rather than by awaiting.
pub async fn complete_with<T, F>(future: impl Future<Output = Result<T>>, callback: F)
where
    F: FnOnce(Result<T>),
{
    let result = future.await;
    if let Err(err) = &result {
        warn!(target: LOG_TARGET, %err, "Operation failed");
    }
    callback(result);
}

/// The application's set of stores.
///
/// Comment threads share `items`; the story listings keep their own item
/// cache so paging never evicts or replaces thread items.
pub struct Stores {
    pub items: ItemStore,
    pub stories: StoryStore,
    pub comment_threads: StoryCommentThreadStore,
    pub updates: UpdatesStore,
    pub users: UserStore,
}

impl Stores {
    pub fn new(gateway: Arc<dyn Gateway>, config: &Config) -> Self {
        let items = ItemStore::new(gateway.clone());
        Self {
            stories: StoryStore::with_page_size(gateway.clone(), config.stories_per_page),
            comment_threads: StoryCommentThreadStore::new(items.clone()),
            updates: UpdatesStore::new(gateway.clone()),
            users: UserStore::new(gateway),
            items,
        }
    }

    /// Builds the stores over a live [`HackerNewsClient`].
    pub fn connect(config: &Config) -> Result<Self> {
        debug!(target: LOG_TARGET, base_url = %config.api_base_url, "Connecting stores");
        let client = HackerNewsClient::with_config(config)?;
        Ok(Self::new(Arc::new(client), config))
    }

    /// A per-story thread view over the shared item cache.
    pub fn comment_thread(&self, root: &Item) -> CommentThreadStore {
        CommentThreadStore::new(self.items.clone(), root)
    }

    /// Empties every cache and drops every subscriber.
    pub fn reset_all(&self) {
        self.items.reset();
        self.stories.reset();
        self.comment_threads.reset();
        self.updates.reset();
        self.users.reset();
    }
}

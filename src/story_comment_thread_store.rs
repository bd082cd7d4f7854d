use std::sync::Arc;

use tracing::debug;

use crate::bus::ListenerId;
use crate::comment_thread::assemble_thread;
use crate::error::Result;
use crate::item_store::ItemStore;
use crate::models::{CommentNode, ItemId};
use crate::store::KeyValueStore;

const LOG_TARGET: &str = "hn_store::story_comment_thread_store";

/// Fully assembled comment threads, keyed by their root id.
pub struct StoryCommentThreadStore {
    items: ItemStore,
    threads: KeyValueStore<CommentNode>,
}

impl StoryCommentThreadStore {
    pub fn new(items: ItemStore) -> Self {
        Self {
            items,
            threads: KeyValueStore::new(),
        }
    }

    pub fn get_comment_thread(&self, id: ItemId) -> Option<CommentNode> {
        self.threads.get(&id)
    }

    pub fn set_comment_thread(&self, thread: CommentNode) {
        self.threads.set(thread);
    }

    pub fn get_comment_threads(&self, ids: &[ItemId]) -> Vec<Option<CommentNode>> {
        self.threads.get_many(ids)
    }

    pub fn get_all_comment_threads(&self) -> Vec<CommentNode> {
        self.threads.get_all()
    }

    /// Assembles the thread under `id` and stores it. On failure nothing is
    /// stored here, though items fetched on the way stay in the item cache.
    pub async fn fetch_comment_thread(&self, id: ItemId) -> Result<Option<CommentNode>> {
        debug!(target: LOG_TARGET, id, "Fetching comment thread");
        let thread = assemble_thread(self.items.clone(), id, Vec::new(), Arc::new(())).await?;
        if let Some(thread) = &thread {
            self.threads.set(thread.clone());
        }
        Ok(thread)
    }

    pub fn subscribe(&self, listener: impl Fn() + Send + Sync + 'static) -> ListenerId {
        self.threads.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.threads.unsubscribe(id)
    }

    /// Drops every stored thread and every subscriber. The shared item cache is untouched.
    pub fn reset(&self) {
        self.threads.reset();
    }
}

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::BoxFuture;
use futures::FutureExt as _;
use tracing::{debug, trace, warn};

use crate::bus::ListenerId;
use crate::error::{Error, Result};
use crate::item_store::ItemStore;
use crate::models::{CommentNode, Item, ItemId};
use crate::store::KeyValueStore;
use crate::task::join_detached;

const LOG_TARGET: &str = "hn_store::comment_thread";

/// Progress of one requested thread root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadState {
    /// Transient: a load was issued and the root fetch is about to start.
    /// Only visible to readers racing the loader.
    Requested,
    /// The root item is being fetched.
    Hydrating,
    /// Root fetched; `pending` children are still being expanded.
    Expanding { pending: usize },
    Hydrated,
    Failed(String),
}

impl LoadState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, LoadState::Hydrated | LoadState::Failed(_))
    }
}

/// Hooks called while a thread is being assembled.
pub trait ThreadObserver: Send + Sync {
    /// An item's own fields arrived; its children have not been loaded yet.
    fn hydrated(&self, _item: &Item) {}

    /// A node and its whole subtree are loaded.
    fn expanded(&self, _node: &CommentNode) {}
}

impl ThreadObserver for () {}

/// Recursively hydrates `id` and every descendant into one tree.
///
/// Children are loaded concurrently, each on its own task, and kept in `kids`
/// order; ids the API no longer serves are left out. The first failure
/// anywhere below fails the whole call. Siblings still in flight are not
/// cancelled: they run to completion, fill the item cache and report to
/// `observer`, but their results are discarded. `ancestors` is the path from
/// the outermost root; meeting one of them again fails with
/// [`Error::CycleDetected`].
pub fn assemble_thread(
    items: ItemStore,
    id: ItemId,
    ancestors: Vec<ItemId>,
    observer: Arc<dyn ThreadObserver>,
) -> BoxFuture<'static, Result<Option<CommentNode>>> {
    async move {
        if ancestors.contains(&id) {
            warn!(target: LOG_TARGET, id, "Comment thread loops back on itself");
            return Err(Error::CycleDetected(id));
        }

        let Some(item) = items.fetch_item(id).await? else {
            trace!(target: LOG_TARGET, id, "Skipping absent item");
            return Ok(None);
        };
        observer.hydrated(&item);

        let mut path = ancestors;
        path.push(id);
        let children = join_detached(
            item.kids
                .iter()
                .map(|&kid| assemble_thread(items.clone(), kid, path.clone(), observer.clone())),
        )
        .await?;

        let node = CommentNode::expanded(item, children.into_iter().flatten().collect());
        observer.expanded(&node);
        Ok(Some(node))
    }
    .boxed()
}

#[derive(Debug, Default)]
struct ThreadState {
    load_states: HashMap<ItemId, LoadState>,
    is_new: HashSet<ItemId>,
    is_collapsed: HashSet<ItemId>,
    // Deleted ids already taken off `expected_comments`
    deleted: HashSet<ItemId>,
    expected_comments: i64,
    comment_count: i64,
    // Highest comment id seen when the root finished its first load
    max_seen_id: Option<ItemId>,
}

/// Comment thread of one root item (usually a story) plus the UI state that
/// goes with it.
///
/// Every hydrated comment lands in a flat id to node side table, separate
/// from the trees handed back by the loaders. Collapse and "new since first
/// load" flags are tracked per id. The `comment_*` hooks let the caller
/// reflect what a live-update channel reports without refetching.
///
/// Clones share the side table and the flags.
#[derive(Clone)]
pub struct CommentThreadStore {
    items: ItemStore,
    root_id: ItemId,
    initial_expected: i64,
    comments: Arc<KeyValueStore<CommentNode>>,
    state: Arc<Mutex<ThreadState>>,
}

impl CommentThreadStore {
    pub fn new(items: ItemStore, root: &Item) -> Self {
        let initial_expected = root.descendants.unwrap_or(0);
        Self {
            items,
            root_id: root.id,
            initial_expected,
            comments: Arc::new(KeyValueStore::new()),
            state: Arc::new(Mutex::new(ThreadState {
                expected_comments: initial_expected,
                ..Default::default()
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, ThreadState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_load_state(&self, id: ItemId, load_state: LoadState) {
        trace!(target: LOG_TARGET, id, ?load_state, "Thread load state");
        self.state().load_states.insert(id, load_state);
    }

    pub fn root_id(&self) -> ItemId {
        self.root_id
    }

    pub fn load_state(&self, id: ItemId) -> Option<LoadState> {
        self.state().load_states.get(&id).cloned()
    }

    /// Loads `id` and all its descendants, registering every comment in the
    /// side table on the way. `Ok(None)` when the root itself is absent.
    pub async fn load_comment_thread(&self, id: ItemId) -> Result<Option<CommentNode>> {
        self.set_load_state(id, LoadState::Requested);
        debug!(target: LOG_TARGET, id, root = self.root_id, "Loading comment thread");

        self.set_load_state(id, LoadState::Hydrating);
        let observer: Arc<dyn ThreadObserver> = Arc::new(self.clone());
        let result = assemble_thread(self.items.clone(), id, Vec::new(), observer).await;

        match &result {
            Ok(tree) => {
                self.set_load_state(id, LoadState::Hydrated);
                if id == self.root_id && tree.is_some() {
                    self.remember_seen_ids();
                }
            }
            Err(err) => {
                debug!(target: LOG_TARGET, id, %err, "Comment thread failed to load");
                self.set_load_state(id, LoadState::Failed(err.to_string()));
            }
        }
        self.comments.emit_change();
        result
    }

    /// Same hydration as [`load_comment_thread`](Self::load_comment_thread),
    /// for a comment opened through a direct link.
    pub async fn load_permalinked_comment(&self, id: ItemId) -> Result<Option<CommentNode>> {
        self.load_comment_thread(id).await
    }

    fn remember_seen_ids(&self) {
        let max = self.comments.get_all().iter().map(|node| node.id).max();
        let mut state = self.state();
        if state.max_seen_id.is_none() {
            state.max_seen_id = Some(max.unwrap_or(self.root_id));
        }
    }

    pub fn add_comment(&self, node: CommentNode) {
        self.comments.set(node);
    }

    pub fn remove_comment(&self, id: ItemId) -> Option<CommentNode> {
        self.comments.remove(&id)
    }

    pub fn get_comment(&self, id: ItemId) -> Option<CommentNode> {
        self.comments.get(&id)
    }

    pub fn get_all_comments(&self) -> Vec<CommentNode> {
        self.comments.get_all()
    }

    /// Whether `id`'s subtree is already loaded.
    pub fn is_materialized(&self, id: ItemId) -> bool {
        self.comments.get(&id).is_some_and(|node| node.is_expanded())
    }

    pub fn is_new(&self, id: ItemId) -> bool {
        self.state().is_new.contains(&id)
    }

    pub fn is_collapsed(&self, id: ItemId) -> bool {
        self.state().is_collapsed.contains(&id)
    }

    pub fn new_comment_count(&self) -> usize {
        self.state().is_new.len()
    }

    pub fn expected_comments(&self) -> i64 {
        self.state().expected_comments
    }

    pub fn comment_count(&self) -> i64 {
        self.state().comment_count
    }

    pub fn is_loading_complete(&self) -> bool {
        let state = self.state();
        state.comment_count >= state.expected_comments
    }

    /// Flips the collapsed flag and returns the new value.
    pub fn toggle_collapse(&self, id: ItemId) -> bool {
        let collapsed = {
            let mut state = self.state();
            if state.is_collapsed.remove(&id) {
                false
            } else {
                state.is_collapsed.insert(id);
                true
            }
        };
        self.comments.emit_change();
        collapsed
    }

    pub fn adjust_expected_comments(&self, delta: i64) {
        {
            let mut state = self.state();
            state.expected_comments += delta;
            trace!(
                target: LOG_TARGET,
                delta,
                expected = state.expected_comments,
                "Expected comments adjusted"
            );
        }
        self.comments.emit_change();
    }

    /// A comment arrived (from a load or the live channel).
    pub fn comment_added(&self, item: &Item) {
        if item.deleted {
            // Deleted comments never render, so stop waiting for this one.
            // Reloads hydrate it again; count it once.
            if self.state().deleted.insert(item.id) {
                self.adjust_expected_comments(-1);
            }
            return;
        }

        let existing = self.comments.get(&item.id);
        if existing.is_none() {
            let mut state = self.state();
            state.comment_count += 1;
            if state.max_seen_id.is_some_and(|max| item.id > max) {
                state.is_new.insert(item.id);
            }
        }

        self.comments.set(CommentNode {
            id: item.id,
            item: Some(item.clone()),
            children: existing.and_then(|node| node.children),
        });
    }

    /// The channel announced a comment whose data is not available yet.
    pub fn comment_delayed(&self, id: ItemId) {
        debug!(target: LOG_TARGET, id, "Comment delayed");
        self.adjust_expected_comments(-1);
    }

    /// A comment was killed; it stays in the side table flagged dead.
    pub fn comment_died(&self, id: ItemId) {
        if let Some(mut node) = self.comments.get(&id) {
            if let Some(item) = node.item.as_mut() {
                if item.dead {
                    return;
                }
                item.dead = true;
            }
            self.state().comment_count -= 1;
            self.comments.set(node);
        }
        self.adjust_expected_comments(-1);
    }

    pub fn comment_deleted(&self, id: ItemId) {
        let removed = self.comments.remove(&id).is_some();
        let first_report = {
            let mut state = self.state();
            if removed {
                state.comment_count -= 1;
                state.is_new.remove(&id);
            }
            state.deleted.insert(id)
        };
        if first_report {
            self.adjust_expected_comments(-1);
        }
    }

    /// Everything currently loaded stops counting as new.
    pub fn mark_all_seen(&self) {
        let max = self.comments.get_all().iter().map(|node| node.id).max();
        {
            let mut state = self.state();
            state.is_new.clear();
            if let Some(max) = max {
                state.max_seen_id = Some(state.max_seen_id.map_or(max, |seen| seen.max(max)));
            }
        }
        self.comments.emit_change();
    }

    /// Collapses top-level comments whose subtree has nothing new and
    /// expands the ones that do.
    pub fn collapse_threads_without_new_comments(&self) {
        let Some(root) = self.items.get_item(self.root_id) else {
            return;
        };
        let subtrees: Vec<(ItemId, Vec<ItemId>)> = root
            .kids
            .iter()
            .map(|&kid| {
                let ids = self
                    .comments
                    .get(&kid)
                    .map(|node| node.ids())
                    .unwrap_or_else(|| vec![kid]);
                (kid, ids)
            })
            .collect();

        {
            let mut state = self.state();
            for (kid, ids) in subtrees {
                if ids.iter().any(|id| state.is_new.contains(id)) {
                    state.is_collapsed.remove(&kid);
                } else {
                    state.is_collapsed.insert(kid);
                }
            }
        }
        self.comments.emit_change();
    }

    pub fn subscribe(&self, listener: impl Fn() + Send + Sync + 'static) -> ListenerId {
        self.comments.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.comments.unsubscribe(id)
    }

    pub fn emit_change(&self) {
        self.comments.emit_change();
    }

    /// Drops every comment, all per-id flags and all subscribers.
    pub fn reset(&self) {
        self.comments.reset();
        *self.state() = ThreadState {
            expected_comments: self.initial_expected,
            ..Default::default()
        };
    }
}

impl ThreadObserver for CommentThreadStore {
    fn hydrated(&self, item: &Item) {
        {
            let mut state = self.state();
            if let Some(load_state) = state.load_states.get_mut(&item.id) {
                if *load_state == LoadState::Hydrating {
                    *load_state = LoadState::Expanding {
                        pending: item.kids.len(),
                    };
                }
            }
        }
        if item.id != self.root_id {
            self.comment_added(item);
        }
    }

    fn expanded(&self, node: &CommentNode) {
        if let Some(parent) = node.item.as_ref().and_then(|item| item.parent) {
            let mut state = self.state();
            if let Some(LoadState::Expanding { pending }) = state.load_states.get_mut(&parent) {
                *pending = pending.saturating_sub(1);
            }
        }
        let deleted = node.item.as_ref().is_some_and(|item| item.deleted);
        if node.id != self.root_id && !deleted {
            self.comments.set(node.clone());
        }
    }
}

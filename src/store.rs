use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::bus::{ChangeBus, ListenerId};
use crate::models::Keyed;

struct Entries<T: Keyed> {
    values: HashMap<T::Key, T>,
    // Insertion order; a replaced value keeps its original slot
    order: Vec<T::Key>,
}

impl<T: Keyed> Default for Entries<T> {
    fn default() -> Self {
        Self {
            values: HashMap::new(),
            order: Vec::new(),
        }
    }
}

/// In-memory key to value map with change notification.
///
/// Entries are never evicted. `set` fully replaces any prior value under the
/// same key and then notifies subscribers; the lock is released before any
/// listener runs, so listeners can read the store.
pub struct KeyValueStore<T: Keyed> {
    entries: Mutex<Entries<T>>,
    bus: ChangeBus,
}

impl<T: Keyed> Default for KeyValueStore<T> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(Entries::default()),
            bus: ChangeBus::new(),
        }
    }
}

impl<T: Keyed + Clone> KeyValueStore<T> {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, Entries<T>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, key: &T::Key) -> Option<T> {
        self.entries().values.get(key).cloned()
    }

    pub fn contains(&self, key: &T::Key) -> bool {
        self.entries().values.contains_key(key)
    }

    pub fn set(&self, value: T) {
        {
            let mut entries = self.entries();
            let key = value.key();
            if entries.values.insert(key.clone(), value).is_none() {
                entries.order.push(key);
            }
        }
        self.bus.emit();
    }

    /// Positional: one slot per requested key, `None` where absent.
    pub fn get_many(&self, keys: &[T::Key]) -> Vec<Option<T>> {
        let entries = self.entries();
        keys.iter().map(|key| entries.values.get(key).cloned()).collect()
    }

    pub fn get_all(&self) -> Vec<T> {
        let entries = self.entries();
        entries
            .order
            .iter()
            .filter_map(|key| entries.values.get(key).cloned())
            .collect()
    }

    /// Removes one entry and notifies when something was removed.
    pub fn remove(&self, key: &T::Key) -> Option<T> {
        let removed = {
            let mut entries = self.entries();
            let removed = entries.values.remove(key);
            if removed.is_some() {
                entries.order.retain(|k| k != key);
            }
            removed
        };
        if removed.is_some() {
            self.bus.emit();
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries().values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every entry and every subscriber.
    pub fn reset(&self) {
        *self.entries() = Entries::default();
        self.bus.clear();
    }

    pub fn subscribe(&self, listener: impl Fn() + Send + Sync + 'static) -> ListenerId {
        self.bus.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.bus.unsubscribe(id)
    }

    pub fn emit_change(&self) {
        self.bus.emit();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::models::Item;

    fn titled(id: u64, title: &str) -> Item {
        Item {
            title: Some(title.to_string()),
            ..Item::new(id)
        }
    }

    #[test]
    fn get_returns_what_was_set() {
        let store = KeyValueStore::new();
        store.set(titled(1, "Test Item"));
        assert_eq!(store.get(&1), Some(titled(1, "Test Item")));
        assert_eq!(store.get(&999), None);
    }

    #[test]
    fn set_replaces_without_merging() {
        let store = KeyValueStore::new();
        store.set(Item {
            score: Some(10),
            ..titled(1, "old")
        });
        store.set(titled(1, "new"));

        let item = store.get(&1).unwrap();
        assert_eq!(item.title.as_deref(), Some("new"));
        assert_eq!(item.score, None);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn get_many_is_positional() {
        let store = KeyValueStore::new();
        store.set(titled(1, "one"));
        assert_eq!(store.get_many(&[1, 2]), vec![Some(titled(1, "one")), None]);
        assert_eq!(store.get_many(&[3, 4]), vec![None, None]);
    }

    #[test]
    fn get_all_keeps_insertion_order() {
        let store = KeyValueStore::new();
        assert!(store.get_all().is_empty());
        store.set(titled(5, "five"));
        store.set(titled(2, "two"));
        store.set(titled(5, "five again"));
        let ids: Vec<_> = store.get_all().into_iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![5, 2]);
    }

    #[test]
    fn set_notifies_and_unsubscribe_stops_it() {
        let store = KeyValueStore::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let id = store.subscribe(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });

        store.set(titled(1, "Test Item"));
        assert_eq!(count.load(Ordering::SeqCst), 1);

        store.unsubscribe(id);
        store.set(titled(2, "Another Item"));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn listener_can_read_the_store() {
        let store = Arc::new(KeyValueStore::new());
        let seen = Arc::new(Mutex::new(None));
        {
            let store_ref = Arc::downgrade(&store);
            let seen = seen.clone();
            store.subscribe(move || {
                if let Some(store) = store_ref.upgrade() {
                    *seen.lock().unwrap() = store.get(&7);
                }
            });
        }

        store.set(titled(7, "seven"));

        assert_eq!(*seen.lock().unwrap(), Some(titled(7, "seven")));
    }

    #[test]
    fn reset_clears_entries_and_listeners() {
        let store = KeyValueStore::new();
        store.set(titled(1, "Test Item"));
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        store.subscribe(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });

        store.reset();

        assert_eq!(store.get(&1), None);
        store.set(titled(2, "Another Item"));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn remove_notifies_only_on_hit() {
        let store = KeyValueStore::new();
        store.set(titled(1, "one"));
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        store.subscribe(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });

        assert!(store.remove(&1).is_some());
        assert!(store.remove(&1).is_none());
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(store.is_empty());
    }
}

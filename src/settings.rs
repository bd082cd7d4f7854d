use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::bus::{ChangeBus, ListenerId};
use crate::db::Database;

const LOG_TARGET: &str = "hn_store::settings";

pub const SETTINGS_KEY: &str = "settings";

/// Reader preferences, persisted as one JSON object.
///
/// Fields missing from the stored object take their default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub auto_collapse: bool,
    pub reply_links: bool,
    pub show_dead: bool,
    pub show_deleted: bool,
    pub title_font_size: u32,
    pub list_spacing: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            auto_collapse: true,
            reply_links: true,
            show_dead: false,
            show_deleted: false,
            title_font_size: 18,
            list_spacing: 16,
        }
    }
}

/// Settings held in memory and saved to a [`Database`].
///
/// Storage problems never reach the caller: unreadable or malformed blobs
/// load as defaults and failed writes are logged.
pub struct SettingsStore {
    db: Database,
    settings: Mutex<Settings>,
    bus: ChangeBus,
}

impl SettingsStore {
    /// Creates the store and loads whatever is saved.
    pub fn open(db: Database) -> Self {
        let store = Self {
            db,
            settings: Mutex::new(Settings::default()),
            bus: ChangeBus::new(),
        };
        store.load();
        store
    }

    fn settings(&self) -> MutexGuard<'_, Settings> {
        self.settings.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self) -> Settings {
        self.settings().clone()
    }

    pub fn load(&self) -> Settings {
        let loaded = match self.db.get_json::<Settings>(SETTINGS_KEY) {
            Ok(Some(settings)) => settings,
            Ok(None) => Settings::default(),
            Err(err) => {
                warn!(target: LOG_TARGET, %err, "Could not read settings, using defaults");
                Settings::default()
            }
        };
        debug!(target: LOG_TARGET, ?loaded, "Settings loaded");
        *self.settings() = loaded.clone();
        loaded
    }

    pub fn save(&self) {
        let settings = self.get();
        if let Err(err) = self.db.set_json(SETTINGS_KEY, &settings) {
            warn!(target: LOG_TARGET, %err, "Could not save settings");
        }
        self.bus.emit();
    }

    /// Applies `change` and saves.
    pub fn update(&self, change: impl FnOnce(&mut Settings)) -> Settings {
        let updated = {
            let mut settings = self.settings();
            change(&mut settings);
            settings.clone()
        };
        self.save();
        updated
    }

    /// Back to defaults in memory; call [`save`](Self::save) to persist.
    pub fn reset(&self) {
        *self.settings() = Settings::default();
        self.bus.emit();
    }

    pub fn subscribe(&self, listener: impl Fn() + Send + Sync + 'static) -> ListenerId {
        self.bus.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.bus.unsubscribe(id)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use serde_json::{json, Value};

    use super::*;

    fn store() -> (Database, SettingsStore) {
        let db = Database::open_in_memory().unwrap();
        let store = SettingsStore::open(db.clone());
        (db, store)
    }

    #[test]
    fn empty_storage_gives_defaults() {
        let (_db, store) = store();
        assert_eq!(store.get(), Settings::default());
        assert!(store.get().auto_collapse && store.get().reply_links);
        assert_eq!(store.get().title_font_size, 18);
        assert_eq!(store.get().list_spacing, 16);
    }

    #[test]
    fn partial_blob_fills_in_defaults() {
        let (db, store) = store();
        db.set_json(SETTINGS_KEY, &json!({ "showDead": true })).unwrap();

        let loaded = store.load();

        assert_eq!(
            loaded,
            Settings {
                show_dead: true,
                ..Settings::default()
            }
        );
    }

    #[test]
    fn malformed_blob_gives_defaults() {
        let (db, store) = store();
        store.update(|s| s.show_deleted = true);
        db.set(SETTINGS_KEY, "{not json").unwrap();

        assert_eq!(store.load(), Settings::default());
        assert_eq!(store.get(), Settings::default());
    }

    #[test]
    fn save_writes_the_whole_object() {
        let (db, store) = store();
        store.update(|s| {
            s.show_dead = true;
            s.show_deleted = false;
        });

        let saved: Value = db.get_json(SETTINGS_KEY).unwrap().unwrap();
        assert_eq!(
            saved,
            json!({
                "autoCollapse": true,
                "replyLinks": true,
                "showDead": true,
                "showDeleted": false,
                "titleFontSize": 18,
                "listSpacing": 16
            })
        );

        let reloaded = SettingsStore::open(db);
        assert!(reloaded.get().show_dead);
    }

    #[test]
    fn save_and_reset_notify() {
        let (_db, store) = store();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        store.subscribe(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });

        store.update(|s| s.show_dead = true);
        store.reset();

        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(store.get(), Settings::default());
    }

    #[test]
    fn reset_does_not_persist() {
        let (db, store) = store();
        store.update(|s| s.list_spacing = 4);
        store.reset();

        assert_eq!(db.get_json::<Settings>(SETTINGS_KEY).unwrap().unwrap().list_spacing, 4);
    }
}

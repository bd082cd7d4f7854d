use std::sync::Arc;

use tracing::debug;

use crate::bus::ListenerId;
use crate::error::Result;
use crate::hn_client::{fetch_as, user_path, Gateway};
use crate::models::UserProfile;
use crate::store::KeyValueStore;

const LOG_TARGET: &str = "hn_store::user_store";

/// Profiles fetched from `user/{handle}`, kept apart from the item caches.
pub struct UserStore {
    gateway: Arc<dyn Gateway>,
    profiles: KeyValueStore<UserProfile>,
}

impl UserStore {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        Self {
            gateway,
            profiles: KeyValueStore::new(),
        }
    }

    pub fn get_user(&self, handle: &str) -> Option<UserProfile> {
        self.profiles.get(&handle.to_string())
    }

    pub fn set_user(&self, profile: UserProfile) {
        self.profiles.set(profile);
    }

    pub async fn fetch_user(&self, handle: &str) -> Result<Option<UserProfile>> {
        if let Some(profile) = self.get_user(handle) {
            return Ok(Some(profile));
        }
        self.refresh_user(handle).await
    }

    pub async fn refresh_user(&self, handle: &str) -> Result<Option<UserProfile>> {
        debug!(target: LOG_TARGET, handle, "Fetching user");
        let profile: Option<UserProfile> =
            fetch_as(self.gateway.as_ref(), &user_path(handle)).await?;
        if let Some(profile) = &profile {
            self.profiles.set(profile.clone());
        }
        Ok(profile)
    }

    pub fn subscribe(&self, listener: impl Fn() + Send + Sync + 'static) -> ListenerId {
        self.profiles.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.profiles.unsubscribe(id)
    }

    pub fn reset(&self) {
        self.profiles.reset();
    }
}

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::Semaphore;
use tracing::{debug, trace};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::models::ItemId;

const LOG_TARGET: &str = "hn_store::hn_client";

pub const UPDATES_PATH: &str = "updates";

pub fn item_path(id: ItemId) -> String {
    format!("item/{id}")
}

pub fn user_path(handle: &str) -> String {
    format!("user/{}", urlencoding::encode(handle))
}

/// Resolves an API path (`item/{id}`, `topstories`, `updates`, ...) to its
/// JSON body. Must fail on transport or status errors; a missing resource is
/// JSON `null`, not an error.
#[async_trait]
pub trait Gateway: Send + Sync {
    async fn fetch_json(&self, path: &str) -> Result<Value>;
}

/// Fetches `path` and decodes it, mapping JSON `null` to `None`.
pub async fn fetch_as<T: DeserializeOwned>(gateway: &dyn Gateway, path: &str) -> Result<Option<T>> {
    let value = gateway.fetch_json(path).await?;
    if value.is_null() {
        trace!(target: LOG_TARGET, path, "Resource is absent");
        return Ok(None);
    }
    serde_json::from_value(value).map(Some).map_err(|source| Error::Decode {
        path: path.to_string(),
        source,
    })
}

/// Gateway over the Hacker News Firebase REST API.
pub struct HackerNewsClient {
    client: Client,
    base_url: String,
    // Bounds concurrent requests; fan-out callers don't
    permits: Arc<Semaphore>,
}

impl HackerNewsClient {
    pub fn new() -> Result<Self> {
        Self::with_config(&Config::default())
    }

    pub fn with_config(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(Error::Client)?;

        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            permits: Arc::new(Semaphore::new(config.max_in_flight.max(1))),
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}.json", self.base_url, path.trim_start_matches('/'))
    }
}

#[async_trait]
impl Gateway for HackerNewsClient {
    async fn fetch_json(&self, path: &str) -> Result<Value> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| Error::Unavailable("request limiter closed".to_string()))?;

        let url = self.url(path);
        debug!(target: LOG_TARGET, %url, "Fetching");

        let transport = |source| Error::Transport {
            path: path.to_string(),
            source,
        };
        let response = self.client.get(&url).send().await.map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            debug!(target: LOG_TARGET, %url, status = status.as_u16(), "Request rejected");
            return Err(Error::Status {
                path: path.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(transport)?;
        serde_json::from_str(&body).map_err(|source| Error::Decode {
            path: path.to_string(),
            source,
        })
    }
}

use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

const LOG_TARGET: &str = "hn_store::config";

pub const DEFAULT_API_BASE_URL: &str = "https://hacker-news.firebaseio.com/v0";
pub const DEFAULT_STORIES_PER_PAGE: usize = 30;

/// Settings for the HTTP gateway and the stores built on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub api_base_url: String,
    pub request_timeout: Duration,
    pub user_agent: String,
    /// Upper bound on concurrent gateway requests.
    pub max_in_flight: usize,
    pub stories_per_page: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(60),
            user_agent: concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).to_string(),
            max_in_flight: 16,
            stories_per_page: DEFAULT_STORIES_PER_PAGE,
        }
    }
}

impl Config {
    /// Defaults overridden by `HN_API_BASE_URL`, `HN_REQUEST_TIMEOUT_SECS`,
    /// `HN_MAX_IN_FLIGHT` and `HN_STORIES_PER_PAGE`.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("HN_API_BASE_URL") {
            if !url.trim().is_empty() {
                config.api_base_url = url;
            }
        }
        if let Some(secs) = parse_env::<u64>("HN_REQUEST_TIMEOUT_SECS") {
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Some(n) = parse_env::<usize>("HN_MAX_IN_FLIGHT") {
            config = config.with_max_in_flight(n);
        }
        if let Some(n) = parse_env::<usize>("HN_STORIES_PER_PAGE") {
            config = config.with_stories_per_page(n);
        }

        config
    }

    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    // Zero would deadlock every request
    pub fn with_max_in_flight(mut self, n: usize) -> Self {
        self.max_in_flight = n.max(1);
        self
    }

    pub fn with_stories_per_page(mut self, n: usize) -> Self {
        self.stories_per_page = n.max(1);
        self
    }
}

fn parse_env<T: FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(
                target: LOG_TARGET,
                var = name,
                value = %raw,
                "Ignoring unparsable environment override"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_behavior() {
        let config = Config::default();
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(config.stories_per_page, 30);
        assert_eq!(config.request_timeout, Duration::from_secs(60));
        assert!(config.user_agent.starts_with("hacker_news_store/"));
    }

    #[test]
    fn builders_clamp_zero_limits() {
        let config = Config::default().with_max_in_flight(0).with_stories_per_page(0);
        assert_eq!(config.max_in_flight, 1);
        assert_eq!(config.stories_per_page, 1);
    }
}

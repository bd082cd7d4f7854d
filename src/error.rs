use thiserror::Error;

use crate::models::ItemId;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to create HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("request for `{path}` failed: {source}")]
    Transport {
        path: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("request for `{path}` returned status {status}")]
    Status { path: String, status: u16 },

    #[error("malformed payload for `{path}`: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    /// An item's descendants lead back to one of its ancestors.
    #[error("comment thread loops back to item {0}")]
    CycleDetected(ItemId),

    #[error("gateway unavailable: {0}")]
    Unavailable(String),

    #[error("fetch task did not finish: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl Error {
    /// The API path that failed, when the error came from a fetch.
    pub fn path(&self) -> Option<&str> {
        match self {
            Error::Transport { path, .. }
            | Error::Status { path, .. }
            | Error::Decode { path, .. } => Some(path.as_str()),
            _ => None,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::hn_client::Gateway;

enum Scripted {
    Json(Value),
    Fail(u16),
}

/// Gateway serving scripted responses. Unscripted paths resolve to `null`.
///
/// Paths given a [`delay`](Self::delay) answer only after sleeping, which
/// keeps them in flight while faster siblings complete.
#[derive(Default)]
pub(crate) struct MockGateway {
    responses: Mutex<HashMap<String, Scripted>>,
    delays: Mutex<HashMap<String, Duration>>,
    calls: Mutex<Vec<String>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_json(&self, path: &str, value: Value) {
        self.responses.lock().unwrap().insert(path.to_string(), Scripted::Json(value));
    }

    pub fn fail(&self, path: &str, status: u16) {
        self.responses.lock().unwrap().insert(path.to_string(), Scripted::Fail(status));
    }

    pub fn delay(&self, path: &str, delay: Duration) {
        self.delays.lock().unwrap().insert(path.to_string(), delay);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, path: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|p| *p == path).count()
    }
}

#[async_trait]
impl Gateway for MockGateway {
    async fn fetch_json(&self, path: &str) -> Result<Value> {
        self.calls.lock().unwrap().push(path.to_string());
        let delay = self.delays.lock().unwrap().get(path).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match self.responses.lock().unwrap().get(path) {
            Some(Scripted::Json(value)) => Ok(value.clone()),
            Some(Scripted::Fail(status)) => Err(Error::Status {
                path: path.to_string(),
                status: *status,
            }),
            None => Ok(Value::Null),
        }
    }
}

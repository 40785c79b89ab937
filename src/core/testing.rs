//! Scripted in-memory [`Api`] for unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use hashbrown::HashMap;
use serde_json::Value;
use tokio::sync::Semaphore;

use crate::api::{Api, ApiError, Method};

/// Responses are queued per `"METHOD /path"` route and served in order.
/// An unscripted route answers with a network error.
pub(crate) struct MockApi {
    responses: Mutex<HashMap<String, VecDeque<Result<Value, ApiError>>>>,
    calls: Mutex<Vec<(String, Option<Value>)>>,
    gate: Option<Semaphore>,
}

impl MockApi {
    pub(crate) fn new() -> Self {
        Self {
            responses: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            gate: None,
        }
    }

    /// Every request blocks after being recorded until [`MockApi::release`]
    /// hands out a permit.
    pub(crate) fn gated() -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Self::new()
        }
    }

    pub(crate) fn push(&self, route: &str, response: Result<Value, ApiError>) {
        self.responses
            .lock()
            .unwrap()
            .entry(route.to_string())
            .or_default()
            .push_back(response);
    }

    pub(crate) fn release(&self, n: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(n);
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub(crate) fn calls_to(&self, route: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(r, _)| r == route)
            .count()
    }

    pub(crate) fn last_body(&self, route: &str) -> Option<Value> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(r, _)| r == route)
            .and_then(|(_, b)| b.clone())
    }
}

#[async_trait]
impl Api for MockApi {
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, ApiError> {
        let route = format!("{} {}", method, path);
        self.calls.lock().unwrap().push((route.clone(), body));

        if let Some(gate) = &self.gate {
            gate.acquire()
                .await
                .map_err(|_| ApiError::Network("gate closed".into()))?
                .forget();
        }

        self.responses
            .lock()
            .unwrap()
            .get_mut(&route)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Err(ApiError::Network(format!("no scripted response for {route}"))))
    }
}

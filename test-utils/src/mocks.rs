//! Mock implementations for testing.
//!
//! This module provides mocks for the two seams of the client crate: the
//! key/value store and the profile source.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::Instant;
use toto_client::session::{ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, USER_KEY};
use toto_client::store::StoreResult;
use toto_client::{KeyValueStore, MemoryStore, ProfileSource, UserDto};
use toto_common::ApiResult;

/// One operation seen by a [`RecordingStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    /// `get(key)`
    Get(String),
    /// `set(key, value)`
    Set(String, String),
    /// `multi_set(pairs)`
    MultiSet(Vec<(String, String)>),
    /// `multi_remove(keys)`
    MultiRemove(Vec<String>),
}

impl StoreOp {
    /// Whether the operation writes to the store.
    #[must_use]
    pub const fn is_write(&self) -> bool {
        !matches!(self, Self::Get(_))
    }
}

/// In-memory store that records every operation.
#[derive(Debug, Default)]
pub struct RecordingStore {
    inner: MemoryStore,
    ops: Arc<RwLock<Vec<StoreOp>>>,
}

impl RecordingStore {
    /// Create an empty recording store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding a signed-in session.
    #[must_use]
    pub fn with_session(access_token: &str, refresh_token: &str) -> Self {
        Self {
            inner: MemoryStore::with_entries([
                (ACCESS_TOKEN_KEY, access_token),
                (REFRESH_TOKEN_KEY, refresh_token),
            ]),
            ops: Arc::default(),
        }
    }

    /// Create a store holding a signed-in session and the cached `user`.
    ///
    /// # Panics
    ///
    /// Panics if `user` cannot be serialized.
    #[must_use]
    pub fn with_session_and_user(access_token: &str, refresh_token: &str, user: &UserDto) -> Self {
        let user = match serde_json::to_string(user) {
            Ok(user) => user,
            Err(e) => panic!("user does not serialize: {e}"),
        };
        Self {
            inner: MemoryStore::with_entries([
                (ACCESS_TOKEN_KEY, access_token),
                (REFRESH_TOKEN_KEY, refresh_token),
                (USER_KEY, user.as_str()),
            ]),
            ops: Arc::default(),
        }
    }

    /// Get all recorded operations.
    pub async fn ops(&self) -> Vec<StoreOp> {
        self.ops.read().await.clone()
    }

    /// Get the recorded write operations.
    pub async fn writes(&self) -> Vec<StoreOp> {
        self.ops
            .read()
            .await
            .iter()
            .filter(|op| op.is_write())
            .cloned()
            .collect()
    }

    /// Read a value without recording it.
    pub async fn peek(&self, key: &str) -> Option<String> {
        self.inner.get(key).await.ok().flatten()
    }

    async fn record(&self, op: StoreOp) {
        self.ops.write().await.push(op);
    }
}

#[async_trait]
impl KeyValueStore for RecordingStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.record(StoreOp::Get(key.to_string())).await;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        self.record(StoreOp::Set(key.to_string(), value.to_string()))
            .await;
        self.inner.set(key, value).await
    }

    async fn multi_set(&self, pairs: Vec<(String, String)>) -> StoreResult<()> {
        self.record(StoreOp::MultiSet(pairs.clone())).await;
        self.inner.multi_set(pairs).await
    }

    async fn multi_remove(&self, keys: &[&str]) -> StoreResult<()> {
        self.record(StoreOp::MultiRemove(
            keys.iter().map(|k| (*k).to_string()).collect(),
        ))
        .await;
        self.inner.multi_remove(keys).await
    }
}

/// Profile source that replays a script of responses.
///
/// Once the script runs out, every call gets the fallback response.
#[derive(Debug)]
pub struct MockProfileSource {
    script: RwLock<VecDeque<ApiResult<Vec<UserDto>>>>,
    fallback: ApiResult<Vec<UserDto>>,
    calls: RwLock<Vec<Instant>>,
}

impl MockProfileSource {
    /// Create a source that answers with `script`, then with an empty list.
    #[must_use]
    pub fn new(script: Vec<ApiResult<Vec<UserDto>>>) -> Self {
        Self {
            script: RwLock::new(script.into()),
            fallback: Ok(Vec::new()),
            calls: RwLock::new(Vec::new()),
        }
    }

    /// Create a source that always answers with `response`.
    #[must_use]
    pub fn always(response: ApiResult<Vec<UserDto>>) -> Self {
        Self::new(Vec::new()).then_always(response)
    }

    /// Answer with `response` once the script is exhausted.
    #[must_use]
    pub fn then_always(mut self, response: ApiResult<Vec<UserDto>>) -> Self {
        self.fallback = response;
        self
    }

    /// Number of calls made so far.
    pub async fn call_count(&self) -> usize {
        self.calls.read().await.len()
    }

    /// Instants of the calls made so far, on the Tokio clock.
    pub async fn call_times(&self) -> Vec<Instant> {
        self.calls.read().await.clone()
    }
}

#[async_trait]
impl ProfileSource for MockProfileSource {
    async fn elderly_under_care(&self) -> ApiResult<Vec<UserDto>> {
        self.calls.write().await.push(Instant::now());
        let next = self.script.write().await.pop_front();
        next.unwrap_or_else(|| self.fallback.clone())
    }
}

//! Async key-value storage over opaque JSON values.
//!
//! A store also arbitrates named leases. Every process opening the same
//! store sees the same leases, so a lease taken by one host blocks the
//! others until it is released or expires.

use crate::error::Result;
use serde_json::Value;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Async get/set/remove over JSON values, plus named leases.
#[async_trait::async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Value stored under `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Store `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: &Value) -> Result<()>;

    /// Delete `key`. Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<()>;

    /// Take lease `name` for `holder` until `ttl` from now.
    ///
    /// Succeeds when the lease is free, expired, or already held by `holder`
    /// (which extends it). Returns `false` while another holder has it.
    async fn try_acquire_lease(&self, name: &str, holder: &str, ttl: Duration) -> Result<bool>;

    /// Give up lease `name` if `holder` still has it.
    async fn release_lease(&self, name: &str, holder: &str) -> Result<()>;
}

/// Process-local store, lost on exit.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<String, Value>>,
    leases: RwLock<HashMap<String, (String, Instant)>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.values.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &Value) -> Result<()> {
        self.values
            .write()
            .await
            .insert(key.to_string(), value.clone());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.values.write().await.remove(key);
        Ok(())
    }

    async fn try_acquire_lease(&self, name: &str, holder: &str, ttl: Duration) -> Result<bool> {
        let now = Instant::now();
        let mut leases = self.leases.write().await;
        if let Some((current, expires_at)) = leases.get(name) {
            if current != holder && *expires_at > now {
                return Ok(false);
            }
        }
        leases.insert(name.to_string(), (holder.to_string(), now + ttl));
        Ok(true)
    }

    async fn release_lease(&self, name: &str, holder: &str) -> Result<()> {
        let mut leases = self.leases.write().await;
        if leases.get(name).is_some_and(|(current, _)| current == holder) {
            leases.remove(name);
        }
        Ok(())
    }
}

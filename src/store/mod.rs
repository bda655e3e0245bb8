//! Expiring key/value storage for sessions and verification tokens.
//!
//! Every record is a string payload under an opaque key, and its TTL is its
//! expiry. Remaining TTLs are reported in whole seconds, rounded to nearest,
//! and a key whose TTL has run out is indistinguishable from a missing one.

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use tracing::info;

use crate::error::AdapterResult;

mod memory;
mod redis;

pub use self::memory::MemoryTokenStore;
pub use self::redis::RedisTokenStore;

#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Write `value` under `key`, replacing any previous record, expiring after `ttl_secs`.
    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> AdapterResult<()>;

    /// Rewrite an existing key and re-arm its TTL. Returns `false` if the key is absent.
    async fn refresh(&self, key: &str, value: &str, ttl_secs: u64) -> AdapterResult<bool>;

    /// Payload and remaining TTL in seconds, read together.
    async fn get_with_ttl(&self, key: &str) -> AdapterResult<Option<(String, i64)>>;

    async fn del(&self, key: &str) -> AdapterResult<()>;

    /// Atomically read and delete `key` if its payload equals `expected`.
    /// A mismatching payload leaves the key untouched and yields `None`.
    async fn take_if(&self, key: &str, expected: &str) -> AdapterResult<Option<(String, i64)>>;
}

/// Open the store named by `url`: `memory://` for the in-process backend,
/// anything else is handed to the Redis client.
pub async fn connect(url: &str) -> anyhow::Result<Arc<dyn TokenStore>> {
    if url.starts_with("memory://") {
        info!("using in-memory token store");
        return Ok(Arc::new(MemoryTokenStore::new()));
    }
    let store = RedisTokenStore::connect(url)
        .await
        .context("connect to token store")?;
    Ok(Arc::new(store))
}

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use super::TokenStore;
use crate::error::{AdapterError, AdapterResult};

struct Entry {
    value: String,
    deadline: Instant,
}

impl Entry {
    /// Whole seconds left, rounded to nearest like Redis `TTL`.
    fn remaining_secs(&self, now: Instant) -> i64 {
        let left = self.deadline.saturating_duration_since(now).as_millis();
        ((left + 500) / 1000) as i64
    }
}

/// Process-local token store. Expiry follows the tokio clock, so paused-time
/// tests can advance it.
#[derive(Default)]
pub struct MemoryTokenStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> AdapterResult<std::sync::MutexGuard<'_, HashMap<String, Entry>>> {
        self.entries
            .lock()
            .map_err(|_| AdapterError::Internal("token store lock poisoned".into()))
    }

    /// Live entry for `key`; evicts it first if its deadline has passed.
    fn live<'a>(map: &'a mut HashMap<String, Entry>, key: &str, now: Instant) -> Option<&'a Entry> {
        if map.get(key).is_some_and(|e| e.deadline <= now) {
            map.remove(key);
        }
        map.get(key)
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> AdapterResult<()> {
        let now = Instant::now();
        let deadline = now + Duration::from_secs(ttl_secs);
        let mut map = self.lock()?;
        // Keys nobody reads again would otherwise never leave the map.
        map.retain(|_, e| e.deadline > now);
        map.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                deadline,
            },
        );
        Ok(())
    }

    async fn refresh(&self, key: &str, value: &str, ttl_secs: u64) -> AdapterResult<bool> {
        let now = Instant::now();
        let mut map = self.lock()?;
        if Self::live(&mut map, key, now).is_none() {
            return Ok(false);
        }
        map.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                deadline: now + Duration::from_secs(ttl_secs),
            },
        );
        Ok(true)
    }

    async fn get_with_ttl(&self, key: &str) -> AdapterResult<Option<(String, i64)>> {
        let now = Instant::now();
        let mut map = self.lock()?;
        Ok(Self::live(&mut map, key, now).map(|e| (e.value.clone(), e.remaining_secs(now))))
    }

    async fn del(&self, key: &str) -> AdapterResult<()> {
        self.lock()?.remove(key);
        Ok(())
    }

    async fn take_if(&self, key: &str, expected: &str) -> AdapterResult<Option<(String, i64)>> {
        let now = Instant::now();
        let mut map = self.lock()?;
        let ttl = match Self::live(&mut map, key, now) {
            Some(e) if e.value == expected => e.remaining_secs(now),
            _ => return Ok(None),
        };
        Ok(map.remove(key).map(|e| (e.value, ttl)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn entries_vanish_at_deadline() {
        let store = MemoryTokenStore::new();
        store.set_ex("k", "v", 10).await.unwrap();
        let (value, ttl) = store.get_with_ttl("k").await.unwrap().unwrap();
        assert_eq!(value, "v");
        assert_eq!(ttl, 10);

        tokio::time::advance(Duration::from_secs(4)).await;
        assert_eq!(store.get_with_ttl("k").await.unwrap().unwrap().1, 6);

        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(store.get_with_ttl("k").await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_requires_live_key() {
        let store = MemoryTokenStore::new();
        assert!(!store.refresh("k", "v", 5).await.unwrap());
        store.set_ex("k", "v", 1).await.unwrap();
        assert!(store.refresh("k", "w", 30).await.unwrap());
        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(
            store.get_with_ttl("k").await.unwrap(),
            Some(("w".to_string(), 25))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn writes_sweep_expired_keys() {
        let store = MemoryTokenStore::new();
        store.set_ex("stale:a", "v", 1).await.unwrap();
        store.set_ex("stale:b", "v", 2).await.unwrap();
        store.set_ex("fresh", "v", 60).await.unwrap();

        tokio::time::advance(Duration::from_secs(3)).await;
        store.set_ex("new", "v", 60).await.unwrap();

        let map = store.entries.lock().unwrap();
        let mut keys: Vec<_> = map.keys().cloned().collect();
        keys.sort();
        assert_eq!(keys, ["fresh", "new"]);
    }

    #[tokio::test]
    async fn take_if_checks_payload() {
        let store = MemoryTokenStore::new();
        store.set_ex("k", "alice", 60).await.unwrap();
        assert!(store.take_if("k", "bob").await.unwrap().is_none());
        let (value, _) = store.take_if("k", "alice").await.unwrap().unwrap();
        assert_eq!(value, "alice");
        assert!(store.take_if("k", "alice").await.unwrap().is_none());
        assert!(store.get_with_ttl("k").await.unwrap().is_none());
    }
}

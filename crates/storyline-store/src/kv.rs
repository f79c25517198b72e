//! Key-value cache adapter (C1, §4.1).
//!
//! The production deployment backs this with a Redis-compatible store; the
//! adapter here is an in-process, TTL-aware map suitable for a single-node
//! deployment and for tests. Swapping in a networked client means
//! implementing `KvCache` against it — nothing upstream depends on the
//! concrete type.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::error::{Result, StoreError};

/// Sentinel values mirroring Redis's `TTL` command semantics: `-2` means the
/// key does not exist, `-1` means it exists with no expiry.
pub const TTL_NO_KEY: i64 = -2;
pub const TTL_NO_EXPIRY: i64 = -1;

#[async_trait]
pub trait KvCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    async fn set_ex(&self, key: &str, ttl_seconds: i64, value: Vec<u8>) -> Result<()>;
    async fn del(&self, key: &str) -> Result<()>;
    async fn scan_by_prefix(&self, prefix: &str) -> Result<Vec<String>>;
    /// Seconds remaining, `TTL_NO_EXPIRY` if the key never expires, or
    /// `TTL_NO_KEY` if absent — matches the scheduled cleanup tick's
    /// `ttl ∈ {0, -2}` sweep condition (§4.2).
    async fn ttl(&self, key: &str) -> Result<i64>;
}

struct Entry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self) -> bool {
        matches!(self.expires_at, Some(t) if Instant::now() >= t)
    }
}

/// In-process TTL map. Bounded scans (`scan_by_prefix`) are the only
/// unbounded-looking operation — callers (continuity cleanup) are
/// responsible for capping how many keys they act on per tick (§9).
pub struct InMemoryKvCache {
    entries: Mutex<HashMap<String, Entry>>,
}

impl InMemoryKvCache {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryKvCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KvCache for InMemoryKvCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut entries = self.entries.lock().map_err(|_| StoreError::Cache("poisoned".into()))?;
        match entries.get(key) {
            Some(e) if e.is_expired() => {
                entries.remove(key);
                Ok(None)
            }
            Some(e) => Ok(Some(e.value.clone())),
            None => Ok(None),
        }
    }

    async fn set_ex(&self, key: &str, ttl_seconds: i64, value: Vec<u8>) -> Result<()> {
        if ttl_seconds <= 0 {
            // Matches the continuity manager's "TTL <= 0 ⇒ drop" rule (§4.2).
            return Ok(());
        }
        let mut entries = self.entries.lock().map_err(|_| StoreError::Cache("poisoned".into()))?;
        entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: Some(Instant::now() + Duration::from_secs(ttl_seconds as u64)),
            },
        );
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.lock().map_err(|_| StoreError::Cache("poisoned".into()))?;
        entries.remove(key);
        Ok(())
    }

    async fn scan_by_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let mut entries = self.entries.lock().map_err(|_| StoreError::Cache("poisoned".into()))?;
        entries.retain(|_, e| !e.is_expired());
        Ok(entries
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn ttl(&self, key: &str) -> Result<i64> {
        let mut entries = self.entries.lock().map_err(|_| StoreError::Cache("poisoned".into()))?;
        match entries.get(key) {
            Some(e) if e.is_expired() => {
                entries.remove(key);
                Ok(TTL_NO_KEY)
            }
            Some(Entry { expires_at: None, .. }) => Ok(TTL_NO_EXPIRY),
            Some(Entry { expires_at: Some(t), .. }) => {
                Ok(t.saturating_duration_since(Instant::now()).as_secs() as i64)
            }
            None => Ok(TTL_NO_KEY),
        }
    }
}

/// Namespaced key helpers matching the schema documented in §4.1 and §6.
pub mod keys {
    pub fn context(prefix: &str, session_id: &str) -> String {
        format!("{prefix}:context:{session_id}")
    }

    /// Index of a user's session ids, most-recently-updated first — what
    /// `getOrCreateContext` scans to find a prior session to inherit from
    /// when the caller's own session id is a cache miss (§4.2 step 2-3).
    pub fn user_sessions(prefix: &str, user_id: &str) -> String {
        format!("{prefix}:usersessions:{user_id}")
    }

    pub fn state(prefix: &str, user_id: &str, session_id: &str) -> String {
        format!("{prefix}:state:{user_id}:{session_id}")
    }

    pub fn parent_consent(prefix: &str, user_id: &str) -> String {
        format!("{prefix}:parentConsent:{user_id}")
    }

    pub fn parent_consent_meta(prefix: &str, user_id: &str) -> String {
        format!("{prefix}:parentConsent:meta:{user_id}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_ex_then_get_roundtrips() {
        let cache = InMemoryKvCache::new();
        cache.set_ex("k", 60, b"hello".to_vec()).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some(b"hello".to_vec()));
    }

    #[tokio::test]
    async fn non_positive_ttl_drops_the_write() {
        let cache = InMemoryKvCache::new();
        cache.set_ex("k", 0, b"hello".to_vec()).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn ttl_reports_no_key_sentinel() {
        let cache = InMemoryKvCache::new();
        assert_eq!(cache.ttl("missing").await.unwrap(), TTL_NO_KEY);
    }

    #[tokio::test]
    async fn scan_by_prefix_filters() {
        let cache = InMemoryKvCache::new();
        cache.set_ex("p:context:a", 60, vec![]).await.unwrap();
        cache.set_ex("p:context:b", 60, vec![]).await.unwrap();
        cache.set_ex("p:state:a:a", 60, vec![]).await.unwrap();
        let mut found = cache.scan_by_prefix("p:context:").await.unwrap();
        found.sort();
        assert_eq!(found, vec!["p:context:a", "p:context:b"]);
    }
}

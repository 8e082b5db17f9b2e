//! Generic TTL cache for soft process-wide state: the provider-balance cache
//! and the low-balance alert dedup lock are both instances of this type.
//!
//! `HashMap` + per-entry expiry behind a `tokio::sync::RwLock`; loss of
//! this cache is always correctness-neutral, it only degrades to an
//! origin call or a re-sent alert.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

struct Entry<V> {
    value: V,
    expires_at: Option<Instant>,
}

impl<V> Entry<V> {
    fn is_expired(&self) -> bool {
        matches!(self.expires_at, Some(t) if t < Instant::now())
    }
}

/// In-memory key-value cache with optional per-entry TTL.
#[derive(Clone)]
pub struct TtlCache<K, V> {
    data: Arc<RwLock<HashMap<K, Entry<V>>>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        TtlCache {
            data: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Returns the cached value, or `None` if absent or expired. An expired
    /// entry is lazily evicted on the next `set`, not on read.
    pub async fn get(&self, key: &K) -> Option<V> {
        let data = self.data.read().await;
        match data.get(key) {
            Some(entry) if !entry.is_expired() => Some(entry.value.clone()),
            _ => None,
        }
    }

    pub async fn set(&self, key: K, value: V, ttl: Option<Duration>) {
        let mut data = self.data.write().await;
        data.insert(
            key,
            Entry {
                value,
                expires_at: ttl.map(|d| Instant::now() + d),
            },
        );
    }

    /// Returns `true` if the key is present and unexpired, without cloning the value.
    pub async fn contains(&self, key: &K) -> bool {
        let data = self.data.read().await;
        matches!(data.get(key), Some(entry) if !entry.is_expired())
    }

    pub async fn delete(&self, key: &K) {
        self.data.write().await.remove(key);
    }
}

impl<K, V> Default for TtlCache<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

//! Response cache
//!
//! Maps an operation fingerprint to the last `data` payload received for it.
//! Writes are announced on a broadcast channel so watched queries can pick up
//! edits made elsewhere (e.g. marking a notification read).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use tokio::sync::{broadcast, Mutex};

/// Edit applied in place to a cached payload
pub type CacheEdit = Box<dyn FnOnce(&mut Value) + Send>;

/// Cached payload and when it was fetched
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub data: Value,
    pub fetched_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(data: Value) -> Self {
        Self {
            data,
            fetched_at: Utc::now(),
        }
    }

    /// Younger than `max_age`; entries never go stale without one
    pub fn is_fresh(&self, max_age: Option<Duration>, now: DateTime<Utc>) -> bool {
        match max_age {
            Some(max_age) => now - self.fetched_at <= max_age,
            None => true,
        }
    }
}

/// Storage for query results
#[async_trait]
pub trait ResponseCache: Send + Sync {
    async fn get(&self, key: &str) -> Option<CacheEntry>;

    async fn put(&self, key: &str, data: Value);

    /// Apply `edit` to the entry under `key`; returns false when nothing is cached
    async fn modify(&self, key: &str, edit: CacheEdit) -> bool;

    async fn evict(&self, key: &str) -> bool;

    async fn clear(&self);

    /// Keys written, modified or evicted from now on
    fn subscribe(&self) -> broadcast::Receiver<String>;
}

/// In-memory cache shared by clones
pub struct MemoryCache {
    entries: Arc<Mutex<HashMap<String, CacheEntry>>>,
    changes: broadcast::Sender<String>,
}

impl MemoryCache {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(64);
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            changes,
        }
    }

    /// Seed the cache with a value fetched at a given time
    pub async fn prime(&self, key: &str, entry: CacheEntry) {
        self.entries.lock().await.insert(key.to_string(), entry);
        self.announce(key);
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    fn announce(&self, key: &str) {
        // No receivers is fine
        let _ = self.changes.send(key.to_string());
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for MemoryCache {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
            changes: self.changes.clone(),
        }
    }
}

#[async_trait]
impl ResponseCache for MemoryCache {
    async fn get(&self, key: &str) -> Option<CacheEntry> {
        self.entries.lock().await.get(key).cloned()
    }

    async fn put(&self, key: &str, data: Value) {
        self.entries
            .lock()
            .await
            .insert(key.to_string(), CacheEntry::new(data));
        self.announce(key);
    }

    async fn modify(&self, key: &str, edit: CacheEdit) -> bool {
        let modified = {
            let mut entries = self.entries.lock().await;
            match entries.get_mut(key) {
                Some(entry) => {
                    edit(&mut entry.data);
                    true
                }
                None => false,
            }
        };
        if modified {
            self.announce(key);
        }
        modified
    }

    async fn evict(&self, key: &str) -> bool {
        let removed = self.entries.lock().await.remove(key).is_some();
        if removed {
            self.announce(key);
        }
        removed
    }

    async fn clear(&self) {
        let keys: Vec<String> = self.entries.lock().await.drain().map(|(k, _)| k).collect();
        for key in keys {
            self.announce(&key);
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<String> {
        self.changes.subscribe()
    }
}

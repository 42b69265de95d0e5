//! In-process cache backend. Lifetime = process lifetime; contents are lost
//! on restart.

use super::{CacheError, CacheStore};
use async_trait::async_trait;
use moka::Expiry;
use moka::sync::Cache;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};

const MAX_ENTRIES: u64 = 100_000;

#[derive(Clone)]
struct Entry {
    value: Arc<Value>,
    ttl: Duration,
}

/// Each entry carries its own TTL, computed by the caller (typically
/// seconds-until-midnight at write time). Overwrites restart the clock.
struct PerEntryTtl;

impl Expiry<String, Entry> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        entry: &Entry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        entry: &Entry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }
}

pub struct MemoryStore {
    cache: Cache<String, Entry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let cache = Cache::builder()
            .max_capacity(MAX_ENTRIES)
            .expire_after(PerEntryTtl)
            .build();
        MemoryStore { cache }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<(), CacheError> {
        self.cache.insert(
            key.to_string(),
            Entry {
                value: Arc::new(value),
                ttl,
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        Ok(self.cache.get(key).map(|entry| (*entry.value).clone()))
    }

    async fn has(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.cache.contains_key(key))
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.cache.invalidate(key);
        Ok(())
    }

    async fn clear(&self) -> Result<(), CacheError> {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks();
        Ok(())
    }

    async fn size(&self) -> Result<u64, CacheError> {
        // Flush pending expirations so the count reflects live entries only.
        self.cache.run_pending_tasks();
        Ok(self.cache.entry_count())
    }
}

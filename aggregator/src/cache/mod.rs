//! TTL cache abstraction with swappable backends.
//!
//! Components receive an injected `Arc<dyn CacheStore>` rather than touching
//! a global map, so the in-process and durable backends are interchangeable
//! without changing call sites. Expiry is lazy: a read past an entry's
//! deadline behaves as a miss and removes the entry; there are no eviction
//! timers.

mod filesystem;
mod memory;

pub use filesystem::FilesystemStore;
pub use memory::MemoryStore;

use crate::config::CacheBackend;
use async_trait::async_trait;
use chrono::Local;
use serde_json::Value;
use std::io;
use std::sync::Arc;
use std::time::Duration;

#[derive(thiserror::Error, Debug)]
pub enum CacheError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("encode error: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("decode error: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Key-value store with per-entry expiry. `set` overwrites any existing
/// entry for the key and resets its expiry to `now + ttl`.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<(), CacheError>;

    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError>;

    async fn has(&self, key: &str) -> Result<bool, CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    async fn clear(&self) -> Result<(), CacheError>;

    /// Number of live entries. Expired entries are evicted before counting.
    async fn size(&self) -> Result<u64, CacheError>;
}

/// Builds the backend selected by configuration.
pub fn from_config(config: &CacheBackend) -> Arc<dyn CacheStore> {
    match config {
        CacheBackend::Memory => Arc::new(MemoryStore::new()),
        CacheBackend::Filesystem { base_dir } => Arc::new(FilesystemStore::new(base_dir)),
    }
}

const ONE_DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Seconds remaining until the next local midnight, so daily-keyed entries
/// all lapse together when the upstream leaderboard rolls over.
pub fn seconds_until_midnight() -> Duration {
    let now = Local::now();
    let next_midnight = now
        .date_naive()
        .succ_opt()
        .and_then(|day| day.and_hms_opt(0, 0, 0))
        .and_then(|naive| naive.and_local_timezone(Local).earliest());

    match next_midnight {
        Some(midnight) => (midnight - now).to_std().unwrap_or(ONE_DAY),
        None => ONE_DAY,
    }
}

//! Durable cache backend: one file per key under a base directory.
//!
//! Entries survive process restarts. The expiry deadline is stored inside
//! the envelope, so a restarted process still honors TTLs written by its
//! predecessor; reads past the deadline delete the file and miss.

use super::{CacheError, CacheStore};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

const FILE_SUFFIX: &str = ".bin";
const ZSTD_LEVEL: i32 = 1;

#[derive(Serialize, Deserialize)]
struct Envelope {
    expires_at: i64,
    value: Value,
}

impl Envelope {
    fn is_expired(&self, now: i64) -> bool {
        now >= self.expires_at
    }
}

/// zstd-compressed JSON. Raw per-batch item arrays compress well and are the
/// largest values this store sees.
struct Codec;

impl Codec {
    fn encode(&self, envelope: &Envelope) -> Result<Vec<u8>, CacheError> {
        let mut encoder = zstd::stream::write::Encoder::new(Vec::new(), ZSTD_LEVEL)?;
        serde_json::to_writer(&mut encoder, envelope).map_err(CacheError::Encode)?;
        encoder.flush()?;
        Ok(encoder.finish()?)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Envelope, CacheError> {
        let mut decoder = zstd::stream::read::Decoder::new(bytes)?;
        let mut buffer = Vec::new();
        decoder.read_to_end(&mut buffer)?;
        serde_json::from_slice(&buffer).map_err(CacheError::Decode)
    }
}

pub struct FilesystemStore {
    base_dir: PathBuf,
    codec: Codec,
}

impl FilesystemStore {
    pub fn new<P: AsRef<Path>>(base_dir: P) -> Self {
        FilesystemStore {
            base_dir: base_dir.as_ref().to_path_buf(),
            codec: Codec,
        }
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.base_dir.join(format!("{}{FILE_SUFFIX}", encode_key(key)))
    }

    /// Reads and validates one entry file. Expired entries are removed and
    /// reported as a miss.
    async fn read_live(&self, path: &Path) -> Result<Option<Envelope>, CacheError> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let envelope = self.codec.decode(&bytes)?;
        if envelope.is_expired(Utc::now().timestamp()) {
            let _ = tokio::fs::remove_file(path).await;
            return Ok(None);
        }
        Ok(Some(envelope))
    }
}

/// Keys may contain arbitrary user input (player names). Map every byte
/// outside `[A-Za-z0-9._-]` to `%XX` so the encoding is filename-safe and
/// injective.
fn encode_key(key: &str) -> String {
    let mut encoded = String::with_capacity(key.len());
    for byte in key.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'.' | b'_' | b'-' => {
                encoded.push(byte as char)
            }
            other => {
                encoded.push('%');
                encoded.push_str(&format!("{other:02X}"));
            }
        }
    }
    encoded
}

#[async_trait]
impl CacheStore for FilesystemStore {
    async fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<(), CacheError> {
        tokio::fs::create_dir_all(&self.base_dir).await?;
        let envelope = Envelope {
            expires_at: Utc::now().timestamp() + ttl.as_secs() as i64,
            value,
        };
        let bytes = self.codec.encode(&envelope)?;
        tokio::fs::write(self.entry_path(key), bytes).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        let path = self.entry_path(key);
        Ok(self.read_live(&path).await?.map(|envelope| envelope.value))
    }

    async fn has(&self, key: &str) -> Result<bool, CacheError> {
        let path = self.entry_path(key);
        Ok(self.read_live(&path).await?.is_some())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        match tokio::fs::remove_file(self.entry_path(key)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    async fn clear(&self) -> Result<(), CacheError> {
        let mut dir = match tokio::fs::read_dir(&self.base_dir).await {
            Ok(dir) => dir,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(err.into()),
        };
        while let Some(entry) = dir.next_entry().await? {
            if entry.file_name().to_string_lossy().ends_with(FILE_SUFFIX) {
                tokio::fs::remove_file(entry.path()).await?;
            }
        }
        Ok(())
    }

    async fn size(&self) -> Result<u64, CacheError> {
        let mut dir = match tokio::fs::read_dir(&self.base_dir).await {
            Ok(dir) => dir,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(err) => return Err(err.into()),
        };
        let mut live = 0;
        while let Some(entry) = dir.next_entry().await? {
            if !entry.file_name().to_string_lossy().ends_with(FILE_SUFFIX) {
                continue;
            }
            // Expired files are evicted as part of counting.
            if self.read_live(&entry.path()).await?.is_some() {
                live += 1;
            }
        }
        Ok(live)
    }
}

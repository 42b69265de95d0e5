use serde::Deserialize;
use std::time::Duration;

#[derive(Clone, Deserialize, Debug)]
pub struct Listener {
    pub host: String,
    pub port: u16,
}

impl Default for Listener {
    fn default() -> Self {
        Listener {
            host: "127.0.0.1".into(),
            port: 8787,
        }
    }
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "lowercase")]
#[serde(tag = "type")]
pub enum CacheBackend {
    Memory,
    Filesystem { base_dir: String },
}

impl Default for CacheBackend {
    fn default() -> Self {
        CacheBackend::Memory
    }
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct UpstreamConfig {
    /// Site root, e.g. `https://www.nightcrows.com`.
    pub base_url: String,
    /// Build id segment of the versioned data URLs.
    pub build_id: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,
}

impl UpstreamConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_jitter_ms() -> u64 {
    250
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct WarmConfig {
    /// Partitions processed per scheduler invocation.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Leaderboard pages fetched per partition.
    #[serde(default = "default_pages_per_partition")]
    pub pages_per_partition: u32,
    /// Concurrency limit for the page fan-out.
    #[serde(default = "default_fan_out_limit")]
    pub fan_out_limit: usize,
    /// When false, a finished batch does not trigger the next one; batches
    /// must then be driven externally through the warm-batch endpoint.
    #[serde(default = "default_chain")]
    pub chain: bool,
}

impl Default for WarmConfig {
    fn default() -> Self {
        WarmConfig {
            batch_size: default_batch_size(),
            pages_per_partition: default_pages_per_partition(),
            fan_out_limit: default_fan_out_limit(),
            chain: default_chain(),
        }
    }
}

fn default_batch_size() -> usize {
    3
}

fn default_pages_per_partition() -> u32 {
    10
}

fn default_fan_out_limit() -> usize {
    5
}

fn default_chain() -> bool {
    true
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct CorsConfig {
    #[serde(default = "default_allowed_origin")]
    pub allowed_origin: String,
}

impl Default for CorsConfig {
    fn default() -> Self {
        CorsConfig {
            allowed_origin: default_allowed_origin(),
        }
    }
}

fn default_allowed_origin() -> String {
    "*".to_string()
}

//! Batch warm scheduler.
//!
//! The partition universe is walked in fixed-size batches. Each invocation
//! fetches one batch's partitions, persists the raw items under a
//! batch-scoped key, and triggers the next batch as a detached task. The
//! terminal batch folds every batch key plus the canonical top-1000 feed
//! through the normalizer and persists the result under the canonical key.
//!
//! Re-invoking any batch number is safe: a batch computes from partition
//! slices, never from prior batch state, so a stalled chain is resumed by
//! invoking the next batch number by hand.

use crate::cache::{CacheError, CacheStore, seconds_until_midnight};
use crate::config::WarmConfig;
use crate::metrics_defs::{WARM_BATCH_RUNS, WARM_ITEMS_FETCHED};
use crate::partitions::{self, Partition};
use crate::rank::dedup_and_rank;
use crate::types::{CanonicalRanking, PlayerRecord};
use crate::upstream::RankingSite;
use serde::Serialize;
use serde_json::Value;
use shared::counter;
use std::sync::Arc;

pub const CANONICAL_KEY: &str = "top-players-ALL";

/// Region scope of the canonical feed fetched by the terminal batch: the
/// unfiltered, all-regions ranking.
const ALL_REGIONS: i64 = 0;

#[derive(thiserror::Error, Debug)]
pub enum WarmError {
    #[error("batch number must be at least 1, got {0}")]
    InvalidBatch(u32),

    #[error("cache error: {0}")]
    Cache(#[from] CacheError),
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(tag = "phase", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum BatchPhase {
    /// This batch finished and the next one was triggered in the background.
    Chained { next_batch: u32 },
    /// Terminal batch: the canonical ranking was computed and cached.
    Done { canonical_items: usize },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub batch: u32,
    pub total_batches: u32,
    pub partitions: usize,
    pub items: usize,
    #[serde(flatten)]
    pub phase: BatchPhase,
}

#[derive(Clone)]
pub struct WarmScheduler {
    site: Arc<RankingSite>,
    cache: Arc<dyn CacheStore>,
    config: WarmConfig,
}

pub fn batch_key(batch: u32) -> String {
    format!("warm-batch-{batch}")
}

impl WarmScheduler {
    pub fn new(site: Arc<RankingSite>, cache: Arc<dyn CacheStore>, config: WarmConfig) -> Self {
        WarmScheduler { site, cache, config }
    }

    /// Runs batch `batch` to completion and reports what happened. Page
    /// fetch failures are absorbed as empty results; only cache failures
    /// and an invalid batch number surface as errors.
    pub async fn run_batch(&self, batch: u32) -> Result<BatchReport, WarmError> {
        if batch < 1 {
            return Err(WarmError::InvalidBatch(batch));
        }
        counter!(WARM_BATCH_RUNS).increment(1);

        let universe = partitions::universe();
        let total_batches = partitions::total_batches(universe.len(), self.config.batch_size);
        let slice = partitions::batch_slice(&universe, batch, self.config.batch_size);
        if slice.is_empty() {
            tracing::warn!(batch, total_batches, "batch has no partitions; proceeding");
        }

        let items = self.fetch_batch_items(slice).await;
        counter!(WARM_ITEMS_FETCHED).increment(items.len() as u64);

        let raw = serde_json::to_value(&items).map_err(CacheError::Encode)?;
        self.cache
            .set(&batch_key(batch), raw, seconds_until_midnight())
            .await?;

        if batch < total_batches {
            let next_batch = batch + 1;
            if self.config.chain {
                self.chain(next_batch);
            }
            tracing::info!(batch, next_batch, items = items.len(), "batch complete, chained");
            return Ok(BatchReport {
                batch,
                total_batches,
                partitions: slice.len(),
                items: items.len(),
                phase: BatchPhase::Chained { next_batch },
            });
        }

        let canonical_items = self.finalize(total_batches).await?;
        tracing::info!(batch, canonical_items, "warm-up complete");
        Ok(BatchReport {
            batch,
            total_batches,
            partitions: slice.len(),
            items: items.len(),
            phase: BatchPhase::Done { canonical_items },
        })
    }

    /// Partitions within a batch run sequentially; each partition's pages
    /// fan out under the configured concurrency limit.
    async fn fetch_batch_items(&self, slice: &[Partition]) -> Vec<PlayerRecord> {
        let mut items = Vec::new();
        for partition in slice {
            let records = self
                .site
                .fetch_partition(
                    *partition,
                    self.config.pages_per_partition,
                    self.config.fan_out_limit,
                )
                .await;
            tracing::debug!(
                region = partition.region_code,
                weapon = partition.weapon_type,
                records = records.len(),
                "partition fetched"
            );
            items.extend(records);
        }
        items
    }

    /// Terminal step: read back every batch key, fetch the canonical feed,
    /// normalize, persist. Absent batch entries read as empty; a broken
    /// chain link or an early expiry must not abort the merge.
    async fn finalize(&self, total_batches: u32) -> Result<usize, WarmError> {
        let mut scanned = Vec::new();
        for batch in 1..=total_batches {
            let key = batch_key(batch);
            match self.cache.get(&key).await? {
                Some(raw) => scanned.extend(decode_batch(&key, raw)),
                None => tracing::warn!(key = %key, "batch entry missing, treating as empty"),
            }
        }

        let top_feed = self.site.fetch_top_1000(ALL_REGIONS).await;
        if top_feed.is_empty() {
            tracing::warn!("canonical top feed is empty; ranking from scans only");
        }

        let ranking = CanonicalRanking::new(dedup_and_rank(scanned, top_feed));
        let count = ranking.items.len();
        let value = serde_json::to_value(&ranking).map_err(CacheError::Encode)?;
        self.cache
            .set(CANONICAL_KEY, value, seconds_until_midnight())
            .await?;
        Ok(count)
    }

    /// Fire-and-forget trigger of the next batch. The task is detached from
    /// the caller's request lifecycle; its failures are log-only.
    fn chain(&self, next_batch: u32) {
        let scheduler = self.clone();
        tokio::spawn(async move {
            match scheduler.run_batch(next_batch).await {
                Ok(report) => tracing::debug!(
                    batch = report.batch,
                    items = report.items,
                    "chained batch finished"
                ),
                Err(error) => {
                    tracing::error!(batch = next_batch, error = %error, "chained batch failed")
                }
            }
        });
    }
}

fn decode_batch(key: &str, raw: Value) -> Vec<PlayerRecord> {
    match serde_json::from_value(raw) {
        Ok(items) => items,
        Err(error) => {
            tracing::warn!(key = %key, error = %error, "batch entry undecodable, treating as empty");
            Vec::new()
        }
    }
}

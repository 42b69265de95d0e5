//! Synchronous aggregation fallback.
//!
//! One long-running request fetches every partition's pages in a single
//! flat fan-out, applies a simpler single-pass dedup, and caches the
//! result. Invoked rarely (cache miss) and bounded by the same per-fetch
//! timeout and retry policy as the scheduler.

use crate::cache::{CacheError, CacheStore, seconds_until_midnight};
use crate::config::WarmConfig;
use crate::partitions;
use crate::types::{CanonicalRanking, PlayerKey, PlayerRecord};
use crate::upstream::{RankingSite, parse_records};
use indexmap::IndexMap;
use std::sync::Arc;
use url::Url;

#[derive(Clone)]
pub struct FullScan {
    site: Arc<RankingSite>,
    cache: Arc<dyn CacheStore>,
    config: WarmConfig,
}

pub fn scan_key(region_code: Option<i64>) -> String {
    match region_code {
        Some(code) => format!("growth-all-{code}"),
        None => "growth-all-ALL".to_string(),
    }
}

impl FullScan {
    pub fn new(site: Arc<RankingSite>, cache: Arc<dyn CacheStore>, config: WarmConfig) -> Self {
        FullScan { site, cache, config }
    }

    /// Aggregates every partition (optionally restricted to one region) in
    /// one request, serving and refreshing the request-scoped cache entry.
    pub async fn aggregate(&self, region_code: Option<i64>) -> Result<CanonicalRanking, CacheError> {
        let key = scan_key(region_code);
        if let Some(cached) = self.cache.get(&key).await? {
            if let Ok(ranking) = serde_json::from_value::<CanonicalRanking>(cached) {
                return Ok(ranking);
            }
            // An undecodable entry is replaced by a fresh scan.
        }

        let selected: Vec<_> = partitions::universe()
            .into_iter()
            .filter(|p| region_code.is_none_or(|code| p.region_code == code))
            .collect();

        let urls: Vec<Url> = selected
            .iter()
            .flat_map(|partition| {
                (1..=self.config.pages_per_partition).map(|page| self.site.page_url(*partition, page))
            })
            .collect();

        tracing::info!(partitions = selected.len(), pages = urls.len(), "full scan started");
        let payloads = self
            .site
            .fetcher()
            .fetch_many(urls, self.config.fan_out_limit)
            .await;
        let records: Vec<PlayerRecord> = payloads.iter().flat_map(parse_records).collect();

        let ranking = CanonicalRanking::new(single_pass_rank(records));
        let value = serde_json::to_value(&ranking).map_err(CacheError::Encode)?;
        self.cache.set(&key, value, seconds_until_midnight()).await?;
        Ok(ranking)
    }
}

/// Single-pass dedup, first occurrence wins. When the data carries no
/// per-class ranks at all, the result is ordered by score descending
/// instead of arrival order. Ranks are assigned contiguously from 1.
///
/// This intentionally diverges from the scheduler's lower-rank-wins merge;
/// see DESIGN.md.
fn single_pass_rank(records: Vec<PlayerRecord>) -> Vec<PlayerRecord> {
    let mut deduped: IndexMap<PlayerKey, PlayerRecord> = IndexMap::new();
    for record in records {
        let Some(key) = record.identity_key() else {
            continue;
        };
        deduped.entry(key).or_insert(record);
    }

    let mut items: Vec<PlayerRecord> = deduped.into_values().collect();
    let has_weapon_ranks = items.iter().any(|r| r.weapon_type_rank.is_some());
    if !has_weapon_ranks {
        items.sort_by(|a, b| {
            let a_score = a.score.unwrap_or(f64::NEG_INFINITY);
            let b_score = b.score.unwrap_or(f64::NEG_INFINITY);
            b_score.total_cmp(&a_score)
        });
    }

    for (i, item) in items.iter_mut().enumerate() {
        item.rank = Some(i as u32 + 1);
    }
    items
}

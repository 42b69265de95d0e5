//! Client for the external ranking site's versioned JSON data endpoints.
//!
//! All payload access is defensive: the record array lives at
//! `/pageProps/rankingList`, and any absent nested field reads as "no
//! items" rather than an error, so upstream schema drift degrades to empty
//! pages instead of failed batches.

use crate::config::UpstreamConfig;
use crate::fetch::{FetchError, Fetcher, RetryPolicy};
use crate::partitions::Partition;
use crate::types::PlayerRecord;
use serde_json::Value;
use url::Url;

const RANKING_PATH: &str = "en/ranking/growth.json";
const RECORDS_POINTER: &str = "/pageProps/rankingList";
pub const TOP_FEED_PAGES: u32 = 10;

#[derive(thiserror::Error, Debug)]
pub enum UpstreamError {
    #[error("invalid upstream URL: {0}")]
    InvalidUrl(String),
}

pub struct RankingSite {
    fetcher: Fetcher,
    data_root: Url,
}

impl RankingSite {
    pub fn new(config: &UpstreamConfig) -> Result<Self, UpstreamError> {
        let root = format!(
            "{}/_next/data/{}/{RANKING_PATH}",
            config.base_url.trim_end_matches('/'),
            config.build_id,
        );
        let data_root = Url::parse(&root).map_err(|e| UpstreamError::InvalidUrl(e.to_string()))?;
        Ok(RankingSite {
            fetcher: Fetcher::new(RetryPolicy::from(config)),
            data_root,
        })
    }

    pub fn fetcher(&self) -> &Fetcher {
        &self.fetcher
    }

    fn ranking_url(&self, region_code: i64, weapon_type: i64, page: u32, keyword: Option<&str>) -> Url {
        let mut url = self.data_root.clone();
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("regionCode", &region_code.to_string())
                .append_pair("weaponType", &weapon_type.to_string())
                .append_pair("page", &page.to_string())
                .append_pair("rankingType", "growth")
                .append_pair("wmsso_sign", "check");
            if let Some(keyword) = keyword {
                pairs.append_pair("keyword", keyword);
            }
        }
        url
    }

    pub fn page_url(&self, partition: Partition, page: u32) -> Url {
        self.ranking_url(partition.region_code, partition.weapon_type, page, None)
    }

    /// All pages of one partition through the bounded fan-out, concatenated
    /// in page order. Failed pages contribute nothing.
    pub async fn fetch_partition(
        &self,
        partition: Partition,
        pages: u32,
        fan_out_limit: usize,
    ) -> Vec<PlayerRecord> {
        let urls: Vec<Url> = (1..=pages).map(|page| self.page_url(partition, page)).collect();
        let payloads = self.fetcher.fetch_many(urls, fan_out_limit).await;
        payloads.iter().flat_map(parse_records).collect()
    }

    /// The canonical top-1000 feed: the unfiltered (weaponType=0) ranking,
    /// ten pages fetched in parallel, concatenated in page order so list
    /// position is 1-based global rank.
    pub async fn fetch_top_1000(&self, region_code: i64) -> Vec<PlayerRecord> {
        let urls: Vec<Url> = (1..=TOP_FEED_PAGES)
            .map(|page| self.ranking_url(region_code, 0, page, None))
            .collect();
        let payloads = self.fetcher.fetch_many(urls, TOP_FEED_PAGES as usize).await;
        payloads.iter().flat_map(parse_records).collect()
    }

    /// Single-player search. The raw payload is returned so the caller can
    /// cache and serve it untouched.
    pub async fn lookup(&self, ign: &str, region_code: i64) -> Result<Value, FetchError> {
        let url = self.ranking_url(region_code, 0, 1, Some(ign));
        self.fetcher.fetch_json(url).await
    }

    /// One raw unfiltered page, returned untouched.
    pub async fn raw_page(&self, page: u32, region_code: i64) -> Result<Value, FetchError> {
        let url = self.ranking_url(region_code, 0, page, None);
        self.fetcher.fetch_json(url).await
    }
}

/// Extracts player records from a page payload. Anything that is not the
/// expected shape yields an empty list, including the `Value::Null`
/// placeholder a failed fan-out slot leaves behind.
pub fn parse_records(payload: &Value) -> Vec<PlayerRecord> {
    let Some(items) = payload.pointer(RECORDS_POINTER).and_then(Value::as_array) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| serde_json::from_value(item.clone()).ok())
        .collect()
}

//! In-process mock of the upstream ranking site for integration tests.
//!
//! Serves deterministic leaderboard pages on an ephemeral port and records
//! request counts plus the high-water mark of concurrent requests, so tests
//! can assert fan-out bounds without real network traffic.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Clone)]
pub struct MockUpstreamOptions {
    pub records_per_page: usize,
    /// Per-request delay; combined with the in-flight probe this makes
    /// concurrency limits observable.
    pub delay: Duration,
    /// Requests for this region fail with a 500 on every attempt.
    pub fail_region: Option<i64>,
}

impl Default for MockUpstreamOptions {
    fn default() -> Self {
        MockUpstreamOptions {
            records_per_page: 3,
            delay: Duration::ZERO,
            fail_region: None,
        }
    }
}

struct Probe {
    options: MockUpstreamOptions,
    hits: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

pub struct MockUpstream {
    addr: SocketAddr,
    probe: Arc<Probe>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageParams {
    #[serde(default)]
    region_code: i64,
    #[serde(default)]
    weapon_type: i64,
    #[serde(default = "first_page")]
    page: u32,
    #[serde(default)]
    keyword: Option<String>,
}

fn first_page() -> u32 {
    1
}

impl MockUpstream {
    pub async fn spawn(options: MockUpstreamOptions) -> Self {
        let probe = Arc::new(Probe {
            options,
            hits: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        });

        let app = Router::new()
            .route(
                "/_next/data/{build_id}/en/ranking/growth.json",
                get(ranking_page),
            )
            .route("/always-fail", get(always_fail))
            .with_state(probe.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock upstream");
        let addr = listener.local_addr().expect("mock upstream addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        MockUpstream { addr, probe }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn fail_url(&self) -> String {
        format!("{}/always-fail", self.base_url())
    }

    pub fn hits(&self) -> usize {
        self.probe.hits.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.probe.max_in_flight.load(Ordering::SeqCst)
    }
}

async fn always_fail() -> StatusCode {
    StatusCode::INTERNAL_SERVER_ERROR
}

async fn ranking_page(
    State(probe): State<Arc<Probe>>,
    Query(params): Query<PageParams>,
) -> Result<Json<Value>, StatusCode> {
    probe.hits.fetch_add(1, Ordering::SeqCst);
    let current = probe.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
    probe.max_in_flight.fetch_max(current, Ordering::SeqCst);

    if !probe.options.delay.is_zero() {
        tokio::time::sleep(probe.options.delay).await;
    }

    let result = if probe.options.fail_region == Some(params.region_code) {
        Err(StatusCode::INTERNAL_SERVER_ERROR)
    } else {
        Ok(Json(page_payload(&probe.options, &params)))
    };

    probe.in_flight.fetch_sub(1, Ordering::SeqCst);
    result
}

/// Deterministic page content. The unfiltered (weaponType=0) feed produces
/// globally named `top-NNNN` players; partition pages produce per-class
/// rows, with the first row of region 1 pages overlapping the top feed so
/// dedup paths get exercised.
fn page_payload(options: &MockUpstreamOptions, params: &PageParams) -> Value {
    if let Some(keyword) = &params.keyword {
        return json!({
            "pageProps": {
                "rankingList": [{
                    "regionId": params.region_code.max(1),
                    "characterName": keyword,
                    "score": 1234.5,
                    "rank": 1,
                }]
            }
        });
    }

    let mut rows = Vec::with_capacity(options.records_per_page);
    for i in 0..options.records_per_page {
        let position = (params.page as usize - 1) * options.records_per_page + i + 1;
        let row = if params.weapon_type == 0 {
            json!({
                "regionId": 1,
                "characterName": format!("top-{position:04}"),
                "score": 100_000.0 - position as f64,
                "rank": position,
            })
        } else if i == 0 && params.region_code == 1 {
            json!({
                "regionId": 1,
                "characterName": format!("top-{:04}", params.page),
                "score": 100_000.0 - params.page as f64,
                "weaponType": params.weapon_type,
                "weaponTypeRank": position,
            })
        } else {
            json!({
                "regionId": params.region_code,
                "characterName": format!(
                    "r{}-w{}-p{}-{i}",
                    params.region_code, params.weapon_type, params.page
                ),
                "score": 50_000.0 - position as f64,
                "weaponType": params.weapon_type,
                "weaponTypeRank": position,
            })
        };
        rows.push(row);
    }

    json!({ "pageProps": { "rankingList": rows } })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::{Fetcher, RetryPolicy};
    use url::Url;

    fn quick_policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 2,
            base_delay: Duration::from_millis(5),
            jitter: Duration::from_millis(2),
            request_timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn fan_out_never_exceeds_its_limit() {
        let upstream = MockUpstream::spawn(MockUpstreamOptions {
            delay: Duration::from_millis(80),
            ..Default::default()
        })
        .await;

        let page = format!(
            "{}/_next/data/b/en/ranking/growth.json?regionCode=1&weaponType=1&page=1",
            upstream.base_url()
        );
        let mut urls: Vec<Url> = Vec::new();
        for i in 0..10 {
            let raw = if i % 3 == 1 {
                upstream.fail_url()
            } else {
                page.clone()
            };
            urls.push(Url::parse(&raw).unwrap());
        }

        let fetcher = Fetcher::new(quick_policy());
        let results = fetcher.fetch_many(urls, 3).await;

        assert_eq!(results.len(), 10);
        assert!(
            upstream.max_in_flight() <= 3,
            "observed {} concurrent requests",
            upstream.max_in_flight()
        );
        for (i, value) in results.iter().enumerate() {
            if i % 3 == 1 {
                assert_eq!(*value, Value::Null);
            } else {
                assert!(value.pointer("/pageProps/rankingList").is_some());
            }
        }
    }

    #[tokio::test]
    async fn failing_region_returns_500s() {
        let upstream = MockUpstream::spawn(MockUpstreamOptions {
            fail_region: Some(2),
            ..Default::default()
        })
        .await;

        let ok = format!(
            "{}/_next/data/b/en/ranking/growth.json?regionCode=1&weaponType=1&page=1",
            upstream.base_url()
        );
        let bad = format!(
            "{}/_next/data/b/en/ranking/growth.json?regionCode=2&weaponType=1&page=1",
            upstream.base_url()
        );

        let fetcher = Fetcher::new(quick_policy());
        assert!(fetcher.fetch_json(Url::parse(&ok).unwrap()).await.is_ok());
        assert!(fetcher.fetch_json(Url::parse(&bad).unwrap()).await.is_err());
    }
}

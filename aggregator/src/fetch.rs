//! HTTP fetch layer: per-attempt timeout, bounded retry with jittered
//! exponential backoff, and a bounded-concurrency fan-out.

use crate::config::UpstreamConfig;
use crate::metrics_defs::{UPSTREAM_FETCH_FAILED, UPSTREAM_RETRY};
use rand::Rng;
use reqwest::StatusCode;
use serde_json::Value;
use shared::counter;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{sleep, timeout};
use url::Url;

#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("upstream returned status {0} for {1}")]
    Status(StatusCode, Url),

    #[error("request timed out after {0:?}")]
    TimedOut(Duration),

    #[error("retries exhausted, last failure: {0}")]
    RetriesExhausted(#[source] Box<FetchError>),

    #[error("fan-out slot could not be acquired")]
    SlotUnavailable,
}

#[derive(Clone, Debug)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub jitter: Duration,
    pub request_timeout: Duration,
}

impl RetryPolicy {
    /// Backoff before the attempt after failure `attempt_index` (0-based):
    /// `base * 2^attempt_index + random(0..=jitter)`.
    fn backoff(&self, attempt_index: u32) -> Duration {
        let exponential = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt_index));
        let jitter_ms = {
            let ceiling = self.jitter.as_millis() as u64;
            rand::thread_rng().gen_range(0..=ceiling)
        };
        exponential + Duration::from_millis(jitter_ms)
    }
}

impl From<&UpstreamConfig> for RetryPolicy {
    fn from(config: &UpstreamConfig) -> Self {
        RetryPolicy {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.base_delay_ms),
            jitter: Duration::from_millis(config.jitter_ms),
            request_timeout: config.request_timeout(),
        }
    }
}

#[derive(Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    policy: RetryPolicy,
}

impl Fetcher {
    pub fn new(policy: RetryPolicy) -> Self {
        Fetcher {
            client: reqwest::Client::new(),
            policy,
        }
    }

    /// GET the URL and decode the JSON body, retrying failed attempts up to
    /// the policy's limit. A non-2xx status and an elapsed per-attempt
    /// timeout both count as failed attempts, not terminal errors. Once
    /// retries are exhausted the error carries the last failure's cause.
    pub async fn fetch_json(&self, url: Url) -> Result<Value, FetchError> {
        let attempts = self.policy.max_retries.max(1);
        let mut failures = 0;
        loop {
            match self.attempt(url.clone()).await {
                Ok(value) => return Ok(value),
                Err(cause) => {
                    failures += 1;
                    if failures >= attempts {
                        counter!(UPSTREAM_FETCH_FAILED).increment(1);
                        return Err(FetchError::RetriesExhausted(Box::new(cause)));
                    }
                    counter!(UPSTREAM_RETRY).increment(1);
                    let delay = self.policy.backoff(failures - 1);
                    tracing::debug!(url = %url, attempt = failures, delay_ms = delay.as_millis() as u64, error = %cause, "retrying fetch");
                    sleep(delay).await;
                }
            }
        }
    }

    async fn attempt(&self, url: Url) -> Result<Value, FetchError> {
        let request = async {
            let response = self.client.get(url.clone()).send().await?;
            if !response.status().is_success() {
                return Err(FetchError::Status(response.status(), url));
            }
            Ok(response.json::<Value>().await?)
        };
        // The hard timeout covers the whole attempt; an aborted attempt is
        // just another failure for the retry loop.
        timeout(self.policy.request_timeout, request)
            .await
            .map_err(|_| FetchError::TimedOut(self.policy.request_timeout))?
    }

    /// Fetches every URL with at most `limit` requests in flight. The output
    /// is index-aligned with the input regardless of completion order; a slot
    /// whose fetch exhausted retries holds `Value::Null`, which downstream
    /// parsing reads as "no items".
    pub async fn fetch_many(&self, urls: Vec<Url>, limit: usize) -> Vec<Value> {
        let slots = Arc::new(Semaphore::new(limit.max(1)));
        let mut join_set = JoinSet::new();

        for (index, url) in urls.iter().cloned().enumerate() {
            let slots = slots.clone();
            let fetcher = self.clone();
            join_set.spawn(async move {
                let Ok(_permit) = slots.acquire_owned().await else {
                    return (index, Err(FetchError::SlotUnavailable));
                };
                let result = fetcher.fetch_json(url).await;
                (index, result)
            });
        }

        let mut results = vec![Value::Null; urls.len()];
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((index, Ok(value))) => results[index] = value,
                Ok((index, Err(error))) => {
                    tracing::warn!(slot = index, error = %error, "fan-out fetch failed");
                }
                Err(join_error) => {
                    tracing::error!(error = %join_error, "fan-out task panicked");
                }
            }
        }
        results
    }
}

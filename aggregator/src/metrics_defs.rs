//! Metrics definitions for the aggregator.

use shared::metrics_defs::{MetricDef, MetricType};

pub const CACHE_HIT: MetricDef = MetricDef {
    name: "cache.hit",
    metric_type: MetricType::Counter,
    description: "Number of reads served from the TTL cache",
};

pub const CACHE_MISS: MetricDef = MetricDef {
    name: "cache.miss",
    metric_type: MetricType::Counter,
    description: "Number of reads that missed the TTL cache",
};

pub const UPSTREAM_RETRY: MetricDef = MetricDef {
    name: "upstream.retry",
    metric_type: MetricType::Counter,
    description: "Number of fetch attempts retried after a failure",
};

pub const UPSTREAM_FETCH_FAILED: MetricDef = MetricDef {
    name: "upstream.fetch_failed",
    metric_type: MetricType::Counter,
    description: "Number of fetches that exhausted their retries",
};

pub const WARM_BATCH_RUNS: MetricDef = MetricDef {
    name: "warm.batch_runs",
    metric_type: MetricType::Counter,
    description: "Number of warm batch invocations",
};

pub const WARM_ITEMS_FETCHED: MetricDef = MetricDef {
    name: "warm.items_fetched",
    metric_type: MetricType::Counter,
    description: "Raw leaderboard rows fetched by warm batches",
};

// TODO: generate this list with a macro once the set stabilizes.
pub const ALL_METRICS: &[MetricDef] = &[
    CACHE_HIT,
    CACHE_MISS,
    UPSTREAM_RETRY,
    UPSTREAM_FETCH_FAILED,
    WARM_BATCH_RUNS,
    WARM_ITEMS_FETCHED,
];

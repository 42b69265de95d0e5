//! Aggregation core for the daily leaderboard ranking service.
//!
//! Pulls a third-party paginated leaderboard, partitioned by region and
//! weapon class, into a single deduplicated globally ranked list, and keeps
//! that aggregate warm in a daily-expiring cache.

pub mod api;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod fetch;
pub mod metrics_defs;
pub mod partitions;
pub mod query;
pub mod rank;
pub mod types;
pub mod upstream;
pub mod warm;

#[cfg(test)]
pub mod testutils;

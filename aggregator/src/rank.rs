//! Dedup and rank normalization.
//!
//! Weapon-class partition scans are lossy and inconsistent in page coverage,
//! so they cannot produce a trustworthy global rank on their own. The
//! unfiltered top-1000 feed is the source of truth for the head of the
//! distribution; scanned players outside it are ordered by their best
//! per-class rank with an alphabetic tie-break to guarantee total ordering.

use crate::types::{PlayerKey, PlayerRecord};
use indexmap::IndexMap;
use indexmap::map::Entry;
use std::collections::BTreeMap;

/// Bucket for records without a per-class rank; sorts after every real rank.
const MISSING_WEAPON_RANK: u32 = 999_999;

/// Merges raw partition scan results and the canonical top-1000 feed into
/// one uniquely-keyed list with contiguous ranks starting at 1.
///
/// Every feed player takes its 1-based feed position as rank; a scanned
/// duplicate of a feed player contributes its richer per-class fields but
/// keeps the feed position. Scanned players outside the feed are bucketed
/// by `weapon_type_rank`, alphabetized within each bucket, and ranked
/// sequentially after the feed group.
pub fn dedup_and_rank(scanned: Vec<PlayerRecord>, top_feed: Vec<PlayerRecord>) -> Vec<PlayerRecord> {
    let mut scanned = dedup_scanned(scanned);

    let mut head: IndexMap<PlayerKey, PlayerRecord> = IndexMap::new();
    for record in top_feed {
        let Some(key) = record.identity_key() else {
            continue;
        };
        head.entry(key).or_insert(record);
    }

    let mut output = Vec::with_capacity(head.len() + scanned.len());
    let mut rank = 0u32;

    for (key, feed_record) in head {
        rank += 1;
        let mut record = match scanned.shift_remove(&key) {
            Some(scan_record) => merge_feed_into_scan(scan_record, feed_record),
            None => feed_record,
        };
        record.rank = Some(rank);
        output.push(record);
    }

    let mut buckets: BTreeMap<u32, Vec<PlayerRecord>> = BTreeMap::new();
    for (_, record) in scanned {
        buckets
            .entry(record.weapon_type_rank.unwrap_or(MISSING_WEAPON_RANK))
            .or_default()
            .push(record);
    }

    for (_, mut bucket) in buckets {
        bucket.sort_by_cached_key(|record| {
            record
                .character_name
                .as_deref()
                .unwrap_or_default()
                .to_lowercase()
        });
        for mut record in bucket {
            rank += 1;
            record.rank = Some(rank);
            output.push(record);
        }
    }

    output
}

/// First-seen-ordered dedup of the scan results. On a key collision the
/// incoming record wins only with a strictly better (lower) per-class rank;
/// a missing rank compares as worst. Records that cannot form an identity
/// key are dropped.
fn dedup_scanned(records: Vec<PlayerRecord>) -> IndexMap<PlayerKey, PlayerRecord> {
    let mut deduped: IndexMap<PlayerKey, PlayerRecord> = IndexMap::new();
    for record in records {
        let Some(key) = record.identity_key() else {
            continue;
        };
        match deduped.entry(key) {
            Entry::Occupied(mut kept) => {
                let kept_rank = kept.get().weapon_type_rank.unwrap_or(MISSING_WEAPON_RANK);
                let incoming_rank = record.weapon_type_rank.unwrap_or(MISSING_WEAPON_RANK);
                if incoming_rank < kept_rank {
                    kept.insert(record);
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(record);
            }
        }
    }
    deduped
}

/// The scan record carries the per-class fields the unfiltered feed lacks;
/// the feed fills whatever the scan is missing.
fn merge_feed_into_scan(mut scan: PlayerRecord, feed: PlayerRecord) -> PlayerRecord {
    scan.score = scan.score.or(feed.score);
    scan.weapon_type = scan.weapon_type.or(feed.weapon_type);
    scan.weapon_type_rank = scan.weapon_type_rank.or(feed.weapon_type_rank);
    scan
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(region: i64, name: &str, weapon_rank: Option<u32>) -> PlayerRecord {
        PlayerRecord {
            region_id: Some(region),
            character_name: Some(name.into()),
            score: None,
            rank: None,
            weapon_type: None,
            weapon_type_rank: weapon_rank,
        }
    }

    fn assert_contiguous_ranks(items: &[PlayerRecord]) {
        for (i, item) in items.iter().enumerate() {
            assert_eq!(item.rank, Some(i as u32 + 1), "rank gap at index {i}");
        }
    }

    #[test]
    fn output_has_no_duplicate_identity_keys() {
        let scanned = vec![
            record(1, "Anya", Some(5)),
            record(1, "Anya", Some(9)),
            record(2, "Anya", Some(1)),
            record(1, "Brin", None),
        ];
        let ranked = dedup_and_rank(scanned, Vec::new());

        let mut keys: Vec<_> = ranked.iter().filter_map(PlayerRecord::identity_key).collect();
        let total = keys.len();
        keys.sort_by(|a, b| (a.region_id, &a.name).cmp(&(b.region_id, &b.name)));
        keys.dedup();
        assert_eq!(keys.len(), total);
        assert_eq!(ranked.len(), 3);
        assert_contiguous_ranks(&ranked);
    }

    #[test]
    fn collision_keeps_the_lower_weapon_rank() {
        let scanned = vec![record(1, "Anya", Some(9)), record(1, "Anya", Some(5))];
        let ranked = dedup_and_rank(scanned, Vec::new());
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].weapon_type_rank, Some(5));

        // First-seen wins when the incoming record is not strictly better.
        let scanned = vec![record(1, "Anya", Some(5)), record(1, "Anya", Some(5))];
        let ranked = dedup_and_rank(scanned, Vec::new());
        assert_eq!(ranked.len(), 1);
    }

    #[test]
    fn nfc_equivalent_names_collapse() {
        let scanned = vec![
            record(1, "R\u{e9}mi", Some(2)),
            record(1, "Re\u{301}mi", Some(7)),
        ];
        let ranked = dedup_and_rank(scanned, Vec::new());
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].weapon_type_rank, Some(2));
    }

    #[test]
    fn records_without_identity_are_dropped() {
        let mut no_name = record(1, "x", Some(1));
        no_name.character_name = None;
        let mut no_region = record(1, "y", Some(1));
        no_region.region_id = None;

        let ranked = dedup_and_rank(vec![no_name, no_region, record(1, "Kept", None)], Vec::new());
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].character_name.as_deref(), Some("Kept"));
    }

    #[test]
    fn feed_player_found_in_scan_keeps_feed_position() {
        // Feed position 42 must win over any rank derived from the tail.
        let top_feed: Vec<PlayerRecord> = (1..=100)
            .map(|i| record(1, &format!("feed-{i:03}"), None))
            .collect();
        let scanned = vec![
            record(1, "feed-042", Some(5)),
            record(1, "outsider", Some(1)),
        ];

        let ranked = dedup_and_rank(scanned, top_feed);
        let target = ranked
            .iter()
            .find(|r| r.character_name.as_deref() == Some("feed-042"))
            .unwrap();
        assert_eq!(target.rank, Some(42));
        // The scan's per-class fields survive the merge.
        assert_eq!(target.weapon_type_rank, Some(5));

        let outsider = ranked
            .iter()
            .find(|r| r.character_name.as_deref() == Some("outsider"))
            .unwrap();
        assert_eq!(outsider.rank, Some(101));
        assert_contiguous_ranks(&ranked);
    }

    #[test]
    fn tail_buckets_by_weapon_rank_then_alphabetizes() {
        let scanned = vec![
            record(1, "zeta", Some(2)),
            record(1, "alpha", Some(2)),
            record(1, "Midge", Some(1)),
            record(1, "nameless-rank", None),
            record(1, "Brave", Some(2)),
        ];
        let ranked = dedup_and_rank(scanned, Vec::new());
        let names: Vec<_> = ranked
            .iter()
            .map(|r| r.character_name.as_deref().unwrap())
            .collect();
        // Bucket 1 first, then bucket 2 case-insensitively alphabetized,
        // then the missing-rank sentinel bucket last.
        assert_eq!(names, vec!["Midge", "alpha", "Brave", "zeta", "nameless-rank"]);
        assert_contiguous_ranks(&ranked);
    }

    #[test]
    fn normalization_is_idempotent_including_on_its_own_output() {
        let top_feed: Vec<PlayerRecord> = (1..=10)
            .map(|i| record(1, &format!("top-{i:02}"), None))
            .collect();
        let scanned = vec![
            record(1, "top-03", Some(4)),
            record(2, "loner", Some(2)),
            record(2, "loner", Some(8)),
            record(3, "drifter", None),
        ];

        let first = dedup_and_rank(scanned.clone(), top_feed.clone());
        let second = dedup_and_rank(scanned, top_feed.clone());
        assert_eq!(first, second);

        let replayed = dedup_and_rank(first.clone(), top_feed);
        assert_eq!(first, replayed);
    }

    #[test]
    fn empty_inputs_produce_an_empty_ranking() {
        assert!(dedup_and_rank(Vec::new(), Vec::new()).is_empty());
    }
}

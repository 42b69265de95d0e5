use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

/// One row of the upstream leaderboard. Every field is optional because the
/// upstream payload drifts; rows that cannot form an identity key are dropped
/// during normalization rather than rejected at parse time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerRecord {
    #[serde(default)]
    pub region_id: Option<i64>,
    #[serde(default)]
    pub character_name: Option<String>,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub rank: Option<u32>,
    #[serde(default)]
    pub weapon_type: Option<i64>,
    #[serde(default)]
    pub weapon_type_rank: Option<u32>,
}

impl PlayerRecord {
    /// Identity key for deduplication: `(region, NFC-normalized name)`.
    /// Two names that differ only in combining-character representation
    /// collapse to the same key. `None` when either component is missing.
    pub fn identity_key(&self) -> Option<PlayerKey> {
        let region_id = self.region_id?;
        let name = self.character_name.as_deref()?;
        Some(PlayerKey {
            region_id,
            name: name.nfc().collect(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PlayerKey {
    pub region_id: i64,
    pub name: String,
}

/// The globally ranked, deduplicated list. Lives only as a cache value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalRanking {
    pub items: Vec<PlayerRecord>,
    pub computed_at: DateTime<Utc>,
}

impl CanonicalRanking {
    pub fn new(items: Vec<PlayerRecord>) -> Self {
        CanonicalRanking {
            items,
            computed_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_key_requires_region_and_name() {
        let record = PlayerRecord {
            region_id: None,
            character_name: Some("Anya".into()),
            score: None,
            rank: None,
            weapon_type: None,
            weapon_type_rank: None,
        };
        assert!(record.identity_key().is_none());

        let record = PlayerRecord {
            region_id: Some(1),
            character_name: None,
            ..record
        };
        assert!(record.identity_key().is_none());
    }

    #[test]
    fn identity_key_collapses_nfc_equivalent_names() {
        // "é" composed vs "e" + combining acute
        let composed = PlayerRecord {
            region_id: Some(1),
            character_name: Some("R\u{e9}mi".into()),
            score: None,
            rank: None,
            weapon_type: None,
            weapon_type_rank: None,
        };
        let decomposed = PlayerRecord {
            character_name: Some("Re\u{301}mi".into()),
            ..composed.clone()
        };
        assert_eq!(composed.identity_key(), decomposed.identity_key());
    }

    #[test]
    fn record_parses_from_camel_case_with_unknown_fields() {
        let raw = serde_json::json!({
            "regionId": 3,
            "characterName": "Kestrel",
            "weaponTypeRank": 12,
            "serverShard": "x1"
        });
        let record: PlayerRecord = serde_json::from_value(raw).unwrap();
        assert_eq!(record.region_id, Some(3));
        assert_eq!(record.weapon_type_rank, Some(12));
        assert_eq!(record.score, None);
    }
}

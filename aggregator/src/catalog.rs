//! Static metadata tables for the upstream ranking site.
//!
//! Region code 0 and the weapon category named "All" are aggregate views on
//! the upstream side, not queryable partitions, and are skipped by the
//! partition enumerator.

use serde::Serialize;

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Region {
    pub code: i64,
    pub name: &'static str,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeaponClass {
    pub id: i64,
    pub name: &'static str,
}

pub const REGIONS: &[Region] = &[
    Region { code: 0, name: "All" },
    Region { code: 1, name: "Asia" },
    Region { code: 2, name: "North America" },
    Region { code: 3, name: "Europe" },
    Region { code: 4, name: "South America" },
];

pub const WEAPON_CLASSES: &[WeaponClass] = &[
    WeaponClass { id: 0, name: "All" },
    WeaponClass { id: 1, name: "Sword & Shield" },
    WeaponClass { id: 2, name: "Greatsword" },
    WeaponClass { id: 3, name: "Dagger" },
    WeaponClass { id: 4, name: "Bow" },
    WeaponClass { id: 5, name: "Crossbow" },
    WeaponClass { id: 6, name: "Staff" },
    WeaponClass { id: 7, name: "Wand" },
];

pub const RANKING_TYPES: &[&str] = &["growth", "power"];

/// Payload served by the metadata endpoint.
pub fn metadata() -> serde_json::Value {
    serde_json::json!({
        "regions": REGIONS,
        "weaponTypes": WEAPON_CLASSES,
        "rankingTypes": RANKING_TYPES,
    })
}

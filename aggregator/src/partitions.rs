//! Partition enumeration and batch slicing.
//!
//! The warm scheduler slices the partition list by index, so enumeration
//! order must be deterministic: regions outer, weapon classes inner, both in
//! declared order.

use crate::catalog::{Region, WeaponClass};

/// One (region, weapon class) pair whose leaderboard pages are fetched
/// independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partition {
    pub region_code: i64,
    pub weapon_type: i64,
}

/// Ordered cross product of the non-sentinel regions and weapon classes.
/// Region code 0 and the weapon class named exactly "All" are aggregate
/// views upstream and are excluded.
pub fn enumerate(regions: &[Region], weapons: &[WeaponClass]) -> Vec<Partition> {
    let mut partitions = Vec::new();
    for region in regions {
        if region.code == 0 {
            continue;
        }
        for weapon in weapons {
            if weapon.name == "All" {
                continue;
            }
            partitions.push(Partition {
                region_code: region.code,
                weapon_type: weapon.id,
            });
        }
    }
    partitions
}

/// The full warmable partition universe from the static catalog.
pub fn universe() -> Vec<Partition> {
    enumerate(crate::catalog::REGIONS, crate::catalog::WEAPON_CLASSES)
}

/// `ceil(total_partitions / batch_size)`.
pub fn total_batches(total_partitions: usize, batch_size: usize) -> u32 {
    total_partitions.div_ceil(batch_size.max(1)) as u32
}

/// The 1-based batch `n`'s slice: `partitions[(n-1)*size .. n*size]`.
/// A batch number beyond the range yields an empty slice, which the
/// scheduler treats as a log-only condition.
pub fn batch_slice(partitions: &[Partition], batch: u32, batch_size: usize) -> &[Partition] {
    let size = batch_size.max(1);
    let start = (batch as usize - 1).saturating_mul(size);
    if start >= partitions.len() {
        return &[];
    }
    let end = (start + size).min(partitions.len());
    &partitions[start..end]
}

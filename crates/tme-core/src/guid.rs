//! Global tile id (GUID) range allocation.
//!
//! Every tileset used by a map owns a contiguous, 1-based range of global
//! ids. New tilesets go into the first gap large enough to hold them,
//! otherwise after the last range. Ranges are never moved or merged.

use serde::{Deserialize, Serialize};

/// Inclusive `[first, last]` range of global tile ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GuidRange {
    pub first: u32,
    pub last: u32,
}

impl GuidRange {
    pub const fn new(first: u32, last: u32) -> Self {
        Self { first, last }
    }

    /// Number of ids in the range.
    pub fn tile_count(&self) -> u32 {
        self.last.saturating_sub(self.first).saturating_add(1)
    }

    pub fn contains(&self, gid: u32) -> bool {
        (self.first..=self.last).contains(&gid)
    }

    pub fn overlaps(&self, other: &GuidRange) -> bool {
        self.first <= other.last && other.first <= self.last
    }

    /// Local (0-based) index of `gid` within this range.
    pub fn local_index(&self, gid: u32) -> Option<u32> {
        self.contains(gid).then(|| gid - self.first)
    }
}

/// Find where a new range of `tile_count` ids fits.
///
/// `existing` must be sorted by `first` and non-overlapping. The result is a
/// pure function of the inputs. `None` when no gap fits and the range would
/// run past `u32::MAX`.
#[must_use]
pub fn allocate(existing: &[GuidRange], tile_count: u32) -> Option<GuidRange> {
    let tile_count = tile_count.max(1);
    let Some(head) = existing.first() else {
        return Some(GuidRange::new(1, tile_count));
    };

    if head.first.saturating_sub(1) >= tile_count {
        return Some(GuidRange::new(head.first - tile_count, head.first - 1));
    }

    for pair in existing.windows(2) {
        let start = pair[0].last.saturating_add(1);
        if pair[1].first.saturating_sub(start) >= tile_count {
            return Some(GuidRange::new(start, start + (tile_count - 1)));
        }
    }

    let first = existing[existing.len() - 1].last.checked_add(1)?;
    let last = first.checked_add(tile_count - 1)?;
    Some(GuidRange::new(first, last))
}

/// Allocate ranges for tilesets in list order, starting from nothing.
/// Used when a stored map is loaded: its tileset order and tile counts
/// fully determine the id layout. `None` if the counts exceed the id space.
#[must_use]
pub fn assign_sequential(tile_counts: &[u32]) -> Option<Vec<GuidRange>> {
    let mut sorted: Vec<GuidRange> = Vec::with_capacity(tile_counts.len());
    let mut in_order = Vec::with_capacity(tile_counts.len());
    for &count in tile_counts {
        let range = allocate(&sorted, count)?;
        let at = sorted.partition_point(|r| r.first < range.first);
        sorted.insert(at, range);
        in_order.push(range);
    }
    Some(in_order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ranges(pairs: &[(u32, u32)]) -> Vec<GuidRange> {
        pairs.iter().map(|&(f, l)| GuidRange::new(f, l)).collect()
    }

    #[test]
    fn appends_when_no_gap_fits() {
        let r = ranges(&[(1, 15), (16, 99), (100, 179)]);
        assert_eq!(allocate(&r, 100), Some(GuidRange::new(180, 279)));
    }

    #[test]
    fn fills_gap_between_ranges() {
        let r = ranges(&[(1, 15), (80, 99), (100, 179)]);
        assert_eq!(allocate(&r, 30), Some(GuidRange::new(16, 45)));
    }

    #[test]
    fn fills_gap_before_first_range() {
        let r = ranges(&[(18, 45), (46, 99), (100, 179)]);
        assert_eq!(allocate(&r, 10), Some(GuidRange::new(8, 17)));
    }

    #[test]
    fn small_leading_gap_is_skipped() {
        assert_eq!(allocate(&ranges(&[(4, 10)]), 10), Some(GuidRange::new(11, 20)));
    }

    #[test]
    fn empty_starts_at_one() {
        assert_eq!(allocate(&[], 10), Some(GuidRange::new(1, 10)));
    }

    #[test]
    fn exact_fit_gap() {
        let r = ranges(&[(1, 10), (30, 40)]);
        assert_eq!(allocate(&r, 10), Some(GuidRange::new(11, 20)));
        assert_eq!(allocate(&r, 19), Some(GuidRange::new(11, 29)));
        assert_eq!(allocate(&r, 20), Some(GuidRange::new(41, 60)));
    }

    #[test]
    fn sequential_assignment_is_contiguous() {
        assert_eq!(
            assign_sequential(&[4, 16, 1]),
            Some(ranges(&[(1, 4), (5, 20), (21, 21)]))
        );
    }

    #[test]
    fn exhausted_id_space_has_no_range() {
        let full = ranges(&[(1, u32::MAX - 1)]);
        assert_eq!(allocate(&full, 1), Some(GuidRange::new(u32::MAX, u32::MAX)));
        assert_eq!(allocate(&full, 5), None);
        assert_eq!(allocate(&ranges(&[(1, u32::MAX)]), 1), None);
        assert_eq!(allocate(&ranges(&[(10, u32::MAX)]), 9), Some(GuidRange::new(1, 9)));
        assert_eq!(assign_sequential(&[u32::MAX, 1]), None);
        assert_eq!(GuidRange::new(1, u32::MAX).tile_count(), u32::MAX);
    }

    #[test]
    fn local_index() {
        let r = GuidRange::new(5, 20);
        assert_eq!(r.local_index(5), Some(0));
        assert_eq!(r.local_index(20), Some(15));
        assert_eq!(r.local_index(21), None);
        assert_eq!(r.tile_count(), 16);
    }
}

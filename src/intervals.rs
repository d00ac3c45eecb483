//! A small sorted-vector interval tree.
//!
//! The donor toolkit has no dependency on a dedicated interval-tree crate, so
//! this mirrors what every other structure in the crate does for ordered
//! lookups: keep a `Vec` sorted by start offset and binary-search it. Ranges
//! are half-open `[start, end)`, addressed by a `u32` (byte offset or virtual
//! address, depending on the caller).

use std::ops::Range;

#[derive(Debug, Clone)]
pub struct IntervalTree<V> {
    entries: Vec<(Range<u32>, V)>,
}

impl<V> Default for IntervalTree<V> {
    fn default() -> Self {
        Self { entries: Vec::new() }
    }
}

impl<V> IntervalTree<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Inserts `range -> value`, keeping entries sorted by start offset.
    /// Overlap is permitted; callers that need to reject it (§4.3's
    /// overlapping-member allow-list) check `overlaps` first.
    pub fn insert(&mut self, range: Range<u32>, value: V) {
        let pos = self.entries.partition_point(|(r, _)| r.start <= range.start);
        self.entries.insert(pos, (range, value));
    }

    /// True if `range` overlaps any interval already present.
    pub fn overlaps(&self, range: &Range<u32>) -> bool {
        self.entries
            .iter()
            .any(|(r, _)| r.start < range.end && range.start < r.end)
    }

    /// All entries whose range contains `point`.
    pub fn query_point(&self, point: u32) -> impl Iterator<Item = &(Range<u32>, V)> {
        self.entries.iter().filter(move |(r, _)| r.contains(&point))
    }

    /// The single entry enclosing `point`, preferring the first inserted when
    /// several overlap (union-like layouts, §4.3 access resolution).
    pub fn find_point(&self, point: u32) -> Option<&V> {
        self.query_point(point).next().map(|(_, v)| v)
    }

    /// All entries overlapping `range`.
    pub fn query_range(&self, range: Range<u32>) -> impl Iterator<Item = &(Range<u32>, V)> {
        self.entries
            .iter()
            .filter(move |(r, _)| r.start < range.end && range.start < r.end)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(Range<u32>, V)> {
        self.entries.iter()
    }

    /// True if the union of all intervals covers `[0, size)` without gaps.
    /// Used by the type-store invariant check (§8): a non-forward record's
    /// layout tree must cover its whole size.
    pub fn covers(&self, size: u32) -> bool {
        if size == 0 {
            return true;
        }
        let mut sorted: Vec<Range<u32>> = self.entries.iter().map(|(r, _)| r.clone()).collect();
        sorted.sort_by_key(|r| r.start);
        let mut cursor = 0u32;
        for r in sorted {
            if r.start > cursor {
                return false;
            }
            cursor = cursor.max(r.end);
            if cursor >= size {
                return true;
            }
        }
        cursor >= size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_query_prefers_first_insert() {
        let mut tree = IntervalTree::new();
        tree.insert(0..4, "first");
        tree.insert(0..4, "second");
        assert_eq!(tree.find_point(0), Some(&"first"));
    }

    #[test]
    fn covers_detects_gap() {
        let mut tree = IntervalTree::new();
        tree.insert(0..4, ());
        tree.insert(4..8, ());
        assert!(tree.covers(8));
        assert!(!tree.covers(9));

        let mut gapped = IntervalTree::new();
        gapped.insert(0..4, ());
        gapped.insert(6..8, ());
        assert!(!gapped.covers(8));
    }

    #[test]
    fn overlap_detection() {
        let mut tree = IntervalTree::new();
        tree.insert(0..4, ());
        assert!(tree.overlaps(&(2..6)));
        assert!(!tree.overlaps(&(4..6)));
    }
}

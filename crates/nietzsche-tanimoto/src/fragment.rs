//! Per-shard candidate supply: the rank cache and row lookup of one frame.
//!
//! A [`Fragment`] is the slice of one frame that lives on one shard. The
//! scoring engine needs two things from it: the cache's ordered list of
//! "likely large" rows ([`Fragment::top`]) and the bits of a given row
//! ([`Fragment::row`]). [`MemoryFragment`] is an in-memory implementation over
//! [`RoaringBitmap`] rows whose cache is kept sorted by descending cardinality.

use std::collections::BTreeMap;

use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};

use crate::config::DEFAULT_CACHE_SIZE;
use crate::error::TanimotoError;
use crate::set::SetHandle;

/// Identifier of a row within a frame, consistent across shards.
pub type RowId = u64;

/// A row proposed by the rank cache, with its shard-local cardinality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowCandidate {
    pub row_id: RowId,
    pub cardinality: u64,
}

/// Candidate supplier and row storage of one frame on one shard.
pub trait Fragment {
    type Set: SetHandle;

    /// Cache-ordered candidates (descending cardinality by convention).
    fn top(&self) -> Vec<RowCandidate>;

    /// The bits of `row_id` on this shard; an absent row is the empty set.
    fn row(&self, row_id: RowId) -> Result<Self::Set, TanimotoError>;
}

// ─────────────────────────────────────────────
// MemoryFragment
// ─────────────────────────────────────────────

/// In-memory fragment: rows as Roaring bitmaps plus a bounded rank cache.
#[derive(Debug, Clone)]
pub struct MemoryFragment {
    rows: BTreeMap<RowId, RoaringBitmap>,
    cache: Vec<RowCandidate>,
    cache_size: usize,
    dirty: bool,
}

impl Default for MemoryFragment {
    fn default() -> Self {
        Self::with_cache_size(DEFAULT_CACHE_SIZE)
    }
}

impl MemoryFragment {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fragment whose rank cache keeps at most `cache_size` rows.
    pub fn with_cache_size(cache_size: usize) -> Self {
        Self {
            rows: BTreeMap::new(),
            cache: Vec::new(),
            cache_size,
            dirty: false,
        }
    }

    /// Set bit `column` (shard-local) on `row_id`. Returns `true` if it was unset.
    pub fn set_bit(&mut self, row_id: RowId, column: u32) -> bool {
        let changed = self.rows.entry(row_id).or_default().insert(column);
        self.dirty |= changed;
        changed
    }

    /// Replace the bits of `row_id`.
    pub fn insert_row(&mut self, row_id: RowId, bits: RoaringBitmap) {
        self.rows.insert(row_id, bits);
        self.dirty = true;
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Borrow a row's bits without cloning.
    pub fn row_ref(&self, row_id: RowId) -> Option<&RoaringBitmap> {
        self.rows.get(&row_id)
    }

    /// Rebuild the rank cache after writes. [`Fragment::top`] falls back to
    /// ranking on the fly while the cache is stale, so fragments shared
    /// across threads should be refreshed once after loading.
    pub fn recalculate_cache(&mut self) {
        self.cache = rank_rows(&self.rows, self.cache_size);
        self.dirty = false;
    }

    /// Builder form of [`recalculate_cache`](Self::recalculate_cache).
    pub fn refreshed(mut self) -> Self {
        self.recalculate_cache();
        self
    }
}

/// Non-empty rows, largest first; row id keeps equal counts in a stable order.
fn rank_rows(rows: &BTreeMap<RowId, RoaringBitmap>, cache_size: usize) -> Vec<RowCandidate> {
    let mut ranked: Vec<RowCandidate> = rows
        .iter()
        .filter(|(_, bits)| !bits.is_empty())
        .map(|(&row_id, bits)| RowCandidate { row_id, cardinality: bits.len() })
        .collect();
    ranked.sort_by(|a, b| b.cardinality.cmp(&a.cardinality).then(a.row_id.cmp(&b.row_id)));
    ranked.truncate(cache_size);
    ranked
}

impl Fragment for MemoryFragment {
    type Set = RoaringBitmap;

    fn top(&self) -> Vec<RowCandidate> {
        if self.dirty {
            return rank_rows(&self.rows, self.cache_size);
        }
        self.cache.clone()
    }

    fn row(&self, row_id: RowId) -> Result<RoaringBitmap, TanimotoError> {
        Ok(self.rows.get(&row_id).cloned().unwrap_or_default())
    }
}

impl FromIterator<(RowId, RoaringBitmap)> for MemoryFragment {
    fn from_iter<I: IntoIterator<Item = (RowId, RoaringBitmap)>>(iter: I) -> Self {
        let mut frag = MemoryFragment::new();
        for (row_id, bits) in iter {
            frag.insert_row(row_id, bits);
        }
        frag.refreshed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bits(range: std::ops::Range<u32>) -> RoaringBitmap {
        range.collect()
    }

    #[test]
    fn top_is_sorted_by_descending_cardinality() {
        let frag: MemoryFragment = [(1, bits(0..5)), (2, bits(0..20)), (3, bits(0..10))]
            .into_iter()
            .collect();
        let ids: Vec<RowId> = frag.top().iter().map(|c| c.row_id).collect();
        assert_eq!(ids, vec![2, 3, 1]);
        assert_eq!(frag.top()[0].cardinality, 20);
    }

    #[test]
    fn cache_respects_size_and_skips_empty_rows() {
        let mut frag = MemoryFragment::with_cache_size(2);
        frag.insert_row(1, bits(0..3));
        frag.insert_row(2, bits(0..2));
        frag.insert_row(3, bits(0..1));
        frag.insert_row(4, RoaringBitmap::new());
        frag.recalculate_cache();
        let ids: Vec<RowId> = frag.top().iter().map(|c| c.row_id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn stale_cache_is_recomputed_on_read() {
        let mut frag = MemoryFragment::new();
        frag.set_bit(9, 1);
        frag.set_bit(9, 2);
        assert!(!frag.set_bit(9, 2), "setting an existing bit is a no-op");
        let top = frag.top();
        assert_eq!(top, vec![RowCandidate { row_id: 9, cardinality: 2 }]);
    }

    #[test]
    fn missing_row_is_empty() {
        let frag = MemoryFragment::new();
        assert!(frag.row(42).unwrap().is_empty());
    }
}

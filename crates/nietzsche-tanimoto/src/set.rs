//! The bit-set capability consumed by the scoring engine and the reducer.
//!
//! The scoring loop only ever asks two questions of a row: how many bits it
//! has and how many it shares with the source. The reducer additionally needs
//! to union source sets coming back from different shards. Anything that can
//! answer those three can be scored, which keeps the storage encoding out of
//! this crate.

use roaring::RoaringBitmap;

/// Read-only bit-set handle.
///
/// Implementations must satisfy `intersection_count(a, b) <= min(|a|, |b|)`;
/// the pruning bounds in [`crate::scoring`] rely on it.
pub trait SetHandle: Clone + Send + Sync {
    /// Number of set bits.
    fn cardinality(&self) -> u64;

    /// Number of bits set in both `self` and `other`.
    fn intersection_count(&self, other: &Self) -> u64;

    /// A new set holding every bit of `self` and `other`.
    fn union(&self, other: &Self) -> Self;

    /// The empty set, used for rows a shard does not hold.
    fn empty() -> Self;
}

impl SetHandle for RoaringBitmap {
    #[inline]
    fn cardinality(&self) -> u64 {
        self.len()
    }

    #[inline]
    fn intersection_count(&self, other: &Self) -> u64 {
        self.intersection_len(other)
    }

    fn union(&self, other: &Self) -> Self {
        self | other
    }

    fn empty() -> Self {
        RoaringBitmap::new()
    }
}

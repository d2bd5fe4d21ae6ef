//! Bounded Top-K selection over accepted rows.
//!
//! A min-heap (via `Reverse`) keeps the current worst retained row at the
//! root. When the selector is full, a newcomer replaces the root only if it
//! ranks strictly higher, so among equal keys the earliest arrivals are kept.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use crate::params::RankBy;
use crate::scoring::SimilarityResult;

/// How rows with equal rank keys are ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TieBreak {
    /// Earlier pushes rank higher (within one shard: candidate-cache order).
    Arrival,
    /// Lower row ids rank higher. Used across shards, where arrival order
    /// depends on scheduling.
    RowId,
}

// ─────────────────────────────────────────────
// Heap entry
// ─────────────────────────────────────────────

#[derive(Debug, Clone)]
struct Ranked {
    key: u64,
    tie: u64,
    result: SimilarityResult,
}

impl PartialEq for Ranked {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Ranked {}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ranked {
    fn cmp(&self, other: &Self) -> Ordering {
        // Greater = ranks higher. A lower tie value wins.
        self.key
            .cmp(&other.key)
            .then_with(|| other.tie.cmp(&self.tie))
            .then_with(|| self.result.score.cmp(&other.result.score))
            .then_with(|| self.result.cardinality.cmp(&other.result.cardinality))
    }
}

// ─────────────────────────────────────────────
// TopK
// ─────────────────────────────────────────────

/// Keeps the `limit` highest-ranked rows (all rows when `limit` is `None`).
#[derive(Debug, Clone)]
pub struct TopK {
    limit: Option<usize>,
    rank_by: RankBy,
    tie_break: TieBreak,
    heap: BinaryHeap<Reverse<Ranked>>,
    arrivals: u64,
}

impl TopK {
    pub fn new(limit: Option<usize>, rank_by: RankBy) -> Self {
        Self::with_tie_break(limit, rank_by, TieBreak::Arrival)
    }

    pub fn with_tie_break(limit: Option<usize>, rank_by: RankBy, tie_break: TieBreak) -> Self {
        let capacity = limit.map(|k| k + 1).unwrap_or(0);
        Self {
            limit,
            rank_by,
            tie_break,
            heap: BinaryHeap::with_capacity(capacity),
            arrivals: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Offer a row. Returns `true` if it is retained (for now).
    pub fn push(&mut self, result: SimilarityResult) -> bool {
        let tie = match self.tie_break {
            TieBreak::Arrival => self.arrivals,
            TieBreak::RowId => result.row_id,
        };
        self.arrivals += 1;

        let key = match self.rank_by {
            RankBy::Cardinality => result.cardinality,
            RankBy::Score => result.score,
        };
        let entry = Ranked { key, tie, result };

        match self.limit {
            Some(0) => false,
            Some(limit) if self.heap.len() >= limit => {
                let beats_worst = match self.heap.peek() {
                    Some(Reverse(worst)) => entry > *worst,
                    None => true,
                };
                if beats_worst {
                    self.heap.pop();
                    self.heap.push(Reverse(entry));
                }
                beats_worst
            }
            _ => {
                self.heap.push(Reverse(entry));
                true
            }
        }
    }

    /// Retained rows, highest rank first.
    pub fn into_sorted_vec(self) -> Vec<SimilarityResult> {
        // Ascending order of `Reverse<_>` is descending rank.
        self.heap
            .into_sorted_vec()
            .into_iter()
            .map(|Reverse(r)| r.result)
            .collect()
    }
}

impl Extend<SimilarityResult> for TopK {
    fn extend<I: IntoIterator<Item = SimilarityResult>>(&mut self, iter: I) {
        for result in iter {
            self.push(result);
        }
    }
}

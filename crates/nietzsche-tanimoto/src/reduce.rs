//! Cross-shard reduction of per-shard values.
//!
//! Every value a Map step (or a delegated sub-query) can produce is one
//! variant of [`ReduceValue`]. [`reduce`] folds a new value into the running
//! accumulator with one rule per variant:
//!
//! | Variant    | Fold                                               |
//! |------------|----------------------------------------------------|
//! | `BitSet`   | set union                                          |
//! | `Scalar`   | last value wins                                    |
//! | `Ranked`   | Top-K over both lists, row-id tie break            |
//! | `Partials` | per-row sums of cardinality and intersection       |
//!
//! All four folds are associative and commutative, so the result does not
//! depend on shard arrival order. A value whose variant differs from the
//! accumulator's replaces it, and the mismatch is logged.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::fragment::RowId;
use crate::params::RankBy;
use crate::scoring::{judge, SimilarityResult, TanimotoBounds, Verdict};
use crate::set::SetHandle;
use crate::topk::{TieBreak, TopK};

// ─────────────────────────────────────────────
// Partial tallies (aggregate mode)
// ─────────────────────────────────────────────

/// Shard-local counts for one row; summed across shards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowTally {
    pub cardinality: u64,
    pub intersection: u64,
}

impl RowTally {
    fn absorb(&mut self, other: RowTally) {
        self.cardinality = self.cardinality.saturating_add(other.cardinality);
        self.intersection = self.intersection.saturating_add(other.intersection);
    }
}

/// Raw tallies of one or more shards, awaiting global scoring.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateBatch {
    /// Source-set cardinality summed over the shards folded in so far.
    pub source_count: u64,
    rows: BTreeMap<RowId, RowTally>,
}

impl CandidateBatch {
    pub fn new(source_count: u64) -> Self {
        Self { source_count, rows: BTreeMap::new() }
    }

    /// Add a tally, summing with any existing tally for the same row.
    pub fn add(&mut self, row_id: RowId, tally: RowTally) {
        self.rows.entry(row_id).or_default().absorb(tally);
    }

    pub fn get(&self, row_id: RowId) -> Option<&RowTally> {
        self.rows.get(&row_id)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (RowId, &RowTally)> {
        self.rows.iter().map(|(id, t)| (*id, t))
    }

    /// Fold another shard's batch into this one.
    pub fn merge(mut self, other: CandidateBatch) -> Self {
        self.source_count = self.source_count.saturating_add(other.source_count);
        for (row_id, tally) in other.rows {
            self.add(row_id, tally);
        }
        self
    }

    /// Global scoring: bound test, exact score and threshold on the summed
    /// counts, then ranking. A zero threshold reports nothing.
    pub fn finalize(&self, threshold: u64, limit: Option<usize>, rank_by: RankBy) -> Vec<SimilarityResult> {
        if threshold == 0 {
            return Vec::new();
        }
        let bounds = TanimotoBounds::new(self.source_count, threshold);
        let mut top = TopK::with_tie_break(limit, rank_by, TieBreak::RowId);

        for (&row_id, tally) in &self.rows {
            if !bounds.admits(tally.cardinality) {
                continue;
            }
            if let Verdict::Accepted(score) =
                judge(tally.intersection, self.source_count, tally.cardinality, threshold)
            {
                top.push(SimilarityResult { row_id, cardinality: tally.cardinality, score });
            }
        }

        top.into_sorted_vec()
    }
}

// ─────────────────────────────────────────────
// Ranked results (local mode)
// ─────────────────────────────────────────────

/// Accepted rows of one or more shards, already ranked and capped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedResults {
    pub rank_by: RankBy,
    pub limit: Option<usize>,
    /// Highest rank first.
    pub results: Vec<SimilarityResult>,
}

impl RankedResults {
    pub fn merge(self, other: RankedResults) -> Self {
        let limit = match (self.limit, other.limit) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        if self.rank_by != other.rank_by {
            warn!(left = %self.rank_by, right = %other.rank_by, "merging results ranked by different keys");
        }
        let mut top = TopK::with_tie_break(limit, self.rank_by, TieBreak::RowId);
        top.extend(self.results);
        top.extend(other.results);
        Self { rank_by: self.rank_by, limit, results: top.into_sorted_vec() }
    }
}

// ─────────────────────────────────────────────
// ReduceValue
// ─────────────────────────────────────────────

/// A per-shard value travelling through the reducer.
#[derive(Debug, Clone, PartialEq)]
pub enum ReduceValue<S> {
    /// A bit-set, e.g. the resolved source set of a cross-shard sub-query.
    BitSet(S),
    /// A count produced by a delegated sub-query.
    Scalar(u64),
    /// Local-mode Tanimoto output.
    Ranked(RankedResults),
    /// Aggregate-mode Tanimoto output.
    Partials(CandidateBatch),
}

impl<S> ReduceValue<S> {
    pub fn kind(&self) -> &'static str {
        match self {
            ReduceValue::BitSet(_)   => "bitset",
            ReduceValue::Scalar(_)   => "scalar",
            ReduceValue::Ranked(_)   => "ranked results",
            ReduceValue::Partials(_) => "partial tallies",
        }
    }
}

/// Fold `next` into the accumulator `prev`.
pub fn reduce<S: SetHandle>(prev: Option<ReduceValue<S>>, next: ReduceValue<S>) -> ReduceValue<S> {
    let prev = match prev {
        Some(p) => p,
        None => return next,
    };

    match (prev, next) {
        (ReduceValue::BitSet(a), ReduceValue::BitSet(b)) => ReduceValue::BitSet(a.union(&b)),
        (_, ReduceValue::Scalar(x)) => ReduceValue::Scalar(x),
        (ReduceValue::Ranked(a), ReduceValue::Ranked(b)) => ReduceValue::Ranked(a.merge(b)),
        (ReduceValue::Partials(a), ReduceValue::Partials(b)) => ReduceValue::Partials(a.merge(b)),
        (prev, next) => {
            warn!(accumulated = prev.kind(), incoming = next.kind(), "reduce variant mismatch, keeping incoming value");
            next
        }
    }
}

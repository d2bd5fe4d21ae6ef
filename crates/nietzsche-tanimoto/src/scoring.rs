//! Pruning & scoring: bound tests first, exact Tanimoto score second.
//!
//! For a source set of cardinality `S` and a candidate row of cardinality `C`
//! sharing `I` bits with it, the Tanimoto coefficient is
//!
//! ```text
//! T = I / (S + C − I)
//! ```
//!
//! Because `I ≤ min(S, C)`, `T ≤ C/S` when `C ≤ S` and `T ≤ S/C` when `C ≥ S`.
//! A candidate with `C ≤ S·t/100` or `C ≥ S·100/t` therefore cannot score
//! above `t` percent whatever its overlap, and is dropped before paying for
//! the intersection.
//!
//! ## Per-candidate pipeline
//!
//! 1. bound test: outside `(minBound, maxBound)` → pruned
//! 2. `I = intersection_count(source, row)`
//! 3. `I == 0` → disjoint
//! 4. `T = ceil(I·100 / (C + S − I))`
//! 5. `T ≤ t` → below threshold (the threshold is exclusive)
//! 6. accepted
//!
//! Candidates are visited in supplier order; nothing is reordered or
//! deduplicated here. Ranking belongs to [`crate::topk`].

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::context::QueryContext;
use crate::error::TanimotoError;
use crate::fragment::{Fragment, RowCandidate, RowId};
use crate::params::MAX_THRESHOLD;
use crate::reduce::{CandidateBatch, RowTally};
use crate::set::SetHandle;

// ─────────────────────────────────────────────
// Result type
// ─────────────────────────────────────────────

/// A row whose exact Tanimoto percentage strictly exceeds the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimilarityResult {
    pub row_id: RowId,
    /// Row cardinality (shard-local in local mode, global in aggregate mode).
    pub cardinality: u64,
    /// `ceil(100·I / |A ∪ B|)`.
    pub score: u64,
}

// ─────────────────────────────────────────────
// Bounds and exact score
// ─────────────────────────────────────────────

/// Necessary-condition cardinality window for one source set and threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TanimotoBounds {
    source_count: u64,
    threshold: u64,
    /// `S·t/100`; candidates at or below it are pruned.
    pub min: f64,
    /// `S·100/t`; candidates at or above it are pruned.
    pub max: f64,
}

impl TanimotoBounds {
    /// `threshold` must be in `1..=100`; callers skip scoring when it is 0.
    pub fn new(source_count: u64, threshold: u64) -> Self {
        debug_assert!(threshold > 0 && threshold <= MAX_THRESHOLD);
        let t = threshold.max(1);
        Self {
            source_count,
            threshold: t,
            min: (source_count as f64 * t as f64) / 100.0,
            max: (source_count as f64 * 100.0) / t as f64,
        }
    }

    /// Whether a candidate of cardinality `c` may still exceed the threshold.
    ///
    /// Evaluated as `100·c > S·t` and `c·t < 100·S` in integer arithmetic,
    /// the same predicate as `min < c < max` without float rounding.
    #[inline]
    pub fn admits(&self, cardinality: u64) -> bool {
        let c = cardinality as u128;
        let s = self.source_count as u128;
        let t = self.threshold as u128;
        c * 100 > s * t && c * t < s * 100
    }

    pub fn source_count(&self) -> u64 {
        self.source_count
    }
}

/// Exact Tanimoto percentage, rounded up: `ceil(I·100 / (C + S − I))`.
///
/// Returns 0 for two empty sets.
#[inline]
pub fn tanimoto_percent(intersection: u64, source_count: u64, cardinality: u64) -> u64 {
    let i = intersection as u128;
    let union = (source_count as u128 + cardinality as u128).saturating_sub(i);
    if union == 0 {
        return 0;
    }
    ((i * 100 + union - 1) / union) as u64
}

// ─────────────────────────────────────────────
// Verdicts and counters
// ─────────────────────────────────────────────

/// Outcome of the pipeline for one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Outside the bound window; no intersection computed.
    Pruned,
    /// No shared bits.
    Disjoint,
    /// Exact score at or below the threshold.
    BelowThreshold(u64),
    /// Exact score strictly above the threshold.
    Accepted(u64),
}

/// Per-shard counters, reported at debug level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScoringStats {
    pub examined: u64,
    pub pruned: u64,
    pub disjoint: u64,
    pub below_threshold: u64,
    pub accepted: u64,
}

impl ScoringStats {
    fn record(&mut self, verdict: Verdict) {
        self.examined += 1;
        match verdict {
            Verdict::Pruned => self.pruned += 1,
            Verdict::Disjoint => self.disjoint += 1,
            Verdict::BelowThreshold(_) => self.below_threshold += 1,
            Verdict::Accepted(_) => self.accepted += 1,
        }
    }
}

// ─────────────────────────────────────────────
// ScoringEngine
// ─────────────────────────────────────────────

/// Scores candidates of one shard against one source set.
#[derive(Debug)]
pub struct ScoringEngine<'a, S: SetHandle> {
    source: &'a S,
    bounds: TanimotoBounds,
    threshold: u64,
    cancel_check_interval: usize,
}

impl<'a, S: SetHandle> ScoringEngine<'a, S> {
    pub fn new(source: &'a S, threshold: u64) -> Self {
        Self {
            source,
            bounds: TanimotoBounds::new(source.cardinality(), threshold),
            threshold,
            cancel_check_interval: crate::config::DEFAULT_CANCEL_CHECK_INTERVAL,
        }
    }

    /// Check for cancellation every `interval` candidates (min 1).
    pub fn with_cancel_check_interval(mut self, interval: usize) -> Self {
        self.cancel_check_interval = interval.max(1);
        self
    }

    pub fn bounds(&self) -> &TanimotoBounds {
        &self.bounds
    }

    /// Steps 3–6 for a candidate that passed the bound test.
    #[inline]
    pub fn judge(&self, cardinality: u64, intersection: u64) -> Verdict {
        judge(intersection, self.bounds.source_count(), cardinality, self.threshold)
    }

    /// Full pipeline for one candidate whose row bits are already at hand.
    pub fn evaluate(&self, candidate: &RowCandidate, row: &S) -> Verdict {
        if !self.bounds.admits(candidate.cardinality) {
            return Verdict::Pruned;
        }
        self.judge(candidate.cardinality, self.source.intersection_count(row))
    }

    /// Run the pipeline over `candidates` in order, fetching rows from
    /// `fragment` only for candidates inside the bound window.
    ///
    /// Returns the accepted rows in candidate order, plus the counters.
    ///
    /// # Errors
    ///
    /// [`TanimotoError::Cancelled`] if `ctx` is cancelled mid-loop, or a
    /// storage error from [`Fragment::row`].
    pub fn score<F>(
        &self,
        ctx: &QueryContext,
        fragment: &F,
        candidates: &[RowCandidate],
    ) -> Result<(Vec<SimilarityResult>, ScoringStats), TanimotoError>
    where
        F: Fragment<Set = S>,
    {
        let mut stats = ScoringStats::default();
        let mut accepted = Vec::new();

        for (n, candidate) in candidates.iter().enumerate() {
            if n % self.cancel_check_interval == 0 {
                ctx.check()?;
            }

            if !self.bounds.admits(candidate.cardinality) {
                stats.record(Verdict::Pruned);
                continue;
            }

            let verdict = self.evaluate(candidate, &fragment.row(candidate.row_id)?);
            stats.record(verdict);

            if let Verdict::Accepted(score) = verdict {
                accepted.push(SimilarityResult {
                    row_id: candidate.row_id,
                    cardinality: candidate.cardinality,
                    score,
                });
            }
        }

        debug!(
            source_count = self.bounds.source_count(),
            threshold = self.threshold,
            min_bound = self.bounds.min,
            max_bound = self.bounds.max,
            examined = stats.examined,
            pruned = stats.pruned,
            disjoint = stats.disjoint,
            below_threshold = stats.below_threshold,
            accepted = stats.accepted,
            "tanimoto shard scored"
        );

        Ok((accepted, stats))
    }

    /// First phase of aggregate scoring: record raw `(cardinality,
    /// intersection)` tallies for every candidate.
    ///
    /// No bound test runs here. A row's shard-local cardinality says nothing
    /// about its global one, and dropping one shard's share would understate
    /// the row's global cardinality; the bounds are applied to the summed
    /// counts in [`CandidateBatch::finalize`]. Zero intersections are kept
    /// for the same reason.
    pub fn tally<F>(
        &self,
        ctx: &QueryContext,
        fragment: &F,
        candidates: &[RowCandidate],
    ) -> Result<CandidateBatch, TanimotoError>
    where
        F: Fragment<Set = S>,
    {
        let mut batch = CandidateBatch::new(self.bounds.source_count());

        for (n, candidate) in candidates.iter().enumerate() {
            if n % self.cancel_check_interval == 0 {
                ctx.check()?;
            }
            let row = fragment.row(candidate.row_id)?;
            batch.add(
                candidate.row_id,
                RowTally {
                    cardinality: candidate.cardinality,
                    intersection: self.source.intersection_count(&row),
                },
            );
        }

        debug!(
            source_count = self.bounds.source_count(),
            tallied = batch.len(),
            "tanimoto shard tallied"
        );

        Ok(batch)
    }
}

/// Steps 3–6 of the pipeline on precomputed counts.
#[inline]
pub fn judge(intersection: u64, source_count: u64, cardinality: u64, threshold: u64) -> Verdict {
    if intersection == 0 {
        return Verdict::Disjoint;
    }
    let score = tanimoto_percent(intersection, source_count, cardinality);
    if score <= threshold {
        Verdict::BelowThreshold(score)
    } else {
        Verdict::Accepted(score)
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

//! The `Tanimoto` call: Map per shard, Reduce across shards, Finish globally.
//!
//! ```text
//! Tanimoto(<source call>, frame="stargazer", threshold=70 [, limit=10]
//!          [, mode="local"|"aggregate"] [, rankBy="cardinality"|"score"])
//! ```
//!
//! ## Map (one shard)
//!
//! 1. validate arguments (nothing is evaluated on failure)
//! 2. resolve the source set by evaluating the first child on this shard
//! 3. fetch the candidate frame's fragment and its rank-cache candidates
//! 4. `local`: score and rank ([`ReduceValue::Ranked`]);
//!    `aggregate`: tally every candidate ([`ReduceValue::Partials`])
//!
//! A threshold of 0 (or below) requests no filtering: Map still resolves the
//! source and the frame, then reports no rows.
//!
//! ## Reduce / Finish
//!
//! Per-shard values fold through [`crate::reduce::reduce`]. [`TanimotoPlugin::finish`]
//! turns the folded value into the final ranked list; in aggregate mode that
//! is where scoring happens, on the summed counts.

use std::time::Instant;

use tracing::{debug, info, warn};

use crate::call::Call;
use crate::config::TanimotoConfig;
use crate::context::QueryContext;
use crate::error::TanimotoError;
use crate::executor::ShardExecutor;
use crate::fragment::Fragment;
use crate::params::{QueryParameters, ScoringMode};
use crate::reduce::{self, CandidateBatch, RankedResults, ReduceValue};
use crate::scoring::{ScoringEngine, SimilarityResult};
use crate::set::SetHandle;
use crate::topk::TopK;

/// Tanimoto similarity search over the shards of one [`ShardExecutor`].
pub struct TanimotoPlugin<'e, E: ShardExecutor> {
    executor: &'e E,
    config: TanimotoConfig,
}

impl<'e, E: ShardExecutor> TanimotoPlugin<'e, E> {
    /// A plugin using [`TanimotoConfig::default`].
    pub fn new(executor: &'e E) -> Self {
        Self::with_config(executor, TanimotoConfig::default())
    }

    pub fn with_config(executor: &'e E, config: TanimotoConfig) -> Self {
        Self { executor, config }
    }

    pub fn config(&self) -> &TanimotoConfig {
        &self.config
    }

    /// Validate the call's arguments.
    pub fn parameters(&self, call: &Call) -> Result<QueryParameters, TanimotoError> {
        QueryParameters::from_call(call, &self.config)
    }

    // ─────────────────────────────────────────────
    // Map
    // ─────────────────────────────────────────────

    /// Evaluate the call on one shard.
    ///
    /// # Errors
    ///
    /// Argument errors before anything is evaluated, [`TanimotoError::MissingChild`]
    /// / [`TanimotoError::UnexpectedValue`] for a bad source call, errors of the
    /// delegated evaluation verbatim, and [`TanimotoError::Cancelled`].
    pub fn map(
        &self,
        ctx: &QueryContext,
        index: &str,
        call: &Call,
        shard: u64,
    ) -> Result<ReduceValue<E::Set>, TanimotoError> {
        let params = self.parameters(call)?;
        self.map_with(ctx, index, call, &params, shard)
    }

    fn map_with(
        &self,
        ctx: &QueryContext,
        index: &str,
        call: &Call,
        params: &QueryParameters,
        shard: u64,
    ) -> Result<ReduceValue<E::Set>, TanimotoError> {
        ctx.check()?;

        let source = self.resolve_source(ctx, index, call, shard)?;
        let fragment = self.executor.fragment(index, &params.frame, shard)?;

        if !params.scores() {
            debug!(shard, frame = %params.frame, "tanimoto threshold is 0, nothing scored");
            return Ok(match params.mode {
                ScoringMode::Local => ReduceValue::Ranked(RankedResults {
                    rank_by: params.rank_by,
                    limit: params.limit,
                    results: Vec::new(),
                }),
                ScoringMode::Aggregate => ReduceValue::Partials(CandidateBatch::new(source.cardinality())),
            });
        }

        let engine = ScoringEngine::new(&source, params.threshold)
            .with_cancel_check_interval(self.config.cancel_check_interval);

        match params.mode {
            ScoringMode::Local => {
                let mut top = TopK::new(params.limit, params.rank_by);
                if let Some(fragment) = fragment {
                    let candidates = fragment.top();
                    let (accepted, stats) = engine.score(ctx, fragment, &candidates)?;
                    debug!(shard, frame = %params.frame, accepted = stats.accepted, "tanimoto map");
                    top.extend(accepted);
                }
                Ok(ReduceValue::Ranked(RankedResults {
                    rank_by: params.rank_by,
                    limit: params.limit,
                    results: top.into_sorted_vec(),
                }))
            }
            ScoringMode::Aggregate => {
                let batch = match fragment {
                    Some(fragment) => engine.tally(ctx, fragment, &fragment.top())?,
                    None => CandidateBatch::new(source.cardinality()),
                };
                debug!(shard, frame = %params.frame, tallied = batch.len(), "tanimoto map (aggregate)");
                Ok(ReduceValue::Partials(batch))
            }
        }
    }

    /// Evaluate the first child on `shard`; it must yield a bit-set.
    fn resolve_source(
        &self,
        ctx: &QueryContext,
        index: &str,
        call: &Call,
        shard: u64,
    ) -> Result<E::Set, TanimotoError> {
        let child = call
            .children
            .first()
            .ok_or_else(|| TanimotoError::MissingChild(call.name.clone()))?;

        match self.executor.execute_call_shard(ctx, index, child, shard)? {
            ReduceValue::BitSet(set) => Ok(set),
            other => Err(TanimotoError::UnexpectedValue { expected: "bitset", got: other.kind() }),
        }
    }

    // ─────────────────────────────────────────────
    // Reduce & Finish
    // ─────────────────────────────────────────────

    /// Fold one shard's value into the accumulator.
    pub fn reduce(&self, prev: Option<ReduceValue<E::Set>>, next: ReduceValue<E::Set>) -> ReduceValue<E::Set> {
        reduce::reduce(prev, next)
    }

    /// Turn the fully reduced value into the final ranked list.
    ///
    /// `None` (no shards) yields an empty list.
    pub fn finish(
        &self,
        params: &QueryParameters,
        value: Option<ReduceValue<E::Set>>,
    ) -> Result<Vec<SimilarityResult>, TanimotoError> {
        match value {
            None => Ok(Vec::new()),
            Some(ReduceValue::Ranked(mut ranked)) => {
                // Already ranked and capped by Map/Reduce.
                if let Some(limit) = params.limit {
                    ranked.results.truncate(limit);
                }
                Ok(ranked.results)
            }
            Some(ReduceValue::Partials(batch)) => {
                Ok(batch.finalize(params.threshold, params.limit, params.rank_by))
            }
            Some(other) => Err(TanimotoError::UnexpectedValue { expected: "tanimoto results", got: other.kind() }),
        }
    }

    // ─────────────────────────────────────────────
    // Coordinator
    // ─────────────────────────────────────────────

    /// Scatter `call` over `shards` (one scoped thread each), fold the
    /// per-shard values in shard order and finish.
    ///
    /// Arguments are validated once, before any thread starts. The first
    /// failing shard cancels its siblings; the caller's `ctx` is not
    /// cancelled by that. A real error is reported in preference to the
    /// `Cancelled` errors it caused.
    pub fn execute(
        &self,
        ctx: &QueryContext,
        index: &str,
        call: &Call,
        shards: &[u64],
    ) -> Result<Vec<SimilarityResult>, TanimotoError> {
        let params = self.parameters(call)?;
        ctx.check()?;

        let started = Instant::now();
        let fanout = ctx.child();

        let outcomes: Vec<(u64, Result<ReduceValue<E::Set>, TanimotoError>)> = std::thread::scope(|scope| {
            let handles: Vec<_> = shards
                .iter()
                .map(|&shard| {
                    let fanout = &fanout;
                    let params = &params;
                    let handle = scope.spawn(move || {
                        let out = self.map_with(fanout, index, call, params, shard);
                        if out.is_err() {
                            fanout.cancel();
                        }
                        out
                    });
                    (shard, handle)
                })
                .collect();

            handles
                .into_iter()
                .map(|(shard, handle)| {
                    let out = handle.join().unwrap_or_else(|_| {
                        fanout.cancel();
                        Err(TanimotoError::Execution(format!("shard {shard} worker panicked")))
                    });
                    (shard, out)
                })
                .collect()
        });

        let mut acc: Option<ReduceValue<E::Set>> = None;
        let mut first_error: Option<TanimotoError> = None;

        for (shard, outcome) in outcomes {
            match outcome {
                Ok(value) => acc = Some(self.reduce(acc, value)),
                Err(e) => {
                    warn!(shard, error = %e, "tanimoto shard failed");
                    let replace = match &first_error {
                        None => true,
                        Some(TanimotoError::Cancelled) => !matches!(e, TanimotoError::Cancelled),
                        Some(_) => false,
                    };
                    if replace {
                        first_error = Some(e);
                    }
                }
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }

        let results = self.finish(&params, acc)?;
        info!(
            index,
            frame = %params.frame,
            threshold = params.threshold,
            mode = %params.mode,
            shards = shards.len(),
            results = results.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "tanimoto query complete"
        );
        Ok(results)
    }

    /// [`execute`](Self::execute) over every shard the executor reports.
    pub fn execute_all(
        &self,
        ctx: &QueryContext,
        index: &str,
        call: &Call,
    ) -> Result<Vec<SimilarityResult>, TanimotoError> {
        self.parameters(call)?;
        let shards = self.executor.shards(index)?;
        self.execute(ctx, index, call, &shards)
    }
}

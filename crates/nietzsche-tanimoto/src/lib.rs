//! # nietzsche-tanimoto
//!
//! Sharded Tanimoto (Jaccard) similarity search over Roaring bitmap rows for
//! NietzscheDB.
//!
//! Given a source bit-set and a frame of rows, find the rows whose overlap
//! with the source, `|A ∩ B| / |A ∪ B|`, strictly exceeds a percentage
//! threshold, and rank them.
//!
//! ## Architecture
//!
//! The workflow per query is:
//!
//! 1. **Validate**: [`QueryParameters::from_call`] checks `frame`,
//!    `threshold` (1–100) and the optional `limit` / `mode` / `rankBy`.
//! 2. **Map** (each shard): [`TanimotoPlugin::map`] resolves the source set
//!    by delegating the child call to the [`ShardExecutor`], walks the
//!    fragment's rank cache through the [`ScoringEngine`] (cardinality bounds
//!    first, exact score second) and ranks survivors with [`TopK`].
//! 3. **Reduce**: [`reduce()`] folds per-shard [`ReduceValue`]s.
//! 4. **Finish**: [`TanimotoPlugin::finish`] produces the final ranked list.
//!
//! [`TanimotoPlugin::execute`] runs all four steps over a set of shards on
//! scoped threads.
//!
//! ## Scoring modes
//!
//! - `local` (default): each shard scores its own rows. Exact when a row's
//!   bits live in a single shard.
//! - `aggregate`: shards only tally `(cardinality, intersection)` per row;
//!   scoring happens once on the global sums. Use when rows span shards.
//!
//! ## Example
//!
//! ```
//! use nietzsche_tanimoto::{Call, MemoryIndex, QueryContext, TanimotoPlugin};
//!
//! let mut index = MemoryIndex::new("repository");
//! index.create_frame("stargazer");
//! for column in [1, 2, 3, 4] {
//!     index.set_bit("stargazer", 10, column).unwrap();
//! }
//! for column in [2, 3, 4] {
//!     index.set_bit("stargazer", 20, column).unwrap();
//! }
//! index.recalculate_caches();
//!
//! let call = Call::tanimoto(Call::row("stargazer", 10), "stargazer", 70);
//! let plugin = TanimotoPlugin::new(&index);
//! let results = plugin.execute_all(&QueryContext::new(), "repository", &call).unwrap();
//!
//! // Row 10 matches itself (100%); row 20 shares 3 of 4 bits (75%).
//! assert_eq!(results.iter().map(|r| r.row_id).collect::<Vec<_>>(), vec![10, 20]);
//! ```

pub mod call;
pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod fragment;
pub mod memory;
pub mod params;
pub mod plugin;
pub mod reduce;
pub mod scoring;
pub mod set;
pub mod topk;

// Re-exports for convenience
pub use call::{ArgValue, Call, TANIMOTO_CALL};
pub use config::TanimotoConfig;
pub use context::QueryContext;
pub use error::TanimotoError;
pub use executor::ShardExecutor;
pub use fragment::{Fragment, MemoryFragment, RowCandidate, RowId};
pub use memory::{IndexFixture, MemoryIndex, SHARD_WIDTH};
pub use params::{QueryParameters, RankBy, ScoringMode, MAX_THRESHOLD};
pub use plugin::TanimotoPlugin;
pub use reduce::{reduce, CandidateBatch, RankedResults, ReduceValue, RowTally};
pub use scoring::{judge, tanimoto_percent, ScoringEngine, ScoringStats, SimilarityResult, TanimotoBounds, Verdict};
pub use set::SetHandle;
pub use topk::{TieBreak, TopK};

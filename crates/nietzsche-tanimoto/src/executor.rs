//! The execution-engine seam.
//!
//! The Tanimoto plugin never evaluates a sub-query itself: it hands the child
//! call back to whatever engine is driving it, one shard at a time, and asks
//! the same engine for the candidate frame's fragment. [`ShardExecutor`] is
//! that contract; [`crate::MemoryIndex`] implements it in memory.

use crate::call::Call;
use crate::context::QueryContext;
use crate::error::TanimotoError;
use crate::fragment::Fragment;
use crate::reduce::ReduceValue;
use crate::set::SetHandle;

/// Per-shard evaluation and storage lookup, as offered by the host engine.
pub trait ShardExecutor: Sync {
    type Set: SetHandle;
    type Fragment: Fragment<Set = Self::Set> + Sync;

    /// Evaluate `call` against one shard of `index`.
    fn execute_call_shard(
        &self,
        ctx: &QueryContext,
        index: &str,
        call: &Call,
        shard: u64,
    ) -> Result<ReduceValue<Self::Set>, TanimotoError>;

    /// The fragment of `frame` on `shard`.
    ///
    /// `Err(FrameNotFound)` when the frame is not in the index schema;
    /// `Ok(None)` when the frame exists but holds no data on this shard.
    fn fragment(
        &self,
        index: &str,
        frame: &str,
        shard: u64,
    ) -> Result<Option<&Self::Fragment>, TanimotoError>;

    /// Shards of `index` that hold data, ascending.
    fn shards(&self, index: &str) -> Result<Vec<u64>, TanimotoError>;
}

//! In-memory index: frames of Roaring-bitmap rows split into fixed-width
//! column shards, with a small call evaluator for building source sets.
//!
//! Supported calls:
//!
//! | Call                          | Value   |
//! |-------------------------------|---------|
//! | `Row(frame="f", row=3)`       | bit-set |
//! | `Union(a, b, ...)`            | bit-set |
//! | `Intersect(a, b, ...)`        | bit-set |
//! | `Difference(a, b, ...)`       | bit-set |
//! | `Count(a)`                    | scalar  |
//!
//! Indexes can be loaded from JSON fixtures:
//!
//! ```json
//! {
//!   "name": "repository",
//!   "frames": ["stargazer"],
//!   "shards": { "0": { "stargazer": { "1": [0, 5, 9], "2": [5, 9] } } }
//! }
//! ```
//!
//! Column numbers inside a fixture shard are shard-local.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::call::{ArgValue, Call};
use crate::config::DEFAULT_CACHE_SIZE;
use crate::context::QueryContext;
use crate::error::TanimotoError;
use crate::executor::ShardExecutor;
use crate::fragment::{MemoryFragment, RowId};
use crate::reduce::ReduceValue;

/// Columns per shard.
pub const SHARD_WIDTH: u64 = 1 << 20;

// ─────────────────────────────────────────────
// Fixture format
// ─────────────────────────────────────────────

/// JSON layout of an index: `shards[shard][frame][row] = [local columns]`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexFixture {
    pub name: String,
    #[serde(default)]
    pub frames: Vec<String>,
    #[serde(default)]
    pub shards: BTreeMap<u64, BTreeMap<String, BTreeMap<RowId, Vec<u32>>>>,
}

// ─────────────────────────────────────────────
// MemoryIndex
// ─────────────────────────────────────────────

/// An index held entirely in memory.
#[derive(Debug, Clone)]
pub struct MemoryIndex {
    name: String,
    frames: BTreeSet<String>,
    shards: BTreeMap<u64, BTreeMap<String, MemoryFragment>>,
    cache_size: usize,
}

impl MemoryIndex {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_cache_size(name, DEFAULT_CACHE_SIZE)
    }

    pub fn with_cache_size(name: impl Into<String>, cache_size: usize) -> Self {
        Self {
            name: name.into(),
            frames: BTreeSet::new(),
            shards: BTreeMap::new(),
            cache_size,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declare a frame. Idempotent.
    pub fn create_frame(&mut self, frame: impl Into<String>) {
        self.frames.insert(frame.into());
    }

    pub fn has_frame(&self, frame: &str) -> bool {
        self.frames.contains(frame)
    }

    /// Set the bit at global `column` of `row_id` in `frame`.
    ///
    /// The column picks the shard (`column / SHARD_WIDTH`). Returns `true` if
    /// the bit was previously unset.
    pub fn set_bit(&mut self, frame: &str, row_id: RowId, column: u64) -> Result<bool, TanimotoError> {
        self.ensure_frame(frame)?;
        let shard = column / SHARD_WIDTH;
        let local = (column % SHARD_WIDTH) as u32;
        Ok(self.fragment_mut(frame, shard).set_bit(row_id, local))
    }

    /// Replace the bits of `row_id` in `frame` on one shard (shard-local columns).
    pub fn insert_row(
        &mut self,
        frame: &str,
        shard: u64,
        row_id: RowId,
        bits: RoaringBitmap,
    ) -> Result<(), TanimotoError> {
        self.ensure_frame(frame)?;
        self.fragment_mut(frame, shard).insert_row(row_id, bits);
        Ok(())
    }

    /// Rebuild every fragment's rank cache. Call once after bulk writes.
    pub fn recalculate_caches(&mut self) {
        for fragments in self.shards.values_mut() {
            for fragment in fragments.values_mut() {
                fragment.recalculate_cache();
            }
        }
    }

    /// Build an index from a parsed fixture.
    pub fn from_fixture(fixture: IndexFixture, cache_size: usize) -> Self {
        let mut index = MemoryIndex::with_cache_size(fixture.name, cache_size);
        for frame in fixture.frames {
            index.create_frame(frame);
        }
        for (shard, frames) in fixture.shards {
            for (frame, rows) in frames {
                index.create_frame(frame.clone());
                let fragment = index.fragment_mut(&frame, shard);
                for (row_id, columns) in rows {
                    fragment.insert_row(row_id, columns.into_iter().collect());
                }
            }
        }
        index.recalculate_caches();
        debug!(index = %index.name, frames = index.frames.len(), shards = index.shards.len(), "loaded index fixture");
        index
    }

    pub fn from_json(json: &str, cache_size: usize) -> Result<Self, TanimotoError> {
        let fixture: IndexFixture = serde_json::from_str(json)?;
        Ok(Self::from_fixture(fixture, cache_size))
    }

    /// Load a JSON fixture from disk.
    pub fn load(path: impl AsRef<Path>, cache_size: usize) -> Result<Self, TanimotoError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| TanimotoError::Storage(format!("{}: {e}", path.display())))?;
        Self::from_json(&json, cache_size)
    }

    fn ensure_frame(&self, frame: &str) -> Result<(), TanimotoError> {
        if self.frames.contains(frame) {
            Ok(())
        } else {
            Err(TanimotoError::FrameNotFound { index: self.name.clone(), frame: frame.to_string() })
        }
    }

    fn ensure_index(&self, index: &str) -> Result<(), TanimotoError> {
        if index == self.name {
            Ok(())
        } else {
            Err(TanimotoError::IndexNotFound(index.to_string()))
        }
    }

    fn fragment_mut(&mut self, frame: &str, shard: u64) -> &mut MemoryFragment {
        let cache_size = self.cache_size;
        self.shards
            .entry(shard)
            .or_default()
            .entry(frame.to_string())
            .or_insert_with(|| MemoryFragment::with_cache_size(cache_size))
    }

    /// Evaluate a call that must yield a bit-set.
    fn eval_bitmap(
        &self,
        ctx: &QueryContext,
        call: &Call,
        shard: u64,
    ) -> Result<RoaringBitmap, TanimotoError> {
        match self.execute_call_shard(ctx, &self.name, call, shard)? {
            ReduceValue::BitSet(bits) => Ok(bits),
            other => Err(TanimotoError::UnexpectedValue { expected: "bitset", got: other.kind() }),
        }
    }

    fn eval_row(&self, call: &Call, shard: u64) -> Result<RoaringBitmap, TanimotoError> {
        let frame = call
            .args
            .get("frame")
            .and_then(ArgValue::as_str)
            .ok_or_else(|| TanimotoError::MissingArgument("frame".into()))?;
        let row_id = match call.args.get("row") {
            Some(ArgValue::Int(r)) if *r >= 0 => *r as RowId,
            Some(other) => {
                return Err(TanimotoError::InvalidArgument {
                    name: "row".into(),
                    reason: format!("expected non-negative int, got {other:?}"),
                })
            }
            None => return Err(TanimotoError::MissingArgument("row".into())),
        };
        self.ensure_frame(frame)?;
        Ok(self
            .shards
            .get(&shard)
            .and_then(|frames| frames.get(frame))
            .and_then(|fragment| fragment.row_ref(row_id))
            .cloned()
            .unwrap_or_default())
    }
}

impl ShardExecutor for MemoryIndex {
    type Set = RoaringBitmap;
    type Fragment = MemoryFragment;

    fn execute_call_shard(
        &self,
        ctx: &QueryContext,
        index: &str,
        call: &Call,
        shard: u64,
    ) -> Result<ReduceValue<RoaringBitmap>, TanimotoError> {
        ctx.check()?;
        self.ensure_index(index)?;

        match call.name.as_str() {
            "Row" => self.eval_row(call, shard).map(ReduceValue::BitSet),

            "Union" => {
                let mut out = RoaringBitmap::new();
                for child in &call.children {
                    out |= self.eval_bitmap(ctx, child, shard)?;
                }
                Ok(ReduceValue::BitSet(out))
            }

            "Intersect" | "Difference" => {
                let (first, rest) = call
                    .children
                    .split_first()
                    .ok_or_else(|| TanimotoError::MissingChild(call.name.clone()))?;
                let mut out = self.eval_bitmap(ctx, first, shard)?;
                for child in rest {
                    let bits = self.eval_bitmap(ctx, child, shard)?;
                    if call.name == "Intersect" {
                        out &= bits;
                    } else {
                        out -= bits;
                    }
                }
                Ok(ReduceValue::BitSet(out))
            }

            "Count" => {
                let child = call
                    .children
                    .first()
                    .ok_or_else(|| TanimotoError::MissingChild(call.name.clone()))?;
                Ok(ReduceValue::Scalar(self.eval_bitmap(ctx, child, shard)?.len()))
            }

            other => Err(TanimotoError::Execution(format!("unknown call: {other}"))),
        }
    }

    fn fragment(
        &self,
        index: &str,
        frame: &str,
        shard: u64,
    ) -> Result<Option<&MemoryFragment>, TanimotoError> {
        self.ensure_index(index)?;
        self.ensure_frame(frame)?;
        Ok(self.shards.get(&shard).and_then(|frames| frames.get(frame)))
    }

    fn shards(&self, index: &str) -> Result<Vec<u64>, TanimotoError> {
        self.ensure_index(index)?;
        Ok(self.shards.keys().copied().collect())
    }
}

//! Argument validation: turns a [`Call`]'s argument map into [`QueryParameters`].
//!
//! `frame` and `threshold` are required. `limit`, `mode` and `rankBy` are
//! optional and fall back to the plugin's [`TanimotoConfig`].
//! Validation runs before any set is resolved, so a bad argument never costs
//! a shard evaluation.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::call::{ArgValue, Call};
use crate::config::TanimotoConfig;
use crate::error::TanimotoError;

/// Largest accepted threshold (a percentage).
pub const MAX_THRESHOLD: u64 = 100;

// ─────────────────────────────────────────────
// Scoring mode / ranking key
// ─────────────────────────────────────────────

/// Where the exact threshold decision is taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoringMode {
    /// Score and threshold inside each shard. Correct when every row's bits
    /// live in a single shard.
    #[default]
    Local,
    /// Shards emit raw `(row, cardinality, intersection)` tallies; the score
    /// is computed once after the tallies are summed across shards.
    Aggregate,
}

impl FromStr for ScoringMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "aggregate" => Ok(Self::Aggregate),
            other => Err(format!("unknown scoring mode '{other}' (use local|aggregate)")),
        }
    }
}

impl std::fmt::Display for ScoringMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScoringMode::Local => write!(f, "local"),
            ScoringMode::Aggregate => write!(f, "aggregate"),
        }
    }
}

/// Key used to order accepted rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RankBy {
    /// Row cardinality, largest first.
    #[default]
    Cardinality,
    /// Tanimoto percentage, most similar first.
    Score,
}

impl FromStr for RankBy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cardinality" | "count" => Ok(Self::Cardinality),
            "score" | "tanimoto" => Ok(Self::Score),
            other => Err(format!("unknown ranking key '{other}' (use cardinality|score)")),
        }
    }
}

impl std::fmt::Display for RankBy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RankBy::Cardinality => write!(f, "cardinality"),
            RankBy::Score => write!(f, "score"),
        }
    }
}

// ─────────────────────────────────────────────
// QueryParameters
// ─────────────────────────────────────────────

/// Validated parameters of one Tanimoto query.
///
/// `threshold` is always in `0..=100`. A threshold of 0 (including any
/// non-positive call argument) requests no Tanimoto filtering, and the query
/// reports no rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryParameters {
    /// Frame whose rows are the candidates.
    pub frame: String,
    /// Exclusive lower bound on the Tanimoto percentage; 0 disables scoring.
    pub threshold: u64,
    /// Maximum number of rows returned; `None` is unbounded.
    pub limit: Option<usize>,
    pub mode: ScoringMode,
    pub rank_by: RankBy,
}

impl QueryParameters {
    /// Build parameters directly, enforcing the threshold range.
    pub fn new(frame: impl Into<String>, threshold: u64) -> Result<Self, TanimotoError> {
        if threshold > MAX_THRESHOLD {
            return Err(TanimotoError::InvalidThreshold(threshold.to_string()));
        }
        Ok(Self {
            frame: frame.into(),
            threshold,
            limit: None,
            mode: ScoringMode::default(),
            rank_by: RankBy::default(),
        })
    }

    /// Whether any row can be reported (`threshold > 0`).
    pub fn scores(&self) -> bool {
        self.threshold > 0
    }

    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_mode(mut self, mode: ScoringMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_rank_by(mut self, rank_by: RankBy) -> Self {
        self.rank_by = rank_by;
        self
    }

    /// Validate the arguments of `call`, defaulting optional ones from `config`.
    pub fn from_call(call: &Call, config: &TanimotoConfig) -> Result<Self, TanimotoError> {
        let frame = match call.args.get("frame").and_then(ArgValue::as_str) {
            Some(f) => f.to_string(),
            None => return Err(TanimotoError::MissingArgument("frame".into())),
        };

        let threshold = match call.args.get("threshold") {
            Some(value) => match value.as_int() {
                Some(t) if t > MAX_THRESHOLD as i64 => {
                    return Err(TanimotoError::InvalidThreshold(t.to_string()))
                }
                // Non-positive: no filtering requested.
                Some(t) => t.max(0) as u64,
                None => {
                    return Err(TanimotoError::InvalidThreshold(format!(
                        "expected int, got {}",
                        value.type_name()
                    )))
                }
            },
            None => return Err(TanimotoError::InvalidThreshold("threshold required".into())),
        };

        let limit = match call.args.get("limit") {
            None => config.default_limit,
            Some(value) => match value.as_int() {
                Some(0) => None,
                Some(n) if n > 0 => Some(usize::try_from(n).map_err(|_| TanimotoError::InvalidArgument {
                    name: "limit".into(),
                    reason: format!("{n} does not fit in usize"),
                })?),
                _ => {
                    return Err(TanimotoError::InvalidArgument {
                        name: "limit".into(),
                        reason: format!("expected non-negative int, got {value:?}"),
                    })
                }
            },
        };

        let mode = match call.args.get("mode") {
            None => config.mode,
            Some(v) => parse_enum_arg("mode", v)?,
        };

        let rank_by = match call.args.get("rankBy") {
            None => config.rank_by,
            Some(v) => parse_enum_arg("rankBy", v)?,
        };

        Ok(Self { frame, threshold, limit, mode, rank_by })
    }
}

fn parse_enum_arg<T: FromStr<Err = String>>(name: &str, value: &ArgValue) -> Result<T, TanimotoError> {
    let s = value.as_str().ok_or_else(|| TanimotoError::InvalidArgument {
        name: name.into(),
        reason: format!("expected string, got {}", value.type_name()),
    })?;
    s.parse().map_err(|reason| TanimotoError::InvalidArgument { name: name.into(), reason })
}

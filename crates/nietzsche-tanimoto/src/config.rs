//! Plugin configuration loaded from environment variables.
//!
//! All settings have safe defaults; per-query arguments (`limit`, `mode`,
//! `rankBy`) override them.
//!
//! | Variable                                   | Default       | Description                                   |
//! |--------------------------------------------|---------------|-----------------------------------------------|
//! | `NIETZSCHE_TANIMOTO_DEFAULT_LIMIT`         | `0`           | Result cap when a call has no `limit` (0 = unbounded) |
//! | `NIETZSCHE_TANIMOTO_MODE`                  | `local`       | Scoring mode: `local` or `aggregate`          |
//! | `NIETZSCHE_TANIMOTO_RANK_BY`               | `cardinality` | Ranking key: `cardinality` or `score`         |
//! | `NIETZSCHE_TANIMOTO_CANCEL_CHECK_INTERVAL` | `64`          | Candidates scored between cancellation checks |
//! | `NIETZSCHE_TANIMOTO_CACHE_SIZE`            | `50000`       | Rank-cache entries kept per in-memory fragment |
//! | `NIETZSCHE_LOG_LEVEL`                      | `info`        | tracing filter for the binary                 |

use crate::params::{RankBy, ScoringMode};

/// Default number of rank-cache entries per fragment.
pub const DEFAULT_CACHE_SIZE: usize = 50_000;

/// Default number of candidates between two cancellation checks.
pub const DEFAULT_CANCEL_CHECK_INTERVAL: usize = 64;

/// Runtime configuration for [`crate::TanimotoPlugin`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TanimotoConfig {
    /// Result cap applied when the call has no `limit` argument.
    pub default_limit: Option<usize>,

    /// Scoring mode applied when the call has no `mode` argument.
    pub mode: ScoringMode,

    /// Ranking key applied when the call has no `rankBy` argument.
    pub rank_by: RankBy,

    /// Candidates scored between two cancellation checks (min 1).
    pub cancel_check_interval: usize,

    /// Rank-cache size for [`crate::MemoryFragment`]s built by the binary.
    pub cache_size: usize,

    /// Tracing filter string, e.g. `"nietzsche_tanimoto=debug,info"`.
    pub log_level: String,
}

impl Default for TanimotoConfig {
    fn default() -> Self {
        Self {
            default_limit:         None,
            mode:                  ScoringMode::Local,
            rank_by:               RankBy::Cardinality,
            cancel_check_interval: DEFAULT_CANCEL_CHECK_INTERVAL,
            cache_size:            DEFAULT_CACHE_SIZE,
            log_level:             "info".to_string(),
        }
    }
}

impl TanimotoConfig {
    /// Load configuration from environment variables, applying defaults where
    /// a variable is absent or unparseable.
    pub fn from_env() -> Self {
        let default_limit: usize = env_parse("NIETZSCHE_TANIMOTO_DEFAULT_LIMIT", 0);
        Self {
            default_limit:         (default_limit > 0).then_some(default_limit),
            mode:                  env_parse("NIETZSCHE_TANIMOTO_MODE", ScoringMode::Local),
            rank_by:               env_parse("NIETZSCHE_TANIMOTO_RANK_BY", RankBy::Cardinality),
            cancel_check_interval: env_parse("NIETZSCHE_TANIMOTO_CANCEL_CHECK_INTERVAL", DEFAULT_CANCEL_CHECK_INTERVAL).max(1),
            cache_size:            env_parse("NIETZSCHE_TANIMOTO_CACHE_SIZE", DEFAULT_CACHE_SIZE),
            log_level:             env_str("NIETZSCHE_LOG_LEVEL", "info"),
        }
    }
}

fn env_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

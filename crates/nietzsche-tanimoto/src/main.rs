//! Command-line Tanimoto search over a JSON index fixture.
//!
//! Loads a [`MemoryIndex`] from a fixture file, builds
//! `Tanimoto(Row(frame=<source-frame>, row=<source-row>), frame=<frame>, threshold=<t>)`,
//! runs it over the selected shards and prints the ranked rows as JSON.
//!
//! ## Quick start
//!
//! ```bash
//! cargo run --bin nietzsche-tanimoto -- \
//!     --index fixtures/repository.json --frame stargazer \
//!     --source-row 10 --threshold 70 --limit 20
//!
//! # Rows spread over many shards: score on global counts
//! NIETZSCHE_TANIMOTO_MODE=aggregate NIETZSCHE_LOG_LEVEL=debug \
//!     cargo run --bin nietzsche-tanimoto -- --index big.json --frame f --source-row 1 --threshold 50
//! ```

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use nietzsche_tanimoto::{Call, MemoryIndex, QueryContext, ShardExecutor, TanimotoConfig, TanimotoPlugin};

#[derive(Parser, Debug)]
#[command(name = "nietzsche-tanimoto")]
#[command(about = "Rank the rows of a frame by Tanimoto similarity to a source row")]
struct Cli {
    /// JSON index fixture
    #[arg(long)]
    index: PathBuf,

    /// Frame whose rows are ranked
    #[arg(long)]
    frame: String,

    /// Exclusive minimum similarity, in percent (0-100; 0 reports nothing)
    #[arg(long)]
    threshold: i64,

    /// Frame of the source row (defaults to --frame)
    #[arg(long)]
    source_frame: Option<String>,

    /// Row whose bits form the source set
    #[arg(long)]
    source_row: u64,

    /// Maximum rows returned (0 = unbounded)
    #[arg(long)]
    limit: Option<i64>,

    /// Scoring mode: local | aggregate (default: NIETZSCHE_TANIMOTO_MODE)
    #[arg(long)]
    mode: Option<String>,

    /// Ranking key: cardinality | score (default: NIETZSCHE_TANIMOTO_RANK_BY)
    #[arg(long)]
    rank_by: Option<String>,

    /// Restrict the query to these shards (comma separated)
    #[arg(long, value_delimiter = ',')]
    shards: Vec<u64>,

    /// Pretty-print the JSON output
    #[arg(long)]
    pretty: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = TanimotoConfig::from_env();

    let filter = EnvFilter::try_new(&config.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let index = MemoryIndex::load(&cli.index, config.cache_size)
        .with_context(|| format!("failed to load index fixture {}", cli.index.display()))?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        index   = index.name(),
        path    = %cli.index.display(),
        "index loaded"
    );

    let source_frame = cli.source_frame.as_deref().unwrap_or(&cli.frame);
    let mut call = Call::tanimoto(Call::row(source_frame, cli.source_row), &cli.frame, cli.threshold);
    if let Some(limit) = cli.limit {
        call = call.arg("limit", limit);
    }
    if let Some(mode) = &cli.mode {
        call = call.arg("mode", mode.as_str());
    }
    if let Some(rank_by) = &cli.rank_by {
        call = call.arg("rankBy", rank_by.as_str());
    }

    let shards = if cli.shards.is_empty() {
        index.shards(index.name())?
    } else {
        cli.shards.clone()
    };

    info!(query = %call, shards = shards.len(), "running query");

    let plugin = TanimotoPlugin::with_config(&index, config);
    let results = plugin.execute(&QueryContext::new(), index.name(), &call, &shards)?;

    let json = if cli.pretty {
        serde_json::to_string_pretty(&results)?
    } else {
        serde_json::to_string(&results)?
    };
    println!("{json}");

    Ok(())
}

//! Integration tests for nietzsche-tanimoto.
//!
//! These tests drive the full pipeline: build an in-memory index (or load a
//! fixture file), validate a `Tanimoto` call, Map on every shard, Reduce and
//! Finish.

use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};

use roaring::RoaringBitmap;

use nietzsche_tanimoto::{
    Call, MemoryFragment, MemoryIndex, QueryContext, RankBy, ReduceValue, ScoringMode,
    ShardExecutor, SimilarityResult, TanimotoConfig, TanimotoError, TanimotoPlugin, SHARD_WIDTH,
};

// ─────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────

/// Source row 0 of frame `src` holds columns 0..100. Frame `f`:
/// row 1: C=40 (inside the source) → pruned at t=50
/// row 2: C=80, I=60 → 50, rejected
/// row 3: C=80, I=61 → 52, accepted
/// row 4: C=90, I=0  → disjoint
/// row 5: C=70, I=70 → 70, accepted
fn worked_example() -> MemoryIndex {
    let mut idx = MemoryIndex::new("i");
    idx.create_frame("src");
    idx.create_frame("f");
    for c in 0..100 {
        idx.set_bit("src", 0, c).unwrap();
    }
    let rows: [(u64, Vec<u64>); 5] = [
        (1, (0..40).collect()),
        (2, (0..60).chain(1000..1020).collect()),
        (3, (0..61).chain(2000..2019).collect()),
        (4, (5000..5090).collect()),
        (5, (0..70).collect()),
    ];
    for (row, cols) in rows {
        for c in cols {
            idx.set_bit("f", row, c).unwrap();
        }
    }
    idx.recalculate_caches();
    idx
}

fn source_call() -> Call {
    Call::row("src", 0)
}

fn ids(results: &[SimilarityResult]) -> Vec<u64> {
    results.iter().map(|r| r.row_id).collect()
}

/// Counts delegated evaluations and optionally fails one shard.
struct Instrumented {
    inner: MemoryIndex,
    evaluations: AtomicUsize,
    failing_shard: Option<u64>,
}

impl Instrumented {
    fn new(inner: MemoryIndex) -> Self {
        Self { inner, evaluations: AtomicUsize::new(0), failing_shard: None }
    }
}

impl ShardExecutor for Instrumented {
    type Set = RoaringBitmap;
    type Fragment = MemoryFragment;

    fn execute_call_shard(
        &self,
        ctx: &QueryContext,
        index: &str,
        call: &Call,
        shard: u64,
    ) -> Result<ReduceValue<RoaringBitmap>, TanimotoError> {
        self.evaluations.fetch_add(1, Ordering::SeqCst);
        if self.failing_shard == Some(shard) {
            return Err(TanimotoError::Storage(format!("shard {shard} unavailable")));
        }
        self.inner.execute_call_shard(ctx, index, call, shard)
    }

    fn fragment(
        &self,
        index: &str,
        frame: &str,
        shard: u64,
    ) -> Result<Option<&MemoryFragment>, TanimotoError> {
        self.inner.fragment(index, frame, shard)
    }

    fn shards(&self, index: &str) -> Result<Vec<u64>, TanimotoError> {
        self.inner.shards(index)
    }
}

// ─────────────────────────────────────────────
// Scoring scenarios
// ─────────────────────────────────────────────

#[test]
fn worked_example_end_to_end() {
    let idx = worked_example();
    let plugin = TanimotoPlugin::new(&idx);
    let call = Call::tanimoto(source_call(), "f", 50);

    let results = plugin.execute_all(&QueryContext::new(), "i", &call).unwrap();

    // Ranked by cardinality: row 3 (80) before row 5 (70).
    assert_eq!(
        results,
        vec![
            SimilarityResult { row_id: 3, cardinality: 80, score: 52 },
            SimilarityResult { row_id: 5, cardinality: 70, score: 70 },
        ]
    );
}

#[test]
fn rank_by_score_and_limit() {
    let idx = worked_example();
    let plugin = TanimotoPlugin::new(&idx);
    let call = Call::tanimoto(source_call(), "f", 50).arg("rankBy", "score").arg("limit", 1);

    let results = plugin.execute_all(&QueryContext::new(), "i", &call).unwrap();
    assert_eq!(ids(&results), vec![5]);
}

#[test]
fn threshold_is_strictly_exclusive() {
    let idx = worked_example();
    let plugin = TanimotoPlugin::new(&idx);
    let ctx = QueryContext::new();

    // Row 3 scores 52: kept at 51, dropped at 52.
    let at_51 = plugin.execute_all(&ctx, "i", &Call::tanimoto(source_call(), "f", 51)).unwrap();
    assert!(ids(&at_51).contains(&3));
    let at_52 = plugin.execute_all(&ctx, "i", &Call::tanimoto(source_call(), "f", 52)).unwrap();
    assert!(!ids(&at_52).contains(&3));
}

#[test]
fn threshold_100_returns_nothing() {
    let idx = worked_example();
    let plugin = TanimotoPlugin::new(&idx);
    let call = Call::tanimoto(Call::row("f", 5), "f", 100);
    assert!(plugin.execute_all(&QueryContext::new(), "i", &call).unwrap().is_empty());
}

#[test]
fn empty_source_returns_nothing() {
    let idx = worked_example();
    let plugin = TanimotoPlugin::new(&idx);
    let call = Call::tanimoto(Call::row("src", 999), "f", 1);
    assert!(plugin.execute_all(&QueryContext::new(), "i", &call).unwrap().is_empty());
}

#[test]
fn derived_source_sets_are_supported() {
    let idx = worked_example();
    let plugin = TanimotoPlugin::new(&idx);
    // Union of rows 3 and 5 of `f` is columns 0..70 plus 2000..2019 (89 bits).
    let source = Call::new("Union").child(Call::row("f", 3)).child(Call::row("f", 5));
    let results = plugin
        .execute_all(&QueryContext::new(), "i", &Call::tanimoto(source, "f", 75))
        .unwrap();
    // Row 3: I=80, union 89 → 90. Row 5: I=70, union 89 → 79.
    assert_eq!(
        results,
        vec![
            SimilarityResult { row_id: 3, cardinality: 80, score: 90 },
            SimilarityResult { row_id: 5, cardinality: 70, score: 79 },
        ]
    );
}

// ─────────────────────────────────────────────
// Validation & errors
// ─────────────────────────────────────────────

#[test]
fn invalid_thresholds_fail_before_any_evaluation() {
    let exec = Instrumented::new(worked_example());
    let plugin = TanimotoPlugin::new(&exec);
    let ctx = QueryContext::new();

    let bad = [
        Call::tanimoto(source_call(), "f", 101),
        Call::new("Tanimoto").child(source_call()).arg("frame", "f").arg("threshold", "50"),
        Call::new("Tanimoto").child(source_call()).arg("frame", "f"),
    ];
    for call in &bad {
        let err = plugin.execute(&ctx, "i", call, &[0]).unwrap_err();
        assert!(matches!(err, TanimotoError::InvalidThreshold(_)), "{call}: {err}");
        let err = plugin.map(&ctx, "i", call, 0).unwrap_err();
        assert!(matches!(err, TanimotoError::InvalidThreshold(_)), "{call}: {err}");
    }
    assert_eq!(exec.evaluations.load(Ordering::SeqCst), 0);
}

#[test]
fn non_positive_threshold_reports_no_rows() {
    let idx = worked_example();
    let plugin = TanimotoPlugin::new(&idx);
    let ctx = QueryContext::new();
    for t in [0, -5] {
        let local = plugin.execute_all(&ctx, "i", &Call::tanimoto(source_call(), "f", t)).unwrap();
        assert!(local.is_empty(), "threshold {t}");
        let aggregate = Call::tanimoto(source_call(), "f", t).arg("mode", "aggregate");
        assert!(plugin.execute_all(&ctx, "i", &aggregate).unwrap().is_empty(), "threshold {t}");
    }
}

#[test]
fn missing_frame_argument() {
    let idx = worked_example();
    let plugin = TanimotoPlugin::new(&idx);
    let call = Call::new("Tanimoto").child(source_call()).arg("threshold", 50);
    assert!(matches!(
        plugin.execute_all(&QueryContext::new(), "i", &call),
        Err(TanimotoError::MissingArgument(ref a)) if a == "frame"
    ));
}

#[test]
fn invalid_optional_arguments() {
    let idx = worked_example();
    let plugin = TanimotoPlugin::new(&idx);
    let ctx = QueryContext::new();
    for call in [
        Call::tanimoto(source_call(), "f", 50).arg("limit", -1),
        Call::tanimoto(source_call(), "f", 50).arg("mode", "global"),
        Call::tanimoto(source_call(), "f", 50).arg("rankBy", 3),
    ] {
        assert!(matches!(
            plugin.execute_all(&ctx, "i", &call),
            Err(TanimotoError::InvalidArgument { .. })
        ));
    }
}

#[test]
fn unknown_candidate_frame() {
    let idx = worked_example();
    let plugin = TanimotoPlugin::new(&idx);
    let call = Call::tanimoto(source_call(), "nope", 50);
    assert!(matches!(
        plugin.execute_all(&QueryContext::new(), "i", &call),
        Err(TanimotoError::FrameNotFound { .. })
    ));
}

#[test]
fn delegated_errors_surface_verbatim() {
    let idx = worked_example();
    let plugin = TanimotoPlugin::new(&idx);
    let call = Call::tanimoto(Call::new("Bogus"), "f", 50);
    assert!(matches!(
        plugin.execute_all(&QueryContext::new(), "i", &call),
        Err(TanimotoError::Execution(_))
    ));
}

#[test]
fn failing_shard_reports_its_error_and_spares_the_caller() {
    let mut idx = worked_example();
    idx.set_bit("f", 7, SHARD_WIDTH * 3).unwrap();
    idx.recalculate_caches();
    let mut exec = Instrumented::new(idx);
    exec.failing_shard = Some(3);

    let plugin = TanimotoPlugin::new(&exec);
    let ctx = QueryContext::new();
    let err = plugin.execute(&ctx, "i", &Call::tanimoto(source_call(), "f", 50), &[0, 3]).unwrap_err();

    assert!(matches!(err, TanimotoError::Storage(_)), "got {err}");
    assert!(!ctx.is_cancelled());
}

#[test]
fn cancelled_query_returns_no_partial_result() {
    let idx = worked_example();
    let plugin = TanimotoPlugin::new(&idx);
    let ctx = QueryContext::new();
    ctx.cancel();
    assert!(matches!(
        plugin.execute_all(&ctx, "i", &Call::tanimoto(source_call(), "f", 50)),
        Err(TanimotoError::Cancelled)
    ));
}

// ─────────────────────────────────────────────
// Multi-shard
// ─────────────────────────────────────────────

/// Source row 0 of `src` has 10 bits on each of shards 0..3. Frame `f` holds
/// one row per shard: row 1 (shard 0, C=9 → 90), row 2 (shard 1, C=8 → 80),
/// row 3 (shard 2, C=7 → 70).
fn one_row_per_shard() -> MemoryIndex {
    let mut idx = MemoryIndex::new("i");
    idx.create_frame("src");
    idx.create_frame("f");
    for shard in 0..3u64 {
        let base = shard * SHARD_WIDTH;
        for c in 0..10 {
            idx.set_bit("src", 0, base + c).unwrap();
        }
        let row = shard + 1;
        for c in 0..(9 - shard) {
            idx.set_bit("f", row, base + c).unwrap();
        }
    }
    idx.recalculate_caches();
    idx
}

#[test]
fn local_mode_merges_shards_under_one_limit() {
    let idx = one_row_per_shard();
    let plugin = TanimotoPlugin::new(&idx);
    let call = Call::tanimoto(source_call(), "f", 50).arg("limit", 2);

    let results = plugin.execute_all(&QueryContext::new(), "i", &call).unwrap();
    assert_eq!(
        results,
        vec![
            SimilarityResult { row_id: 1, cardinality: 9, score: 90 },
            SimilarityResult { row_id: 2, cardinality: 8, score: 80 },
        ]
    );
}

#[test]
fn shard_order_does_not_matter() {
    let idx = one_row_per_shard();
    let plugin = TanimotoPlugin::new(&idx);
    let ctx = QueryContext::new();
    let call = Call::tanimoto(source_call(), "f", 50);
    let forward = plugin.execute(&ctx, "i", &call, &[0, 1, 2]).unwrap();
    let backward = plugin.execute(&ctx, "i", &call, &[2, 1, 0]).unwrap();
    assert_eq!(forward, backward);
    assert_eq!(ids(&forward), vec![1, 2, 3]);
}

/// Source and row 1 both span shards 0 and 1.
/// Globally S=100, C=80, I=61 → 52 (accepted at t=50).
/// Shard 0 alone: S=50, C=40, I=40 → 80. Shard 1 alone: S=50, C=40, I=21 → 31.
fn row_spanning_shards() -> MemoryIndex {
    let mut idx = MemoryIndex::new("i");
    idx.create_frame("src");
    idx.create_frame("f");
    for c in (0..50).chain(SHARD_WIDTH..SHARD_WIDTH + 50) {
        idx.set_bit("src", 0, c).unwrap();
    }
    let row1 = (0..40)
        .chain(SHARD_WIDTH..SHARD_WIDTH + 21)
        .chain(SHARD_WIDTH + 1000..SHARD_WIDTH + 1019);
    for c in row1 {
        idx.set_bit("f", 1, c).unwrap();
    }
    idx.recalculate_caches();
    idx
}

#[test]
fn aggregate_mode_scores_global_counts() {
    let idx = row_spanning_shards();
    let plugin = TanimotoPlugin::new(&idx);
    let ctx = QueryContext::new();
    let call = Call::tanimoto(source_call(), "f", 50);

    let local = plugin.execute_all(&ctx, "i", &call).unwrap();
    assert_eq!(local, vec![SimilarityResult { row_id: 1, cardinality: 40, score: 80 }]);

    let aggregate = plugin
        .execute_all(&ctx, "i", &call.clone().arg("mode", "aggregate"))
        .unwrap();
    assert_eq!(aggregate, vec![SimilarityResult { row_id: 1, cardinality: 80, score: 52 }]);
}

/// Source: 10 bits on shard 0, 90 on shard 1 (S=100). Row 1: 100 bits on
/// shard 0 disjoint from the source, plus the source's 90 bits on shard 1.
/// Globally C=190, I=90 → 90/200 = 45. On shard 0 alone row 1 (C=100) lies
/// far outside the window for S=10, but its cardinality still counts.
fn row_outside_one_shards_window() -> MemoryIndex {
    let mut idx = MemoryIndex::new("i");
    idx.create_frame("src");
    idx.create_frame("f");
    for c in (0..10).chain(SHARD_WIDTH..SHARD_WIDTH + 90) {
        idx.set_bit("src", 0, c).unwrap();
    }
    for c in (1000..1100).chain(SHARD_WIDTH..SHARD_WIDTH + 90) {
        idx.set_bit("f", 1, c).unwrap();
    }
    idx.recalculate_caches();
    idx
}

#[test]
fn aggregate_mode_sums_shares_outside_a_shards_window() {
    let idx = row_outside_one_shards_window();
    let plugin = TanimotoPlugin::new(&idx);
    let ctx = QueryContext::new();

    let at_50 = Call::tanimoto(source_call(), "f", 50).arg("mode", "aggregate");
    assert!(plugin.execute_all(&ctx, "i", &at_50).unwrap().is_empty());

    let at_40 = Call::tanimoto(source_call(), "f", 40).arg("mode", "aggregate");
    assert_eq!(
        plugin.execute_all(&ctx, "i", &at_40).unwrap(),
        vec![SimilarityResult { row_id: 1, cardinality: 190, score: 45 }]
    );
}

#[test]
fn aggregate_mode_from_config() {
    let idx = row_spanning_shards();
    let config = TanimotoConfig { mode: ScoringMode::Aggregate, rank_by: RankBy::Score, ..TanimotoConfig::default() };
    let plugin = TanimotoPlugin::with_config(&idx, config);
    let results = plugin
        .execute_all(&QueryContext::new(), "i", &Call::tanimoto(source_call(), "f", 50))
        .unwrap();
    assert_eq!(ids(&results), vec![1]);
    assert_eq!(results[0].score, 52);
}

#[test]
fn aggregate_map_on_shard_without_fragment_still_counts_source() {
    let mut idx = row_spanning_shards();
    // Shard 5 holds source bits but no `f` rows.
    for c in 5 * SHARD_WIDTH..5 * SHARD_WIDTH + 7 {
        idx.set_bit("src", 0, c).unwrap();
    }
    let plugin = TanimotoPlugin::new(&idx);
    let call = Call::tanimoto(source_call(), "f", 50).arg("mode", "aggregate");
    match plugin.map(&QueryContext::new(), "i", &call, 5).unwrap() {
        ReduceValue::Partials(batch) => {
            assert_eq!(batch.source_count, 7);
            assert!(batch.is_empty());
        }
        other => panic!("expected partial tallies, got {}", other.kind()),
    }
}

// ─────────────────────────────────────────────
// Fixtures
// ─────────────────────────────────────────────

#[test]
fn fixture_file_round_trip() {
    let json = r#"{
        "name": "repository",
        "frames": ["stargazer"],
        "shards": {
            "0": { "stargazer": { "10": [1, 2, 3, 4], "20": [2, 3, 4], "30": [9] } },
            "1": { "stargazer": { "10": [1], "20": [1] } }
        }
    }"#;
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(json.as_bytes()).unwrap();

    let idx = MemoryIndex::load(file.path(), 1000).unwrap();
    let plugin = TanimotoPlugin::new(&idx);
    let call = Call::tanimoto(Call::row("stargazer", 10), "stargazer", 70).arg("mode", "aggregate");
    let results = plugin.execute_all(&QueryContext::new(), "repository", &call).unwrap();

    // Globally row 10 = 5 bits, row 20 = 4 bits, all shared → 80.
    assert_eq!(
        results,
        vec![
            SimilarityResult { row_id: 10, cardinality: 5, score: 100 },
            SimilarityResult { row_id: 20, cardinality: 4, score: 80 },
        ]
    );
}

#[test]
fn missing_fixture_is_a_storage_error() {
    let dir = tempfile::TempDir::new().unwrap();
    let err = MemoryIndex::load(dir.path().join("absent.json"), 10).unwrap_err();
    assert!(matches!(err, TanimotoError::Storage(_)));
}

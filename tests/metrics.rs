//! Tests for the engine counters and their JSON export.

use anyhow::Result;
use ironstream::testing::*;
use ironstream::*;
use tracing_subscriber::EnvFilter;

type Row = (u32, u32);

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn run_count(c: &QueryContainer, events: Vec<Event<Empty, Row>>) -> Result<usize> {
    let key = c.selector("key", |r: &Row| r.0)?;
    let plan = MapReduce::new(
        c,
        MapDefinition::unary(from_events(events), |s| s, key),
        |g| g.aggregate(Windowing::Global, Count),
        |k: &u32, n: u64| (*k, n),
    );
    Ok(collect(&plan.stream())?.len())
}

#[test]
fn test_counters_start_at_zero() {
    let m = EngineMetrics::new();
    assert_eq!(m.snapshot(), MetricsSnapshot::default());
}

#[test]
fn test_counters_accumulate_across_plans() -> Result<()> {
    init_logging();
    let c = TestContainer::parallel(3, 2)?;
    let rows = run_count(&c, pseudo_random_events(60, 4, 10))?;
    let first = c.metrics();
    assert_eq!(first.plans_built, 1);
    assert_eq!(first.rows_sprayed, 60);
    assert_eq!(first.rows_shuffled, 60);
    assert_eq!(first.root_rows, rows as u64);
    assert!(first.root_batches >= 1);

    run_count(&c, pseudo_random_events(40, 4, 10))?;
    let second = c.metrics();
    assert_eq!(second.plans_built, 2);
    assert_eq!(second.rows_sprayed, 100);
    assert_eq!(second.shuffles_skipped, 0);
    Ok(())
}

#[test]
fn test_metrics_export_as_json() -> Result<()> {
    init_logging();
    let c = TestContainer::parallel(2, 2)?;
    run_count(&c, pseudo_random_events(30, 3, 10))?;

    let json = c.scheduler().metrics().to_json();
    assert_eq!(json["plans_built"], 1);
    assert_eq!(json["rows_sprayed"], 30);
    for field in ["shuffles_skipped", "rows_shuffled", "base_merge_nodes", "internal_merge_nodes", "root_batches", "root_rows"] {
        assert!(json.get(field).is_some(), "missing {field}");
    }

    let back: MetricsSnapshot = serde_json::from_value(json)?;
    assert_eq!(back, c.metrics());
    Ok(())
}

#[test]
fn test_metrics_save_to_file() -> Result<()> {
    let c = TestContainer::parallel(2, 3)?;
    run_count(&c, pseudo_random_events(20, 5, 10))?;

    let dir = tempfile::tempdir()?;
    let path = dir.path().join("metrics.json");
    let path = path.to_str().ok_or_else(|| anyhow::anyhow!("non-utf8 temp path"))?;
    c.scheduler().metrics().save_to_file(path)?;

    let saved: MetricsSnapshot = serde_json::from_str(&std::fs::read_to_string(path)?)?;
    assert_eq!(saved, c.metrics());
    assert_eq!(saved.rows_shuffled, 20);
    Ok(())
}

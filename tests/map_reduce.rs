//! End-to-end tests for single-pipeline map/reduce plans.

use anyhow::Result;
use ironstream::testing::*;
use ironstream::*;
use std::collections::HashMap;

type Row = (u32, u32);

fn sum_per_key(container: &QueryContainer, events: Vec<Event<Empty, Row>>) -> Result<Vec<(u32, u64)>> {
    let by_key = container.selector("key", |r: &(u32, u64)| r.0)?;
    let def = MapDefinition::unary(
        from_events(events),
        |s| s.select(|&(k, v): &Row| (k, u64::from(v))),
        by_key,
    );
    let plan = MapReduce::new(
        container,
        def,
        |g| g.select(|r: &(u32, u64)| r.1).aggregate(Windowing::Global, Sum::<u64>::new()),
        |k: &u32, total: u64| (*k, total),
    );
    Ok(collect(&plan.stream())?.into_iter().map(|e| e.payload).collect())
}

#[test]
fn test_count_per_key() -> Result<()> {
    let c = TestContainer::parallel(3, 2)?;
    let by_key = c.selector("key", |r: &(u32, char)| r.0)?;
    let plan = MapReduce::new(
        &c,
        MapDefinition::unary(from_events(three_rows()), |s| s, by_key),
        |g| g.aggregate(Windowing::Global, Count),
        |k: &u32, n: u64| (*k, n),
    );

    let out: Vec<_> = collect(&plan.stream())?.into_iter().map(|e| e.payload).collect();
    assert_kv_collections_equal(out, vec![(1, 2), (2, 1)]);
    Ok(())
}

#[test]
fn test_count_per_key_over_two_by_two_partitions() -> Result<()> {
    let c = TestContainer::parallel(2, 2)?;
    let by_key = c.selector("key", |r: &(u32, char)| r.0)?;
    let plan = MapReduce::new(
        &c,
        MapDefinition::unary(from_events(three_rows()), |s| s, by_key),
        |g| g.aggregate(Windowing::Global, Count),
        |k: &u32, n: u64| (*k, n),
    );

    let (layout, _) = plan.layout();
    assert_eq!((layout.map_arity, layout.reduce_arity), (2, 2));
    let out: Vec<_> = collect(&plan.stream())?.into_iter().map(|e| e.payload).collect();
    assert_kv_collections_equal(out, vec![(1, 2), (2, 1)]);
    Ok(())
}

#[test]
fn test_result_is_independent_of_partition_counts() -> Result<()> {
    let events = pseudo_random_events(500, 13, 100);

    let mut expected: HashMap<u32, u64> = HashMap::new();
    for e in &events {
        *expected.entry(e.payload.0).or_insert(0) += u64::from(e.payload.1);
    }
    let expected: Vec<(u32, u64)> = expected.into_iter().collect();

    for (m, r) in [(1, 1), (2, 3), (4, 4), (7, 2), (3, 8)] {
        let c = TestContainer::parallel(m, r)?;
        let out = sum_per_key(&c, events.clone())?;
        assert_kv_collections_equal(out, expected.clone());
    }
    Ok(())
}

#[test]
fn test_sequential_and_threaded_dispatch_agree() -> Result<()> {
    let events = pseudo_random_events(300, 9, 50);
    let threaded = sum_per_key(&*TestContainer::parallel(4, 3)?, events.clone())?;
    let inline = sum_per_key(&*TestContainer::partitioned(4, 3)?, events)?;
    assert_kv_collections_equal(threaded, inline);
    Ok(())
}

#[test]
fn test_tumbling_windows_keep_their_timestamps() -> Result<()> {
    let events = pseudo_random_events(400, 5, 10);

    let windowed = |c: &QueryContainer| -> Result<Vec<Event<Empty, (u32, u64)>>> {
        let by_key = c.selector("key", |r: &Row| r.0)?;
        let plan = MapReduce::new(
            c,
            MapDefinition::unary(from_events(events.clone()), |s| s, by_key),
            |g| g.aggregate(Windowing::tumbling(25), Count),
            |k: &u32, n: u64| (*k, n),
        );
        Ok(collect(&plan.stream())?)
    };

    let reference = windowed(&QueryContainer::sequential())?;
    let parallel = windowed(&*TestContainer::parallel(5, 3)?)?;

    assert_same_rows(&parallel, &reference);
    assert_sorted_by_sync(&parallel);
    assert_all(&parallel, |e| e.sync_time % 25 == 0 && e.other_time == e.sync_time + 25);
    Ok(())
}

#[test]
fn test_punctuations_reach_subscriber_in_order() -> Result<()> {
    let c = TestContainer::parallel(3, 3)?;
    let by_key = c.selector("key", |r: &Row| r.0)?;
    let plan = MapReduce::new(
        &c,
        MapDefinition::unary(
            EventSource::new(pseudo_random_events(200, 4, 10))
                .with_batch_size(16)?
                .into_stream(),
            |s| s,
            by_key,
        ),
        |g| g.aggregate(Windowing::tumbling(10), Count),
        |k: &u32, n: u64| (*k, n),
    );

    let sink = Collector::<Empty, (u32, u64)>::new();
    let sub = plan.stream().subscribe(sink.clone())?;
    sub.run();

    assert!(sink.is_completed());
    assert!(sink.error().is_none());
    let punctuations = sink.punctuations();
    assert!(!punctuations.is_empty());
    assert_punctuations_non_decreasing(&punctuations);
    assert!(punctuations.iter().all(|t| *t != INFINITY));
    assert_sorted_by_sync(&sink.events());
    sub.dispose();
    Ok(())
}

#[test]
fn test_map_transform_runs_in_every_partition() -> Result<()> {
    let c = TestContainer::parallel(4, 2)?;
    let by_key = c.selector("key", |r: &Row| r.0)?;
    let events = pseudo_random_events(200, 6, 100);
    let expected = events
        .iter()
        .filter(|e| e.payload.1 >= 50)
        .fold(HashMap::new(), |mut acc: HashMap<u32, u64>, e| {
            *acc.entry(e.payload.0).or_insert(0) += 1;
            acc
        });

    let plan = MapReduce::new(
        &c,
        MapDefinition::unary(from_events(events), |s| s.where_(|r: &Row| r.1 >= 50), by_key),
        |g| g.aggregate(Windowing::Global, Count),
        |k: &u32, n: u64| (*k, n),
    );

    let out: Vec<_> = collect(&plan.stream())?.into_iter().map(|e| e.payload).collect();
    assert_kv_collections_equal(out, expected.into_iter().collect());
    Ok(())
}

#[test]
fn test_outer_key_survives_ungroup() -> Result<()> {
    let c = TestContainer::parallel(2, 2)?;
    let by_page = c.selector("page", |v: &PageView| v.page.clone())?;
    let by_user = c.selector("user", |v: &PageView| v.user)?;
    let keyed = group_by(&from_events(page_views()), &by_user);

    let plan = MapReduce::new(
        &c,
        MapDefinition::unary(keyed, |s| s, by_page),
        |g| g.aggregate(Windowing::Global, Count),
        |page: &String, n: u64| (page.clone(), n),
    );

    let out = collect(&plan.stream())?;
    let mut rows: Vec<(u32, String, u64)> = out.into_iter().map(|e| (e.key, e.payload.0, e.payload.1)).collect();
    rows.sort();

    let mut expected: HashMap<(u32, String), u64> = HashMap::new();
    for e in page_views() {
        *expected.entry((e.payload.user, e.payload.page)).or_insert(0) += 1;
    }
    let mut expected: Vec<(u32, String, u64)> = expected.into_iter().map(|((u, p), n)| (u, p, n)).collect();
    expected.sort();

    assert_collections_equal(&rows, &expected);
    Ok(())
}

#[test]
fn test_nested_source_runs_in_one_partition() -> Result<()> {
    let c = TestContainer::parallel(4, 4)?;
    let by_key = c.selector("key", |r: &(u32, char)| r.0)?;
    let nested = EventSource::new(three_rows()).nested().into_stream();
    let plan = MapReduce::new(
        &c,
        MapDefinition::unary(nested, |s| s, by_key),
        |g| g.aggregate(Windowing::Global, Count),
        |k: &u32, n: u64| (*k, n),
    );

    let (layout, decisions) = plan.layout();
    assert_eq!(layout.map_arity, 1);
    assert_eq!(layout.reduce_arity, 1);
    assert!(decisions.contains(&OptimizationDecision::NestedGuard));
    assert!(plan.stream().properties().nested);

    let out: Vec<_> = collect(&plan.stream())?.into_iter().map(|e| e.payload).collect();
    assert_kv_collections_equal(out, vec![(1, 2), (2, 1)]);
    Ok(())
}

#[test]
fn test_empty_source_completes_without_rows() -> Result<()> {
    let c = TestContainer::parallel(3, 2)?;
    let by_key = c.selector("key", |r: &Row| r.0)?;
    let plan = MapReduce::new(
        &c,
        MapDefinition::unary(from_events(Vec::<Event<Empty, Row>>::new()), |s| s, by_key),
        |g| g.aggregate(Windowing::Global, Count),
        |k: &u32, n: u64| (*k, n),
    );

    let out = collect(&plan.stream())?;
    assert!(out.is_empty());
    Ok(())
}

#[test]
fn test_metrics_track_rows_through_the_plan() -> Result<()> {
    let c = TestContainer::parallel(3, 2)?;
    let by_key = c.selector("key", |r: &(u32, char)| r.0)?;
    let plan = MapReduce::new(
        &c,
        MapDefinition::unary(from_events(three_rows()), |s| s, by_key),
        |g| g.aggregate(Windowing::Global, Count),
        |k: &u32, n: u64| (*k, n),
    );
    collect(&plan.stream())?;

    let m = c.metrics();
    assert_eq!(m.plans_built, 1);
    assert_eq!(m.shuffles_skipped, 0);
    assert_eq!(m.rows_sprayed, 3);
    assert_eq!(m.rows_shuffled, 3);
    assert_eq!(m.root_rows, 2);
    // Two gather trees over three inputs (two nodes each) plus one root over two lanes.
    assert_eq!(m.base_merge_nodes + m.internal_merge_nodes, 5);
    assert_eq!(c.scheduler().root_count(), 1);
    Ok(())
}

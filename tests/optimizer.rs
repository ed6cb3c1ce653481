//! Tests for the co-partitioning optimizer: when Shuffle + Gather is skipped, when it is
//! kept, and that both layouts compute the same result.

use anyhow::Result;
use ironstream::partition::keeps_event_key;
use ironstream::physical::optimizer::SprayKind;
use ironstream::testing::*;
use ironstream::*;

type Row = (u32, u32);

fn count_by<F>(c: &QueryContainer, source: Stream<Empty, Row>, reduce: &str, key: F) -> Result<(Vec<(u32, u64)>, PlanExplanation)>
where
    F: Fn(&Row) -> u32 + Send + Sync + 'static,
{
    let reduce_key = c.selector(reduce, key)?;
    let plan = MapReduce::new(
        c,
        MapDefinition::unary(source, |s| s, reduce_key),
        |g| g.aggregate(Windowing::Global, Count),
        |k: &u32, n: u64| (*k, n),
    );
    let explanation = plan.explain();
    let rows = collect(&plan.stream())?.into_iter().map(|e| e.payload).collect();
    Ok((rows, explanation))
}

#[test]
fn test_matching_spray_and_reduce_keys_skip_the_shuffle() -> Result<()> {
    let events = pseudo_random_events(300, 11, 40);

    let fast = TestContainer::parallel(4, 3)?;
    let user = fast.selector("user", |r: &Row| r.0)?;
    let sprayed = EventSource::new(events.clone()).sprayable_by(&user).into_stream();
    let (fast_rows, explanation) = count_by(&fast, sprayed, "user", |r| r.0)?;

    assert!(explanation.skips_shuffle());
    assert_eq!(explanation.reduce_arity(), 4);
    assert!(explanation.optimizations.contains(&OptimizationDecision::SkippedShuffle {
        spray: "user".to_string(),
        reduce: "user".to_string(),
    }));
    assert!(!explanation.steps.iter().any(|s| s.stage == "Shuffle" || s.stage == "Gather"));

    let slow = TestContainer::parallel(4, 3)?;
    let (slow_rows, explanation) = count_by(&slow, from_events(events), "user", |r| r.0)?;
    assert!(!explanation.skips_shuffle());

    assert_kv_collections_equal(fast_rows, slow_rows);

    let m = fast.metrics();
    assert_eq!(m.shuffles_skipped, 1);
    assert_eq!(m.rows_shuffled, 0);
    assert_eq!(m.rows_sprayed, 300);
    Ok(())
}

#[test]
fn test_reduce_key_refining_the_spray_key_skips_the_shuffle() -> Result<()> {
    let c = TestContainer::parallel(3, 2)?;
    let user = c.selector("user", |r: &Row| r.0)?;
    let user_value = c.refining("user+value", user.info(), |r: &Row| (r.0, r.1))?;
    let events = pseudo_random_events(200, 5, 4);
    let source = EventSource::new(events.clone()).sprayable_by(&user).into_stream();

    let plan = MapReduce::new(
        &c,
        MapDefinition::unary(source, |s| s, user_value),
        |g| g.aggregate(Windowing::Global, Count),
        |k: &(u32, u32), n: u64| (*k, n),
    );
    assert!(plan.explain().skips_shuffle());

    let mut expected = std::collections::HashMap::new();
    for e in &events {
        *expected.entry(e.payload).or_insert(0u64) += 1;
    }
    let rows: Vec<((u32, u32), u64)> = collect(&plan.stream())?.into_iter().map(|e| e.payload).collect();
    assert_kv_collections_equal(rows, expected.into_iter().collect());
    Ok(())
}

#[test]
fn test_coarser_reduce_key_keeps_the_shuffle() -> Result<()> {
    let c = TestContainer::parallel(3, 2)?;
    let user_value = c.selector("user+value", |r: &Row| (r.0, r.1))?;
    let user = c.selector("user", |r: &Row| r.0)?;
    c.selectors().declare_refinement(user_value.info(), user.info())?;

    // Sprayed by the finer key: rows of one user may sit in several partitions.
    let source = EventSource::new(pseudo_random_events(200, 5, 4))
        .sprayable_by(&user_value)
        .into_stream();
    let (rows, explanation) = count_by(&c, source, "user", |r| r.0)?;

    assert!(!explanation.skips_shuffle());
    assert!(explanation
        .optimizations
        .iter()
        .any(|d| matches!(d, OptimizationDecision::KeptShuffle { reason } if reason.contains("does not determine"))));

    let total: u64 = rows.iter().map(|(_, n)| n).sum();
    assert_eq!(total, 200);
    assert!(rows.iter().map(|(k, _)| k).collect::<std::collections::HashSet<_>>().len() == rows.len());
    Ok(())
}

#[test]
fn test_anonymous_selectors_never_skip_the_shuffle() -> Result<()> {
    let c = TestContainer::parallel(3, 2)?;
    let spray = KeySelector::anonymous(|r: &Row| r.0);
    let reduce = KeySelector::anonymous(|r: &Row| r.0);
    assert!(spray.info().is_anonymous());
    assert!(!c.selectors().determines(reduce.info(), spray.info()));

    let source = EventSource::new(pseudo_random_events(100, 3, 10))
        .sprayable_by(&spray)
        .into_stream();
    let plan = MapReduce::new(
        &c,
        MapDefinition::unary(source, |s| s, reduce),
        |g| g.aggregate(Windowing::Global, Count),
        |k: &u32, n: u64| (*k, n),
    );

    let (layout, decisions) = plan.layout();
    assert_eq!(layout.strategy, ShuffleStrategy::Shuffle);
    assert!(decisions
        .iter()
        .any(|d| matches!(d, OptimizationDecision::KeptShuffle { reason } if reason.contains("no named spray selector"))));
    Ok(())
}

#[test]
fn test_event_keyed_source_uses_disjoint_gather() -> Result<()> {
    let c = TestContainer::parallel(4, 3)?;
    let user = c.selector("user", |v: &PageView| v.user)?;
    let page = c.selector("page", |v: &PageView| v.page.clone())?;
    let keyed = group_by(&from_events(page_views()), &user);

    let plan = MapReduce::new(
        &c,
        MapDefinition::unary(keyed, |s| s, page),
        |g| g.aggregate(Windowing::Global, Count),
        |page: &String, n: u64| (page.clone(), n),
    );

    let (layout, decisions) = plan.layout();
    assert_eq!(layout.strategy, ShuffleStrategy::Shuffle);
    assert_eq!(layout.gather_variant, MergeVariant::Disjoint);
    assert_eq!(layout.left_spray, SprayKind::EventKey(Some("user".to_string())));
    assert!(decisions.contains(&OptimizationDecision::DisjointGather));

    let rows = collect(&plan.stream())?;
    assert_eq!(rows.iter().map(|e| e.payload.1).sum::<u64>(), 40);
    Ok(())
}

#[test]
fn test_round_robin_source_uses_general_gather() -> Result<()> {
    let c = TestContainer::parallel(4, 3)?;
    let reduce = c.selector("user", |r: &Row| r.0)?;
    let plan = MapReduce::new(
        &c,
        MapDefinition::unary(from_events(pseudo_random_events(10, 2, 2)), |s| s, reduce),
        |g| g.aggregate(Windowing::Global, Count),
        |k: &u32, n: u64| (*k, n),
    );

    let (layout, decisions) = plan.layout();
    assert_eq!(layout.gather_variant, MergeVariant::General);
    assert_eq!(layout.left_spray, SprayKind::RoundRobin);
    assert!(!decisions.contains(&OptimizationDecision::DisjointGather));
    Ok(())
}

#[test]
fn test_explain_renders_every_stage() -> Result<()> {
    let c = TestContainer::parallel(5, 3)?;
    let (_, explanation) = count_by(&c, from_events(pseudo_random_events(10, 2, 2)), "user", |r| r.0)?;

    let stages: Vec<&str> = explanation.steps.iter().map(|s| s.stage.as_str()).collect();
    assert_eq!(stages, vec!["Spray", "Map", "Shuffle", "Gather", "Reduce", "Ungroup", "Merge"]);
    assert_eq!(explanation.final_merge_depth, 2);

    let gather = &explanation.steps[3];
    assert_eq!(gather.instances, 3);
    assert!(gather.description.contains("depth 3"));

    let text = format!("{explanation}");
    println!("{text}");
    assert!(text.contains("MAPREDUCE PHYSICAL PLAN"));
    assert!(text.contains("Step 1: Spray (x5)"));
    assert!(text.contains("shuffle kept"));
    Ok(())
}

#[test]
fn test_rekeying_map_falls_back_to_general_gather() -> Result<()> {
    let c = TestContainer::partitioned(2, 1)?;
    let user = c.selector("user", |r: &Row| r.0)?;
    let value = c.selector("value", |r: &Row| r.1)?;
    let rows: Vec<Event<Empty, Row>> = (0..16u32).map(|i| Event::point(i64::from(i), Empty, (i % 4, i))).collect();
    let keyed = group_by(&from_events(rows), &user);

    let plan = MapReduce::new(
        &c,
        MapDefinition::unary(keyed, |s| group_by(&s, &KeySelector::anonymous(|_: &Row| 0u32)), value),
        |g| g,
        |_: &u32, row: Row| row,
    );

    let (layout, decisions) = plan.layout();
    assert_eq!(layout.strategy, ShuffleStrategy::Shuffle);
    assert_eq!(layout.left_spray, SprayKind::EventKey(Some("user".to_string())));
    assert_eq!(layout.gather_variant, MergeVariant::General);
    assert!(!decisions.contains(&OptimizationDecision::DisjointGather));

    let out = collect(&plan.stream())?;
    assert_eq!(out.len(), 16);
    assert_sorted_by_sync(&out);
    let mut values: Vec<u32> = out.iter().map(|e| e.payload.1).collect();
    values.sort_unstable();
    assert_eq!(values, (0..16).collect::<Vec<_>>());
    Ok(())
}

#[test]
fn test_event_key_survives_only_unchanged_keys() -> Result<()> {
    let c = TestContainer::new();
    let user = c.selector("user", |r: &Row| r.0)?;
    let value = c.selector("value", |r: &Row| r.1)?;
    let by_user: PartitionDescriptor<Row> = PartitionDescriptor::by_event_key(Some(user.info().clone()));
    let by_value: PartitionDescriptor<Row> = PartitionDescriptor::by_event_key(Some(value.info().clone()));
    let by_anon: PartitionDescriptor<Row> =
        PartitionDescriptor::by_event_key(Some(KeySelector::anonymous(|r: &Row| r.0).info().clone()));
    let unnamed: PartitionDescriptor<Row> = PartitionDescriptor::by_event_key(None);

    assert!(keeps_event_key(&by_user, &by_user));
    assert!(keeps_event_key(&unnamed, &unnamed));
    assert!(!keeps_event_key(&by_user, &by_value));
    assert!(!keeps_event_key(&by_user, &by_anon));
    assert!(!keeps_event_key(&by_anon, &by_anon));
    assert!(!keeps_event_key(&by_user, &unnamed));
    assert!(!keeps_event_key(&by_user, &PartitionDescriptor::<Row>::unpartitioned()));
    Ok(())
}

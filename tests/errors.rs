//! Tests for construction-time validation and runtime error propagation.

use anyhow::Result;
use ironstream::physical::map_stage::{BinaryMap, UnaryMap};
use ironstream::testing::*;
use ironstream::*;
use std::sync::Arc;

type Row = (u32, u32);

fn identity() -> UnaryMap<Empty, Row, Row> {
    Arc::new(|s: Stream<Empty, Row>| s)
}

fn keep_left() -> BinaryMap<Empty, Row, Row, Row> {
    Arc::new(|l: Stream<Empty, Row>, _r: Stream<Empty, Row>| l)
}

fn invalid_config_message<T>(result: ironstream::error::Result<T>) -> String {
    match result {
        Err(EngineError::InvalidConfig(msg)) => msg,
        Err(other) => panic!("expected InvalidConfig, got {other}"),
        Ok(_) => panic!("expected InvalidConfig, got Ok"),
    }
}

#[test]
fn test_asymmetric_map_requires_a_right_input() -> Result<()> {
    let c = TestContainer::new();
    let key = c.selector("key", |r: &Row| r.0)?;
    let def = MapDefinition::try_new(
        from_events(three_keyed()),
        None::<Stream<Empty, Row>>,
        MapTransform::Unary(identity()),
        key,
        true,
    );
    assert!(invalid_config_message(def).contains("right input"));
    Ok(())
}

#[test]
fn test_map_transform_must_match_its_inputs() -> Result<()> {
    let c = TestContainer::new();
    let key = c.selector("key", |r: &Row| r.0)?;

    let unary_with_right = MapDefinition::try_new(
        from_events(three_keyed()),
        Some(from_events(three_keyed())),
        MapTransform::Unary(identity()),
        key.clone(),
        false,
    );
    assert!(invalid_config_message(unary_with_right).contains("single-input"));

    let binary_without_right = MapDefinition::try_new(
        from_events(three_keyed()),
        None,
        MapTransform::Binary(keep_left()),
        key.clone(),
        false,
    );
    assert!(invalid_config_message(binary_without_right).contains("two-input"));

    let ok = MapDefinition::try_new(
        from_events(three_keyed()),
        Some(from_events(three_keyed())),
        MapTransform::Binary(keep_left()),
        key,
        true,
    )?;
    assert!(ok.is_left_asymmetric());
    assert_eq!(ok.reduce_key().info().name(), "key");
    Ok(())
}

fn three_keyed() -> Vec<Event<Empty, Row>> {
    keyed_points(vec![(1, 10), (2, 20), (1, 30)])
}

#[test]
fn test_upstream_error_reaches_the_subscriber() -> Result<()> {
    let c = TestContainer::parallel(3, 2)?;
    let key = c.selector("key", |r: &Row| r.0)?;
    let source = EventSource::new(pseudo_random_events(100, 5, 10))
        .with_batch_size(10)?
        .failing_after(2, "disk on fire")
        .into_stream();
    let plan = MapReduce::new(
        &c,
        MapDefinition::unary(source, |s| s, key),
        |g| g.aggregate(Windowing::Global, Count),
        |k: &u32, n: u64| (*k, n),
    );

    let err = collect(&plan.stream()).err().expect("the source fails");
    assert_eq!(
        err.downcast_ref::<EngineError>(),
        Some(&EngineError::Upstream("disk on fire".to_string()))
    );
    assert_eq!(plan.state(), PlanState::Disposed);
    Ok(())
}

#[test]
fn test_error_in_one_pipeline_fails_a_two_pipeline_plan() -> Result<()> {
    let c = TestContainer::parallel(2, 2)?;
    let view_user = c.selector("view.user", |v: &PageView| v.user)?;
    let buy_user = c.selector("buy.user", |p: &Purchase| p.user)?;
    let buys = EventSource::new(purchases()).with_batch_size(3)?.failing_after(1, "ledger offline");

    let plan = Map2Reduce::new(
        &c,
        MapDefinition::unary(from_events(page_views()), |s| s, view_user),
        MapDefinition::unary(buys.into_stream(), |s| s, buy_user),
        |v, b| v.aggregate(Windowing::Global, Count).join(&b.aggregate(Windowing::Global, Count), |x: &u64, y: &u64| x + y),
        |user: &u32, n: u64| (*user, n),
    );

    let sink = Collector::<Empty, (u32, u64)>::new();
    let sub = plan.stream().subscribe(sink.clone())?;
    sub.run();
    sub.dispose();

    assert_eq!(sink.error(), Some(EngineError::Upstream("ledger offline".to_string())));
    assert!(!sink.is_completed());
    assert!(sink.events().is_empty());
    Ok(())
}

#[test]
fn test_zero_batch_size_is_rejected() {
    let source = EventSource::new(three_keyed()).with_batch_size(0);
    assert!(invalid_config_message(source).contains("batch size"));
}

#[test]
fn test_event_keys_must_match_the_declared_selector() -> Result<()> {
    let c = TestContainer::new();
    let by_name = c.selector("name", |r: &Row| format!("user-{}", r.0))?;
    let by_user = c.selector("user", |r: &Row| r.0)?;

    let keyed: Vec<Event<u32, Row>> = three_keyed()
        .into_iter()
        .map(|e| {
            let k = e.payload.0;
            e.with_key(k)
        })
        .collect();

    let wrong = EventSource::new(keyed.clone()).keyed_by(Some(by_name.info()));
    assert!(invalid_config_message(wrong).contains("event keys are"));

    let right = EventSource::new(keyed).keyed_by(Some(by_user.info()))?.into_stream();
    assert_eq!(
        right.properties().partitioning.selector().map(|s| s.name().to_string()),
        Some("user".to_string())
    );
    Ok(())
}

#[test]
fn test_zero_arity_configuration_is_rejected() {
    let result = QueryContainer::new(EngineConfig::sequential().with_reduce_arity(0));
    assert!(invalid_config_message(result).contains("reduce_arity"));
}

#[test]
fn test_errors_render_their_context() {
    let reused = EngineError::PlanReused {
        state: PlanState::Running,
    };
    assert_eq!(reused.to_string(), "plan cannot be subscribed in state Running");

    let lane = EngineError::LaneOutOfRange { lane: 4, arity: 3 };
    assert_eq!(lane.to_string(), "lane 4 out of range for arity 3");

    let upstream = EngineError::Upstream("boom".to_string());
    assert_eq!(upstream.to_string(), "upstream failure: boom");
}

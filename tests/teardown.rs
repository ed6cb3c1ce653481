//! Tests for the plan lifecycle and subscription teardown.

use anyhow::Result;
use ironstream::testing::*;
use ironstream::*;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

type Row = (u32, u32);

fn pass_through(c: &QueryContainer, source: Stream<Empty, Row>) -> Result<Arc<MapReduce<Empty, Row, u32, Row, Row>>> {
    let by_key = c.selector("key", |r: &Row| r.0)?;
    Ok(MapReduce::new(
        c,
        MapDefinition::unary(source, |s| s, by_key),
        |g| g,
        |_: &u32, row: Row| row,
    ))
}

/// Disposes its own subscription on the first batch it sees.
#[derive(Default)]
struct StopAfterFirstBatch {
    subscription: Mutex<Option<Subscription>>,
    rows: AtomicUsize,
    completed: AtomicBool,
}

impl Observer<Empty, Row> for StopAfterFirstBatch {
    fn on_next(&self, batch: Batch<Empty, Row>) {
        self.rows.fetch_add(batch.len(), Ordering::SeqCst);
        if let Some(sub) = self.subscription.lock().unwrap().as_ref() {
            sub.dispose();
        }
    }

    fn on_punctuation(&self, _time: Timestamp) {}

    fn on_completed(&self) {
        self.completed.store(true, Ordering::SeqCst);
    }

    fn on_error(&self, _error: EngineError) {}
}

/// A source whose subscription always fails.
struct Unavailable;

impl Streamable<Empty, Row> for Unavailable {
    fn properties(&self) -> StreamProperties<Row> {
        StreamProperties::default()
    }

    fn subscribe(&self, _observer: ObserverRef<Empty, Row>) -> ironstream::error::Result<Subscription> {
        Err(EngineError::Upstream("source unavailable".to_string()))
    }
}

#[test]
fn test_plan_moves_through_its_states() -> Result<()> {
    let c = TestContainer::parallel(3, 2)?;
    let plan = pass_through(&c, from_events(pseudo_random_events(50, 4, 10)))?;
    assert_eq!(plan.state(), PlanState::Unbuilt);

    let sink = Collector::<Empty, Row>::new();
    let sub = plan.stream().subscribe(sink.clone())?;
    assert_eq!(plan.state(), PlanState::Running);

    sub.run();
    assert!(sink.is_completed());
    assert_eq!(sink.events().len(), 50);
    assert_eq!(plan.state(), PlanState::Running);

    sub.dispose();
    assert_eq!(plan.state(), PlanState::Disposed);
    Ok(())
}

#[test]
fn test_plan_cannot_be_subscribed_twice() -> Result<()> {
    let c = TestContainer::parallel(2, 2)?;
    let plan = pass_through(&c, from_events(pseudo_random_events(10, 2, 10)))?;

    let sub = plan.stream().subscribe(Collector::<Empty, Row>::new())?;
    let again = plan.stream().subscribe(Collector::<Empty, Row>::new());
    assert!(matches!(again, Err(EngineError::PlanReused { state: PlanState::Running })));

    sub.dispose();
    let after = plan.stream().subscribe(Collector::<Empty, Row>::new());
    assert!(matches!(after, Err(EngineError::PlanReused { state: PlanState::Disposed })));
    Ok(())
}

#[test]
fn test_collect_disposes_the_plan() -> Result<()> {
    let c = TestContainer::parallel(2, 2)?;
    let plan = pass_through(&c, from_events(pseudo_random_events(10, 2, 10)))?;
    let out = collect(&plan.stream())?;
    assert_eq!(out.len(), 10);
    assert_eq!(plan.state(), PlanState::Disposed);

    let err = collect(&plan.stream()).err().expect("second collect fails");
    assert_eq!(
        err.downcast_ref::<EngineError>(),
        Some(&EngineError::PlanReused {
            state: PlanState::Disposed
        })
    );
    Ok(())
}

#[test]
fn test_failed_build_is_torn_down() -> Result<()> {
    let c = TestContainer::parallel(3, 2)?;
    let plan = pass_through(&c, Arc::new(Unavailable))?;

    let result = plan.stream().subscribe(Collector::<Empty, Row>::new());
    assert!(matches!(result, Err(EngineError::Upstream(ref msg)) if msg == "source unavailable"));
    assert_eq!(plan.state(), PlanState::Disposed);
    assert_eq!(c.metrics().plans_built, 0);
    Ok(())
}

#[test]
fn test_dispose_before_run_delivers_nothing() -> Result<()> {
    let c = TestContainer::parallel(3, 2)?;
    let plan = pass_through(&c, from_events(pseudo_random_events(30, 3, 10)))?;

    let sink = Collector::<Empty, Row>::new();
    let sub = plan.stream().subscribe(sink.clone())?;
    sub.dispose();
    sub.dispose();
    assert!(sub.is_disposed());

    sub.run();
    assert!(sink.events().is_empty());
    assert!(!sink.is_completed());
    Ok(())
}

#[test]
fn test_dispose_from_an_observer_stops_the_sources() -> Result<()> {
    let c = TestContainer::partitioned(2, 2)?;
    let source = EventSource::new(pseudo_random_events(200, 4, 10))
        .with_batch_size(1)?
        .into_stream();
    let plan = pass_through(&c, source)?;

    let observer = Arc::new(StopAfterFirstBatch::default());
    let sub = plan.stream().subscribe(observer.clone())?;
    *observer.subscription.lock().unwrap() = Some(sub.clone());
    sub.run();

    let seen = observer.rows.load(Ordering::SeqCst);
    assert!(seen > 0);
    assert!(seen < 200, "delivery continued after dispose: {seen} rows");
    assert!(!observer.completed.load(Ordering::SeqCst));
    assert_eq!(plan.state(), PlanState::Disposed);
    Ok(())
}

#[test]
fn test_subscriptions_absorb_children() {
    let parent = Subscription::new();
    let child = Subscription::new();
    let flag = Arc::new(AtomicBool::new(false));
    let seen = Arc::clone(&flag);
    child.add_disposable(Arc::new(ironstream::subscription::OnDispose(move || {
        seen.store(true, Ordering::SeqCst);
    })));

    parent.absorb(child.clone());
    assert_eq!(parent.len(), 1);
    assert!(child.is_empty());

    parent.dispose();
    assert!(flag.load(Ordering::SeqCst));

    // Children added after disposal are disposed at once.
    let late = Arc::new(AtomicBool::new(false));
    let seen = Arc::clone(&late);
    parent.add_disposable(Arc::new(ironstream::subscription::OnDispose(move || {
        seen.store(true, Ordering::SeqCst);
    })));
    assert!(late.load(Ordering::SeqCst));
}

#[test]
fn test_children_added_while_disposing_are_never_lost() {
    for _ in 0..200 {
        let parent = Subscription::new();
        let disposed = Arc::new(AtomicUsize::new(0));
        let added = 64;

        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    for _ in 0..added / 4 {
                        let count = Arc::clone(&disposed);
                        parent.add_disposable(Arc::new(ironstream::subscription::OnDispose(move || {
                            count.fetch_add(1, Ordering::SeqCst);
                        })));
                    }
                });
            }
            scope.spawn(|| parent.dispose());
        });

        assert!(parent.is_disposed());
        assert!(parent.is_empty());
        assert_eq!(disposed.load(Ordering::SeqCst), added);
    }
}

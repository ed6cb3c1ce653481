//! Map/reduce plan builders.
//!
//! A plan is assembled as
//!
//! ```text
//! Spray → Map → (Shuffle → Gather | local group) → Reduce → Ungroup → Merge
//! ```
//!
//! [`MapReduce`] runs one map pipeline; [`Map2Reduce`] runs two independent pipelines and
//! feeds lane `j` of each into a two-input reducer. Nothing is built until the plan is
//! subscribed, and a plan can be subscribed exactly once:
//!
//! ```text
//! Unbuilt ──subscribe──▶ Building ──ok──▶ Running ──dispose──▶ Disposed
//!                            └──────────err─────────────────────▲
//! ```

use crate::container::QueryContainer;
use crate::error::{EngineError, Result};
use crate::event::{CompoundGroupKey, Empty, StreamData, StreamKey};
use crate::ops::group::group_nested;
use crate::partition::{PartitionDescriptor, Partitioning, keeps_event_key, same_spray};
use crate::physical::explain::PlanExplanation;
use crate::physical::gather::gather;
use crate::physical::map_stage::{BinaryMap, UnaryMap, map_binary, map_unary};
use crate::physical::merge::{MergeVariant, merge_streams};
use crate::physical::optimizer::{
    OptimizationDecision, ShuffleStrategy, SideLayout, SideProfile, SprayKind, plan_pair, plan_side,
};
use crate::physical::reduce_stage::{BinaryReducer, UnaryReducer, reduce_binary, reduce_unary};
use crate::physical::shuffle::ShuffleNode;
use crate::physical::spray::{SprayMode, SprayNode};
use crate::physical::ungroup::{ResultConstructor, ungroup};
use crate::scheduler::Scheduler;
use crate::selector::{KeySelector, SelectorRegistry};
use crate::stream::{ObserverRef, Stream, StreamProperties, Streamable};
use crate::subscription::{OnDispose, Subscription};
use std::marker::PhantomData;
use std::sync::{Arc, Mutex};
use tracing::info;

/// Lifecycle of a plan.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlanState {
    Unbuilt,
    Building,
    Running,
    Disposed,
}

/// Hint attached to a two-input map.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OperationalHint {
    #[default]
    None,
    /// Broadcast the left input to every partition; spray only the right one.
    Asymmetric,
}

/// The per-partition map transform of a [`MapDefinition`].
pub enum MapTransform<K, P, P2, Q> {
    Unary(UnaryMap<K, P, Q>),
    Binary(BinaryMap<K, P, P2, Q>),
}

/// Inputs, map transform and reduce key of one map pipeline.
pub struct MapDefinition<K, P, Q, RK, P2 = Empty> {
    left: Stream<K, P>,
    right: Option<Stream<K, P2>>,
    map: MapTransform<K, P, P2, Q>,
    reduce_key: KeySelector<Q, RK>,
    left_asymmetric: bool,
}

impl<K, P, Q, RK> MapDefinition<K, P, Q, RK, Empty>
where
    K: StreamKey,
    P: StreamData,
    Q: StreamData,
    RK: StreamKey,
{
    /// A single-input pipeline.
    pub fn unary<F>(source: Stream<K, P>, map: F, reduce_key: KeySelector<Q, RK>) -> Self
    where
        F: Fn(Stream<K, P>) -> Stream<K, Q> + Send + Sync + 'static,
    {
        Self {
            left: source,
            right: None,
            map: MapTransform::Unary(Arc::new(map)),
            reduce_key,
            left_asymmetric: false,
        }
    }
}

impl<K, P, Q, RK, P2> MapDefinition<K, P, Q, RK, P2>
where
    K: StreamKey,
    P: StreamData,
    Q: StreamData,
    RK: StreamKey,
    P2: StreamData,
{
    /// A two-input pipeline. With [`OperationalHint::Asymmetric`] the left input is
    /// broadcast to every map partition.
    pub fn binary<F>(
        left: Stream<K, P>,
        right: Stream<K, P2>,
        map: F,
        reduce_key: KeySelector<Q, RK>,
        hint: OperationalHint,
    ) -> Self
    where
        F: Fn(Stream<K, P>, Stream<K, P2>) -> Stream<K, Q> + Send + Sync + 'static,
    {
        Self {
            left,
            right: Some(right),
            map: MapTransform::Binary(Arc::new(map)),
            reduce_key,
            left_asymmetric: hint == OperationalHint::Asymmetric,
        }
    }

    /// Checked constructor.
    ///
    /// # Errors
    /// `InvalidConfig` if `left_asymmetric` is set without a right input, or if the
    /// transform's arity does not match the inputs.
    pub fn try_new(
        left: Stream<K, P>,
        right: Option<Stream<K, P2>>,
        map: MapTransform<K, P, P2, Q>,
        reduce_key: KeySelector<Q, RK>,
        left_asymmetric: bool,
    ) -> Result<Self> {
        if left_asymmetric && right.is_none() {
            return Err(EngineError::invalid("left-asymmetric map requires a right input"));
        }
        match (&map, &right) {
            (MapTransform::Unary(_), None) | (MapTransform::Binary(_), Some(_)) => {}
            (MapTransform::Unary(_), Some(_)) => {
                return Err(EngineError::invalid("single-input map given a right input"));
            }
            (MapTransform::Binary(_), None) => {
                return Err(EngineError::invalid("two-input map without a right input"));
            }
        }
        Ok(Self {
            left,
            right,
            map,
            reduce_key,
            left_asymmetric,
        })
    }

    pub fn is_left_asymmetric(&self) -> bool {
        self.left_asymmetric
    }

    pub fn reduce_key(&self) -> &KeySelector<Q, RK> {
        &self.reduce_key
    }
}

fn spray_kind<X>(d: &PartitionDescriptor<X>) -> SprayKind {
    match d.partitioning() {
        Partitioning::Unpartitioned => SprayKind::RoundRobin,
        Partitioning::ByEventKey(info) => SprayKind::EventKey(info.as_ref().map(|i| i.name().to_string())),
        Partitioning::ByPayload(key) => SprayKind::Payload(key.info().name().to_string()),
    }
}

fn is_event_keyed<X>(d: &PartitionDescriptor<X>) -> bool {
    matches!(d.partitioning(), Partitioning::ByEventKey(_))
}

/// Inputs of a symmetric two-input map are sprayed by event key when nothing better is
/// known, so both sides land on the same partition index for equal keys.
fn symmetric_input<X>(props: StreamProperties<X>) -> StreamProperties<X> {
    match props.partitioning.partitioning() {
        Partitioning::Unpartitioned => StreamProperties {
            partitioning: PartitionDescriptor::by_event_key(None),
            ..props
        },
        _ => props,
    }
}

/// Properties of one sprayed partition of an input with `props`.
fn partition_properties<X>(props: &StreamProperties<X>, broadcast: bool) -> StreamProperties<X> {
    StreamProperties {
        partitioning: if broadcast {
            PartitionDescriptor::unpartitioned()
        } else {
            props.partitioning.clone()
        },
        key_distinct: props.key_distinct,
        nested: true,
    }
}

/// A partition that only answers `properties()`. Applying the map transform to it shows
/// how the transform keys its output without building anything.
struct PartitionShape<K, X> {
    properties: StreamProperties<X>,
    _k: PhantomData<fn() -> K>,
}

impl<K, X: StreamData> PartitionShape<K, X> {
    fn stream(properties: StreamProperties<X>) -> Stream<K, X>
    where
        K: StreamKey,
    {
        Arc::new(Self {
            properties,
            _k: PhantomData,
        })
    }
}

impl<K: StreamKey, X: StreamData> Streamable<K, X> for PartitionShape<K, X> {
    fn properties(&self) -> StreamProperties<X> {
        self.properties.clone()
    }

    fn subscribe(&self, _observer: ObserverRef<K, X>) -> Result<Subscription> {
        Err(EngineError::invalid("a partition shape cannot be subscribed"))
    }
}

/// A map pipeline with its input payload types erased.
pub(crate) trait MapSide<K, Q, RK>: Send + Sync {
    fn nested(&self) -> bool;
    fn binary(&self) -> bool;
    fn profile(&self, registry: &SelectorRegistry) -> SideProfile;
    /// Build Spray, Map and Shuffle/Gather (or the local group). Returns one stream per
    /// reduce partition.
    fn build(
        &self,
        scheduler: &Arc<Scheduler>,
        layout: &SideLayout,
        sub: &Subscription,
    ) -> Result<Vec<Stream<CompoundGroupKey<K, RK>, Q>>>;
}

impl<K, P, Q, RK, P2> MapDefinition<K, P, Q, RK, P2>
where
    K: StreamKey,
    P: StreamData,
    Q: StreamData,
    RK: StreamKey,
    P2: StreamData,
{
    /// Input properties as the sprays will see them.
    fn input_properties(&self) -> (StreamProperties<P>, Option<StreamProperties<P2>>) {
        let lp = self.left.properties();
        let rp = self.right.as_ref().map(|r| r.properties());
        match rp {
            Some(rp) if !self.left_asymmetric => (symmetric_input(lp), Some(symmetric_input(rp))),
            rp => (lp, rp),
        }
    }

    /// Properties of one map output partition.
    fn mapped_partition(&self, lp: &StreamProperties<P>, rp: Option<&StreamProperties<P2>>) -> StreamProperties<Q> {
        let left = PartitionShape::<K, P>::stream(partition_properties(lp, self.left_asymmetric));
        match (&self.map, rp) {
            (MapTransform::Binary(f), Some(rp)) => {
                f(left, PartitionShape::<K, P2>::stream(partition_properties(rp, false))).properties()
            }
            (MapTransform::Unary(f), _) => f(left).properties(),
            (MapTransform::Binary(_), None) => StreamProperties::default(),
        }
    }
}

impl<K, P, Q, RK, P2> MapSide<K, Q, RK> for MapDefinition<K, P, Q, RK, P2>
where
    K: StreamKey,
    P: StreamData,
    Q: StreamData,
    RK: StreamKey,
    P2: StreamData,
{
    fn nested(&self) -> bool {
        self.left.properties().nested || self.right.as_ref().is_some_and(|r| r.properties().nested)
    }

    fn binary(&self) -> bool {
        self.right.is_some()
    }

    fn profile(&self, registry: &SelectorRegistry) -> SideProfile {
        let (lp, rp) = self.input_properties();
        let reduce = self.reduce_key.info().clone();
        let co_sprayed = match &rp {
            Some(rp) if !self.left_asymmetric => same_spray(&lp.partitioning, &rp.partitioning),
            _ => true,
        };
        let spray_selector = if self.left_asymmetric {
            rp.as_ref().and_then(|p| p.partitioning.selector().cloned())
        } else {
            lp.partitioning.selector().cloned()
        };
        // Broadcast rows can surface in any partition, so an asymmetric map never qualifies.
        let reduce_compatible =
            !self.left_asymmetric && co_sprayed && lp.partitioning.is_compatible_with(registry, &reduce);
        let disjoint_partitions = !self.left_asymmetric
            && co_sprayed
            && is_event_keyed(&lp.partitioning)
            && rp.as_ref().is_none_or(|p| is_event_keyed(&p.partitioning))
            && keeps_event_key(&lp.partitioning, &self.mapped_partition(&lp, rp.as_ref()).partitioning);
        SideProfile {
            nested: lp.nested || rp.as_ref().is_some_and(|p| p.nested),
            binary: rp.is_some(),
            left_asymmetric: self.left_asymmetric,
            left_spray: if self.left_asymmetric {
                SprayKind::Broadcast
            } else {
                spray_kind(&lp.partitioning)
            },
            right_spray: rp.as_ref().map(|p| spray_kind(&p.partitioning)),
            co_sprayed,
            spray_selector,
            reduce_key: reduce,
            reduce_compatible,
            disjoint_partitions,
        }
    }

    fn build(
        &self,
        scheduler: &Arc<Scheduler>,
        layout: &SideLayout,
        sub: &Subscription,
    ) -> Result<Vec<Stream<CompoundGroupKey<K, RK>, Q>>> {
        let m = layout.map_arity;
        let (lp, rp) = self.input_properties();
        let left_mode = if self.left_asymmetric {
            SprayMode::Broadcast
        } else {
            SprayMode::from_descriptor(&lp.partitioning)
        };
        let left_spray = SprayNode::new(m, left_mode, &lp, scheduler)?;
        sub.add_disposable(Arc::new(left_spray.dispose_flag().clone()));
        let lefts = left_spray.partitions();

        let mapped = match (&self.map, &self.right) {
            (MapTransform::Unary(f), None) => map_unary(f, lefts),
            (MapTransform::Binary(f), Some(right)) => {
                let rp = rp.unwrap_or_else(|| right.properties());
                let right_spray = SprayNode::new(m, SprayMode::from_descriptor(&rp.partitioning), &rp, scheduler)?;
                sub.add_disposable(Arc::new(right_spray.dispose_flag().clone()));
                let mapped = map_binary(f, lefts, right_spray.partitions())?;
                sub.absorb(right.subscribe(right_spray)?);
                mapped
            }
            _ => return Err(EngineError::invalid("map transform does not match its inputs")),
        };
        sub.absorb(self.left.subscribe(left_spray)?);

        match layout.strategy {
            ShuffleStrategy::LocalGroup => Ok(mapped.iter().map(|s| group_nested(s, &self.reduce_key)).collect()),
            ShuffleStrategy::Shuffle => {
                let shuffles = mapped
                    .iter()
                    .enumerate()
                    .map(|(i, s)| {
                        let node = ShuffleNode::new(i, layout.reduce_arity, self.reduce_key.clone(), true, scheduler)?;
                        sub.add_disposable(Arc::new(node.dispose_flag().clone()));
                        sub.absorb(s.subscribe(node.clone())?);
                        Ok(node)
                    })
                    .collect::<Result<Vec<_>>>()?;
                (0..layout.reduce_arity)
                    .map(|lane| gather(lane, &shuffles, layout.gather_variant, scheduler))
                    .collect()
            }
        }
    }
}

/// Shared lifecycle handling for both plan kinds.
struct Lifecycle {
    state: Arc<Mutex<PlanState>>,
}

impl Lifecycle {
    fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(PlanState::Unbuilt)),
        }
    }

    fn get(&self) -> PlanState {
        *self.state.lock().unwrap()
    }

    fn set(&self, s: PlanState) {
        *self.state.lock().unwrap() = s;
    }

    /// Move `Unbuilt → Building`, or report the state that prevents it.
    fn begin(&self) -> Result<()> {
        let mut st = self.state.lock().unwrap();
        if *st != PlanState::Unbuilt {
            return Err(EngineError::PlanReused { state: *st });
        }
        *st = PlanState::Building;
        Ok(())
    }

    /// Finish a build attempt and hand out the subscription.
    fn finish(&self, sub: Subscription, built: Result<()>) -> Result<Subscription> {
        match built {
            Ok(()) => {
                self.set(PlanState::Running);
                let state = Arc::clone(&self.state);
                sub.add_disposable(Arc::new(OnDispose(move || {
                    *state.lock().unwrap() = PlanState::Disposed;
                })));
                Ok(sub)
            }
            Err(e) => {
                sub.dispose();
                self.set(PlanState::Disposed);
                Err(e)
            }
        }
    }
}

/// A single-pipeline map/reduce plan.
///
/// ```
/// use ironstream::*;
///
/// # fn main() -> anyhow::Result<()> {
/// let container = QueryContainer::new(EngineConfig::sequential().with_map_arity(2).with_reduce_arity(2))?;
/// let source = from_points(vec![(1, (1u32, "A")), (2, (2u32, "B")), (3, (1u32, "C"))]);
/// let by_key = container.selector("k", |v: &(u32, &'static str)| v.0)?;
/// let def = MapDefinition::unary(source, |s| s, by_key);
/// let plan = MapReduce::new(
///     &container,
///     def,
///     |lane| aggregate(&lane, Windowing::Global, Count),
///     |k: &u32, n: u64| (*k, n),
/// );
/// let mut out: Vec<_> = collect(&plan.stream())?.into_iter().map(|e| e.payload).collect();
/// out.sort();
/// assert_eq!(out, vec![(1, 2), (2, 1)]);
/// # Ok(())
/// # }
/// ```
pub struct MapReduce<K, Q, RK, R, O> {
    container: QueryContainer,
    side: Box<dyn MapSide<K, Q, RK>>,
    reducer: UnaryReducer<K, RK, Q, R>,
    result: ResultConstructor<RK, R, O>,
    lifecycle: Lifecycle,
}

impl<K, Q, RK, R, O> MapReduce<K, Q, RK, R, O>
where
    K: StreamKey,
    Q: StreamData,
    RK: StreamKey,
    R: StreamData,
    O: StreamData,
{
    pub fn new<P, P2, F, G>(
        container: &QueryContainer,
        definition: MapDefinition<K, P, Q, RK, P2>,
        reducer: F,
        result: G,
    ) -> Arc<Self>
    where
        P: StreamData,
        P2: StreamData,
        F: Fn(Stream<CompoundGroupKey<K, RK>, Q>) -> Stream<CompoundGroupKey<K, RK>, R> + Send + Sync + 'static,
        G: Fn(&RK, R) -> O + Send + Sync + 'static,
    {
        Arc::new(Self {
            container: container.clone(),
            side: Box::new(definition),
            reducer: Arc::new(reducer),
            result: Arc::new(result),
            lifecycle: Lifecycle::new(),
        })
    }

    pub fn state(&self) -> PlanState {
        self.lifecycle.get()
    }

    /// This plan as a [`Stream`].
    pub fn stream(self: &Arc<Self>) -> Stream<K, O> {
        Arc::clone(self) as Stream<K, O>
    }

    /// The layout the plan would be built with, and why.
    pub fn layout(&self) -> (SideLayout, Vec<OptimizationDecision>) {
        let scheduler = self.container.scheduler();
        let profile = self.side.profile(self.container.selectors());
        plan_side(&profile, scheduler.arity(profile.nested))
    }

    /// Describe the physical plan without building it.
    pub fn explain(&self) -> PlanExplanation {
        let (layout, decisions) = self.layout();
        PlanExplanation::new("MapReduce", &[(layout, self.side.binary())], false, decisions)
    }

    fn build(&self, observer: ObserverRef<K, O>, sub: &Subscription) -> Result<()> {
        let scheduler = self.container.scheduler();
        let (layout, _) = self.layout();
        info!(
            map_arity = layout.map_arity,
            reduce_arity = layout.reduce_arity,
            strategy = %layout.strategy,
            "building map/reduce plan"
        );
        let lanes = self.side.build(scheduler, &layout, sub)?;
        let outputs: Vec<Stream<K, O>> = reduce_unary(&self.reducer, lanes)
            .into_iter()
            .map(|s| ungroup(s, Arc::clone(&self.result)))
            .collect();
        let merged = merge_streams(outputs, MergeVariant::General, scheduler, Some("map-reduce"))?;
        sub.absorb(merged.subscribe(observer)?);
        scheduler
            .metrics()
            .plan_built(layout.strategy == ShuffleStrategy::LocalGroup);
        Ok(())
    }
}

impl<K, Q, RK, R, O> Streamable<K, O> for MapReduce<K, Q, RK, R, O>
where
    K: StreamKey,
    Q: StreamData,
    RK: StreamKey,
    R: StreamData,
    O: StreamData,
{
    fn properties(&self) -> StreamProperties<O> {
        StreamProperties::default().with_nested(self.side.nested())
    }

    fn subscribe(&self, observer: ObserverRef<K, O>) -> Result<Subscription> {
        self.lifecycle.begin()?;
        let sub = Subscription::new();
        let built = self.build(observer, &sub);
        self.lifecycle.finish(sub, built)
    }
}

/// A two-pipeline map/reduce plan.
///
/// Both pipelines are laid out with the same reduce arity; lane `j` of the first and lane
/// `j` of the second feed the same two-input reducer.
pub struct Map2Reduce<K, Q1, Q2, RK, R, O> {
    container: QueryContainer,
    first: Box<dyn MapSide<K, Q1, RK>>,
    second: Box<dyn MapSide<K, Q2, RK>>,
    reducer: BinaryReducer<K, RK, Q1, Q2, R>,
    result: ResultConstructor<RK, R, O>,
    lifecycle: Lifecycle,
}

impl<K, Q1, Q2, RK, R, O> Map2Reduce<K, Q1, Q2, RK, R, O>
where
    K: StreamKey,
    Q1: StreamData,
    Q2: StreamData,
    RK: StreamKey,
    R: StreamData,
    O: StreamData,
{
    pub fn new<P, PA, PB, PC, F, G>(
        container: &QueryContainer,
        first: MapDefinition<K, P, Q1, RK, PA>,
        second: MapDefinition<K, PB, Q2, RK, PC>,
        reducer: F,
        result: G,
    ) -> Arc<Self>
    where
        P: StreamData,
        PA: StreamData,
        PB: StreamData,
        PC: StreamData,
        F: Fn(Stream<CompoundGroupKey<K, RK>, Q1>, Stream<CompoundGroupKey<K, RK>, Q2>) -> Stream<CompoundGroupKey<K, RK>, R>
            + Send
            + Sync
            + 'static,
        G: Fn(&RK, R) -> O + Send + Sync + 'static,
    {
        Arc::new(Self {
            container: container.clone(),
            first: Box::new(first),
            second: Box::new(second),
            reducer: Arc::new(reducer),
            result: Arc::new(result),
            lifecycle: Lifecycle::new(),
        })
    }

    pub fn state(&self) -> PlanState {
        self.lifecycle.get()
    }

    pub fn stream(self: &Arc<Self>) -> Stream<K, O> {
        Arc::clone(self) as Stream<K, O>
    }

    fn nested(&self) -> bool {
        self.first.nested() || self.second.nested()
    }

    pub fn layout(&self) -> (SideLayout, SideLayout, Vec<OptimizationDecision>) {
        let registry = self.container.selectors();
        let mut a = self.first.profile(registry);
        let mut b = self.second.profile(registry);
        let nested = self.nested();
        a.nested = nested;
        b.nested = nested;
        plan_pair(&a, &b, self.container.scheduler().arity(nested))
    }

    pub fn explain(&self) -> PlanExplanation {
        let (a, b, decisions) = self.layout();
        PlanExplanation::new(
            "Map2Reduce",
            &[(a, self.first.binary()), (b, self.second.binary())],
            true,
            decisions,
        )
    }

    fn build(&self, observer: ObserverRef<K, O>, sub: &Subscription) -> Result<()> {
        let scheduler = self.container.scheduler();
        let (a, b, _) = self.layout();
        info!(
            map_arity = a.map_arity,
            second_map_arity = b.map_arity,
            reduce_arity = a.reduce_arity,
            strategy = %a.strategy,
            "building two-pipeline map/reduce plan"
        );
        let first = self.first.build(scheduler, &a, sub)?;
        let second = self.second.build(scheduler, &b, sub)?;
        let outputs: Vec<Stream<K, O>> = reduce_binary(&self.reducer, first, second)?
            .into_iter()
            .map(|s| ungroup(s, Arc::clone(&self.result)))
            .collect();
        let merged = merge_streams(outputs, MergeVariant::General, scheduler, Some("map2-reduce"))?;
        sub.absorb(merged.subscribe(observer)?);
        scheduler
            .metrics()
            .plan_built(a.strategy == ShuffleStrategy::LocalGroup);
        Ok(())
    }
}

impl<K, Q1, Q2, RK, R, O> Streamable<K, O> for Map2Reduce<K, Q1, Q2, RK, R, O>
where
    K: StreamKey,
    Q1: StreamData,
    Q2: StreamData,
    RK: StreamKey,
    R: StreamData,
    O: StreamData,
{
    fn properties(&self) -> StreamProperties<O> {
        StreamProperties::default().with_nested(self.nested())
    }

    fn subscribe(&self, observer: ObserverRef<K, O>) -> Result<Subscription> {
        self.lifecycle.begin()?;
        let sub = Subscription::new();
        let built = self.build(observer, &sub);
        self.lifecycle.finish(sub, built)
    }
}

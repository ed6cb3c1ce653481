//! Operators of the surrounding runtime.
//!
//! The physical map/reduce planner composes over these through the [`Streamable`] contract
//! only. They are deliberately small: enough to feed, transform, aggregate, join and collect
//! keyed event streams.
//!
//! Every operator here is a lazy description. State (accumulators, join tables, merge
//! buffers) is created inside `subscribe`, so the same description can be instantiated
//! in every partition without sharing anything between them.

pub mod aggregate;
pub mod group;
pub mod join;
pub mod sink;
pub mod source;
pub mod stateless;

use crate::combiners::CombineFn;
use crate::error::Result;
use crate::event::{StreamData, StreamKey};
use crate::selector::KeySelector;
use crate::stream::{ObserverRef, Stream, StreamProperties, Streamable};
use crate::subscription::Subscription;
use crate::window::Windowing;
use std::sync::Arc;

type UnaryFactory<K, P, K2, Q> = Arc<dyn Fn(ObserverRef<K2, Q>) -> ObserverRef<K, P> + Send + Sync>;
type BinaryFactory<K, P, P2, Q> =
    Arc<dyn Fn(ObserverRef<K, Q>) -> (ObserverRef<K, P>, ObserverRef<K, P2>) + Send + Sync>;

/// One input, one output; `factory` builds the per-subscription observer.
pub(crate) struct UnaryStreamable<K, P, K2, Q> {
    input: Stream<K, P>,
    properties: StreamProperties<Q>,
    factory: UnaryFactory<K, P, K2, Q>,
}

impl<K, P, K2, Q> Streamable<K2, Q> for UnaryStreamable<K, P, K2, Q>
where
    K: StreamData,
    P: StreamData,
    K2: StreamData,
    Q: StreamData,
{
    fn properties(&self) -> StreamProperties<Q> {
        self.properties.clone()
    }

    fn subscribe(&self, observer: ObserverRef<K2, Q>) -> Result<Subscription> {
        self.input.subscribe((self.factory)(observer))
    }
}

pub(crate) fn unary<K, P, K2, Q, F>(input: Stream<K, P>, properties: StreamProperties<Q>, factory: F) -> Stream<K2, Q>
where
    K: StreamData,
    P: StreamData,
    K2: StreamData,
    Q: StreamData,
    F: Fn(ObserverRef<K2, Q>) -> ObserverRef<K, P> + Send + Sync + 'static,
{
    Arc::new(UnaryStreamable {
        input,
        properties,
        factory: Arc::new(factory),
    })
}

/// Two inputs sharing a key type, one output.
pub(crate) struct BinaryStreamable<K, P, P2, Q> {
    left: Stream<K, P>,
    right: Stream<K, P2>,
    properties: StreamProperties<Q>,
    factory: BinaryFactory<K, P, P2, Q>,
}

impl<K, P, P2, Q> Streamable<K, Q> for BinaryStreamable<K, P, P2, Q>
where
    K: StreamData,
    P: StreamData,
    P2: StreamData,
    Q: StreamData,
{
    fn properties(&self) -> StreamProperties<Q> {
        self.properties.clone()
    }

    fn subscribe(&self, observer: ObserverRef<K, Q>) -> Result<Subscription> {
        let (l, r) = (self.factory)(observer);
        let sub = self.left.subscribe(l)?;
        match self.right.subscribe(r) {
            Ok(right) => sub.absorb(right),
            Err(e) => {
                sub.dispose();
                return Err(e);
            }
        }
        Ok(sub)
    }
}

pub(crate) fn binary<K, P, P2, Q, F>(
    left: Stream<K, P>,
    right: Stream<K, P2>,
    properties: StreamProperties<Q>,
    factory: F,
) -> Stream<K, Q>
where
    K: StreamData,
    P: StreamData,
    P2: StreamData,
    Q: StreamData,
    F: Fn(ObserverRef<K, Q>) -> (ObserverRef<K, P>, ObserverRef<K, P2>) + Send + Sync + 'static,
{
    Arc::new(BinaryStreamable {
        left,
        right,
        properties,
        factory: Arc::new(factory),
    })
}

/// Method-call syntax for the operators in this module.
///
/// ```
/// use ironstream::*;
///
/// # fn main() -> anyhow::Result<()> {
/// let s = from_points(vec![(1, 4u32), (2, 7), (3, 10)]);
/// let out = collect(&s.where_(|v| *v > 5).select(|v| v * 2))?;
/// assert_eq!(out.iter().map(|e| e.payload).collect::<Vec<_>>(), vec![14, 20]);
/// # Ok(())
/// # }
/// ```
pub trait StreamExt<K, P> {
    fn select<Q, F>(&self, f: F) -> Stream<K, Q>
    where
        Q: StreamData,
        F: Fn(&P) -> Q + Send + Sync + 'static;

    fn where_<F>(&self, pred: F) -> Stream<K, P>
    where
        F: Fn(&P) -> bool + Send + Sync + 'static;

    fn group_by<K2: StreamKey>(&self, selector: &KeySelector<P, K2>) -> Stream<K2, P>;

    fn aggregate<A, O, C>(&self, windowing: Windowing, comb: C) -> Stream<K, O>
    where
        K: StreamKey,
        A: Send + 'static,
        O: StreamData,
        C: CombineFn<P, A, O>;

    fn join<R, O, F>(&self, right: &Stream<K, R>, result: F) -> Stream<K, O>
    where
        K: StreamKey,
        R: StreamData,
        O: StreamData,
        F: Fn(&P, &R) -> O + Send + Sync + 'static;
}

impl<K: StreamData, P: StreamData> StreamExt<K, P> for Stream<K, P> {
    fn select<Q, F>(&self, f: F) -> Stream<K, Q>
    where
        Q: StreamData,
        F: Fn(&P) -> Q + Send + Sync + 'static,
    {
        stateless::select(self, f)
    }

    fn where_<F>(&self, pred: F) -> Stream<K, P>
    where
        F: Fn(&P) -> bool + Send + Sync + 'static,
    {
        stateless::where_(self, pred)
    }

    fn group_by<K2: StreamKey>(&self, selector: &KeySelector<P, K2>) -> Stream<K2, P> {
        group::group_by(self, selector)
    }

    fn aggregate<A, O, C>(&self, windowing: Windowing, comb: C) -> Stream<K, O>
    where
        K: StreamKey,
        A: Send + 'static,
        O: StreamData,
        C: CombineFn<P, A, O>,
    {
        aggregate::aggregate(self, windowing, comb)
    }

    fn join<R, O, F>(&self, right: &Stream<K, R>, result: F) -> Stream<K, O>
    where
        K: StreamKey,
        R: StreamData,
        O: StreamData,
        F: Fn(&P, &R) -> O + Send + Sync + 'static,
    {
        join::join(self, right, result)
    }
}

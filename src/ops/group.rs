//! Re-keying operators.
//!
//! `group_by` replaces the event key with a key computed from the payload and records the
//! selector in the output's partition descriptor, so a later spray can route by event key.
//! `group_nested` pairs the existing key with a reduce key; the physical planner uses it
//! as the local group when a shuffle can be skipped.

use crate::error::EngineError;
use crate::event::{Batch, CompoundGroupKey, StreamData, StreamKey, Timestamp};
use crate::ops::unary;
use crate::partition::PartitionDescriptor;
use crate::selector::KeySelector;
use crate::stream::{Observer, ObserverRef, Stream, StreamProperties};
use std::marker::PhantomData;
use std::sync::Arc;

struct RekeyObserver<K, P, K2, F> {
    rekey: F,
    down: ObserverRef<K2, P>,
    _k: PhantomData<fn(K)>,
}

impl<K, P, K2, F> Observer<K, P> for RekeyObserver<K, P, K2, F>
where
    K: StreamData,
    P: StreamData,
    K2: StreamData,
    F: Fn(&K, &P) -> K2 + Send + Sync,
{
    fn on_next(&self, batch: Batch<K, P>) {
        let out: Batch<K2, P> = batch
            .into_iter()
            .map(|e| {
                let k2 = (self.rekey)(&e.key, &e.payload);
                e.with_key(k2)
            })
            .collect();
        self.down.on_next(out);
    }

    fn on_punctuation(&self, time: Timestamp) {
        self.down.on_punctuation(time);
    }

    fn on_completed(&self) {
        self.down.on_completed();
    }

    fn on_error(&self, error: EngineError) {
        self.down.on_error(error);
    }
}

/// Replace each event key with `selector(payload)`.
pub fn group_by<K, P, K2>(input: &Stream<K, P>, selector: &KeySelector<P, K2>) -> Stream<K2, P>
where
    K: StreamData,
    P: StreamData,
    K2: StreamKey,
{
    let props = input.properties();
    let out = StreamProperties {
        partitioning: PartitionDescriptor::by_event_key(Some(selector.info().clone())),
        key_distinct: false,
        nested: props.nested,
    };
    let selector = selector.clone();
    unary(Arc::clone(input), out, move |down| {
        let selector = selector.clone();
        Arc::new(RekeyObserver {
            rekey: move |_: &K, p: &P| selector.key(p),
            down,
            _k: PhantomData,
        })
    })
}

/// Key each event by `(existing key, reduce_key(payload))` without moving it.
pub fn group_nested<K, Q, RK>(input: &Stream<K, Q>, reduce_key: &KeySelector<Q, RK>) -> Stream<CompoundGroupKey<K, RK>, Q>
where
    K: StreamKey,
    Q: StreamData,
    RK: StreamKey,
{
    let props = input.properties();
    let out = StreamProperties {
        partitioning: PartitionDescriptor::by_event_key(None),
        key_distinct: false,
        nested: props.nested,
    };
    let reduce_key = reduce_key.clone();
    unary(Arc::clone(input), out, move |down| {
        let reduce_key = reduce_key.clone();
        Arc::new(RekeyObserver {
            rekey: move |k: &K, q: &Q| CompoundGroupKey::new(k.clone(), reduce_key.key(q)),
            down,
            _k: PhantomData,
        })
    })
}

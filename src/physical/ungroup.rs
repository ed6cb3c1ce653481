//! Ungroup: drop the reduce key and restore the map-level key.

use crate::error::EngineError;
use crate::event::{Batch, CompoundGroupKey, Event, StreamData, StreamKey, Timestamp};
use crate::ops::unary;
use crate::partition::PartitionDescriptor;
use crate::stream::{Observer, ObserverRef, Stream, StreamProperties};
use std::sync::Arc;

/// Builds the output payload from the reduce key and the reducer's result.
pub type ResultConstructor<RK, R, O> = Arc<dyn Fn(&RK, R) -> O + Send + Sync>;

struct UngroupObserver<K, RK, R, O> {
    result: ResultConstructor<RK, R, O>,
    down: ObserverRef<K, O>,
}

impl<K, RK, R, O> Observer<CompoundGroupKey<K, RK>, R> for UngroupObserver<K, RK, R, O>
where
    K: StreamKey,
    RK: StreamKey,
    R: StreamData,
    O: StreamData,
{
    fn on_next(&self, batch: Batch<CompoundGroupKey<K, RK>, R>) {
        let out: Batch<K, O> = batch
            .into_iter()
            .map(|e| {
                let CompoundGroupKey { outer, inner } = e.key;
                let o = (self.result)(&inner, e.payload);
                Event::new(e.sync_time, e.other_time, outer, o)
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

pub fn ungroup<K, RK, R, O>(input: Stream<CompoundGroupKey<K, RK>, R>, result: ResultConstructor<RK, R, O>) -> Stream<K, O>
where
    K: StreamKey,
    RK: StreamKey,
    R: StreamData,
    O: StreamData,
{
    let props = StreamProperties {
        partitioning: PartitionDescriptor::unpartitioned(),
        key_distinct: false,
        nested: input.properties().nested,
    };
    unary(input, props, move |down| {
        Arc::new(UngroupObserver {
            result: Arc::clone(&result),
            down,
        })
    })
}

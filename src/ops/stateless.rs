//! Row-at-a-time operators: projection and filtering.

use crate::error::EngineError;
use crate::event::{Batch, StreamData, Timestamp};
use crate::ops::unary;
use crate::stream::{Observer, ObserverRef, Stream};
use std::sync::Arc;

struct SelectObserver<K, P, Q> {
    f: Arc<dyn Fn(&P) -> Q + Send + Sync>,
    down: ObserverRef<K, Q>,
}

impl<K: StreamData, P: StreamData, Q: StreamData> Observer<K, P> for SelectObserver<K, P, Q> {
    fn on_next(&self, batch: Batch<K, P>) {
        let out: Batch<K, Q> = batch
            .into_iter()
            .map(|e| {
                let q = (self.f)(&e.payload);
                e.with_payload(q)
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

struct WhereObserver<K, P> {
    pred: Arc<dyn Fn(&P) -> bool + Send + Sync>,
    down: ObserverRef<K, P>,
}

impl<K: StreamData, P: StreamData> Observer<K, P> for WhereObserver<K, P> {
    fn on_next(&self, mut batch: Batch<K, P>) {
        batch.retain(|e| (self.pred)(&e.payload));
        if !batch.is_empty() {
            self.down.on_next(batch);
        }
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

/// Per-row payload projection. Keys and intervals pass through.
pub fn select<K, P, Q, F>(input: &Stream<K, P>, f: F) -> Stream<K, Q>
where
    K: StreamData,
    P: StreamData,
    Q: StreamData,
    F: Fn(&P) -> Q + Send + Sync + 'static,
{
    let f: Arc<dyn Fn(&P) -> Q + Send + Sync> = Arc::new(f);
    let props = input.properties().project();
    unary(Arc::clone(input), props, move |down| {
        Arc::new(SelectObserver {
            f: Arc::clone(&f),
            down,
        })
    })
}

/// Keep rows whose payload satisfies `pred`. Partitioning survives filtering.
pub fn where_<K, P, F>(input: &Stream<K, P>, pred: F) -> Stream<K, P>
where
    K: StreamData,
    P: StreamData,
    F: Fn(&P) -> bool + Send + Sync + 'static,
{
    let pred: Arc<dyn Fn(&P) -> bool + Send + Sync> = Arc::new(pred);
    let props = input.properties();
    unary(Arc::clone(input), props, move |down| {
        Arc::new(WhereObserver {
            pred: Arc::clone(&pred),
            down,
        })
    })
}

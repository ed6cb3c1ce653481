//! Fan-out slots shared by Spray and Shuffle.
//!
//! A node with `n` outputs owns one [`Lanes`] table. Each output is exposed as a
//! [`LaneStream`]; subscribing to it attaches the observer to that lane's slot. A slot may
//! carry more than one observer (the node is then a multicast point for that lane).

use crate::error::{EngineError, Result};
use crate::event::{Batch, StreamData, Timestamp};
use crate::stream::{ObserverRef, StreamProperties, Streamable};
use crate::subscription::{DisposeFlag, Subscription};
use std::sync::{Arc, Mutex};

pub(crate) struct Lanes<K, P> {
    slots: Vec<Mutex<Vec<ObserverRef<K, P>>>>,
    flag: DisposeFlag,
}

impl<K: StreamData, P: StreamData> Lanes<K, P> {
    pub(crate) fn new(arity: usize) -> Self {
        Self {
            slots: (0..arity).map(|_| Mutex::new(Vec::new())).collect(),
            flag: DisposeFlag::new(),
        }
    }

    pub(crate) fn arity(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn flag(&self) -> &DisposeFlag {
        &self.flag
    }

    pub(crate) fn attach(&self, lane: usize, observer: ObserverRef<K, P>) -> Result<()> {
        let slot = self.slots.get(lane).ok_or(EngineError::LaneOutOfRange {
            lane,
            arity: self.arity(),
        })?;
        slot.lock().unwrap().push(observer);
        Ok(())
    }

    fn observers(&self, lane: usize) -> Vec<ObserverRef<K, P>> {
        self.slots
            .get(lane)
            .map(|s| s.lock().unwrap().clone())
            .unwrap_or_default()
    }

    pub(crate) fn push(&self, lane: usize, batch: Batch<K, P>) {
        if self.flag.is_disposed() || batch.is_empty() {
            return;
        }
        let mut observers = self.observers(lane);
        let Some(last) = observers.pop() else { return };
        for o in &observers {
            o.on_next(batch.clone());
        }
        last.on_next(batch);
    }

    pub(crate) fn punctuate(&self, time: Timestamp) {
        if self.flag.is_disposed() {
            return;
        }
        for lane in 0..self.arity() {
            for o in self.observers(lane) {
                o.on_punctuation(time);
            }
        }
    }

    pub(crate) fn complete(&self) {
        if self.flag.is_disposed() {
            return;
        }
        for lane in 0..self.arity() {
            for o in self.observers(lane) {
                o.on_completed();
            }
        }
    }

    pub(crate) fn fail(&self, error: &EngineError) {
        if self.flag.is_disposed() {
            return;
        }
        for lane in 0..self.arity() {
            for o in self.observers(lane) {
                o.on_error(error.clone());
            }
        }
    }
}

/// One output of a fan-out node.
pub(crate) struct LaneStream<K, P> {
    lanes: Arc<Lanes<K, P>>,
    lane: usize,
    properties: StreamProperties<P>,
}

impl<K, P> LaneStream<K, P> {
    pub(crate) fn new(lanes: Arc<Lanes<K, P>>, lane: usize, properties: StreamProperties<P>) -> Self {
        Self { lanes, lane, properties }
    }
}

impl<K: StreamData, P: StreamData> Streamable<K, P> for LaneStream<K, P> {
    fn properties(&self) -> StreamProperties<P> {
        self.properties.clone()
    }

    fn subscribe(&self, observer: ObserverRef<K, P>) -> Result<Subscription> {
        self.lanes.attach(self.lane, observer)?;
        Ok(Subscription::from_disposable(Arc::new(self.lanes.flag().clone())))
    }
}

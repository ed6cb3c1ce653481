//! Shuffle: re-key one map partition by the reduce key and route rows to reduce lanes.
//!
//! Each row leaves keyed by `CompoundGroupKey { outer: map key, inner: reduce key }` on lane
//! `hash(reduce key) mod r`. Every shuffle of a plan uses the same `r` and hash, so equal
//! reduce keys from different map partitions meet on the same lane.

use crate::error::{EngineError, Result};
use crate::event::{Batch, CompoundGroupKey, StreamData, StreamKey, Timestamp, lane_of};
use crate::partition::PartitionDescriptor;
use crate::physical::lanes::{LaneStream, Lanes};
use crate::scheduler::Scheduler;
use crate::selector::KeySelector;
use crate::stream::{Observer, Stream, StreamProperties};
use crate::subscription::DisposeFlag;
use std::sync::Arc;
use tracing::trace;

pub struct ShuffleNode<K, Q, RK> {
    partition: usize,
    lanes: Arc<Lanes<CompoundGroupKey<K, RK>, Q>>,
    reduce_key: KeySelector<Q, RK>,
    scheduler: Arc<Scheduler>,
    lane_properties: StreamProperties<Q>,
}

impl<K: StreamKey, Q: StreamData, RK: StreamKey> ShuffleNode<K, Q, RK> {
    /// Shuffle for map partition `partition` into `reduce_arity` lanes.
    ///
    /// # Errors
    /// `InvalidConfig` if `reduce_arity` is zero.
    pub fn new(
        partition: usize,
        reduce_arity: usize,
        reduce_key: KeySelector<Q, RK>,
        nested: bool,
        scheduler: &Arc<Scheduler>,
    ) -> Result<Arc<Self>> {
        if reduce_arity == 0 {
            return Err(EngineError::invalid("reduce arity must be positive"));
        }
        Ok(Arc::new(Self {
            partition,
            lanes: Arc::new(Lanes::new(reduce_arity)),
            reduce_key,
            scheduler: Arc::clone(scheduler),
            lane_properties: StreamProperties {
                partitioning: PartitionDescriptor::by_event_key(None),
                key_distinct: false,
                nested,
            },
        }))
    }

    pub fn partition(&self) -> usize {
        self.partition
    }

    pub fn reduce_arity(&self) -> usize {
        self.lanes.arity()
    }

    /// The output for reduce lane `lane`.
    ///
    /// # Errors
    /// `LaneOutOfRange` if `lane >= reduce_arity`.
    pub fn lane(&self, lane: usize) -> Result<Stream<CompoundGroupKey<K, RK>, Q>> {
        if lane >= self.reduce_arity() {
            return Err(EngineError::LaneOutOfRange {
                lane,
                arity: self.reduce_arity(),
            });
        }
        Ok(Arc::new(LaneStream::new(
            Arc::clone(&self.lanes),
            lane,
            self.lane_properties.clone(),
        )))
    }

    pub(crate) fn dispose_flag(&self) -> &DisposeFlag {
        self.lanes.flag()
    }
}

impl<K: StreamKey, Q: StreamData, RK: StreamKey> Observer<K, Q> for ShuffleNode<K, Q, RK> {
    fn on_next(&self, batch: Batch<K, Q>) {
        if self.lanes.flag().is_disposed() || batch.is_empty() {
            return;
        }
        let r = self.reduce_arity();
        self.scheduler.metrics().shuffled(batch.len());
        let mut parts: Vec<Batch<CompoundGroupKey<K, RK>, Q>> = (0..r).map(|_| Vec::new()).collect();
        for e in batch {
            let rk = self.reduce_key.key(&e.payload);
            let lane = lane_of(&rk, r);
            let outer = e.key.clone();
            parts[lane].push(e.with_key(CompoundGroupKey::new(outer, rk)));
        }
        trace!(partition = self.partition, lanes = r, "shuffle");
        for (lane, part) in parts.into_iter().enumerate() {
            self.lanes.push(lane, part);
        }
    }

    fn on_punctuation(&self, time: Timestamp) {
        self.lanes.punctuate(time);
    }

    fn on_completed(&self) {
        self.lanes.complete();
    }

    fn on_error(&self, error: EngineError) {
        self.lanes.fail(&error);
    }
}

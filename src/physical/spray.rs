//! Spray: fan one input out into `m` partitions.
//!
//! Routing follows the input's partition descriptor: by payload key, by event key, or per
//! row round robin when nothing is known. Broadcast copies every row to every partition;
//! it is used for the left input of an asymmetric two-input map. Punctuations, completion
//! and errors always go to every partition.

use crate::error::{EngineError, Result};
use crate::event::{Batch, StreamData, StreamKey, Timestamp, lane_of};
use crate::partition::{PartitionDescriptor, Partitioning, SprayKey};
use crate::physical::lanes::{LaneStream, Lanes};
use crate::scheduler::Scheduler;
use crate::stream::{Observer, Stream, StreamProperties};
use crate::subscription::DisposeFlag;
use std::fmt::{Display, Formatter, Result as FormatResult};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::trace;

/// How Spray assigns rows to partitions.
pub enum SprayMode<P> {
    RoundRobin,
    EventKey,
    Payload(SprayKey<P>),
    Broadcast,
}

impl<P: 'static> SprayMode<P> {
    /// The routing a stream with `descriptor` is sprayed with.
    pub fn from_descriptor(descriptor: &PartitionDescriptor<P>) -> Self {
        match descriptor.partitioning() {
            Partitioning::Unpartitioned => Self::RoundRobin,
            Partitioning::ByEventKey(_) => Self::EventKey,
            Partitioning::ByPayload(key) => Self::Payload(key.clone()),
        }
    }
}

impl<P> Display for SprayMode<P> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FormatResult {
        match self {
            Self::RoundRobin => f.write_str("round-robin"),
            Self::EventKey => f.write_str("by event key"),
            Self::Payload(key) => write!(f, "by payload `{}`", key.info().name()),
            Self::Broadcast => f.write_str("broadcast"),
        }
    }
}

pub struct SprayNode<K, P> {
    lanes: Arc<Lanes<K, P>>,
    mode: SprayMode<P>,
    cursor: AtomicUsize,
    scheduler: Arc<Scheduler>,
    partition_properties: StreamProperties<P>,
}

impl<K: StreamKey, P: StreamData> SprayNode<K, P> {
    /// # Errors
    /// `InvalidConfig` if `arity` is zero.
    pub fn new(
        arity: usize,
        mode: SprayMode<P>,
        source: &StreamProperties<P>,
        scheduler: &Arc<Scheduler>,
    ) -> Result<Arc<Self>> {
        if arity == 0 {
            return Err(EngineError::invalid("spray arity must be positive"));
        }
        let partitioning = match (&mode, source.partitioning.partitioning()) {
            (SprayMode::Broadcast, _) => PartitionDescriptor::unpartitioned(),
            (SprayMode::EventKey, Partitioning::Unpartitioned) => PartitionDescriptor::by_event_key(None),
            _ => source.partitioning.clone(),
        };
        Ok(Arc::new(Self {
            lanes: Arc::new(Lanes::new(arity)),
            mode,
            cursor: AtomicUsize::new(0),
            scheduler: Arc::clone(scheduler),
            partition_properties: StreamProperties {
                partitioning,
                key_distinct: source.key_distinct,
                nested: true,
            },
        }))
    }

    pub fn arity(&self) -> usize {
        self.lanes.arity()
    }

    pub fn mode(&self) -> &SprayMode<P> {
        &self.mode
    }

    /// One stream per partition, in lane order.
    pub fn partitions(&self) -> Vec<Stream<K, P>> {
        (0..self.arity())
            .map(|i| {
                Arc::new(LaneStream::new(
                    Arc::clone(&self.lanes),
                    i,
                    self.partition_properties.clone(),
                )) as Stream<K, P>
            })
            .collect()
    }

    pub(crate) fn dispose_flag(&self) -> &DisposeFlag {
        self.lanes.flag()
    }

    fn route(&self, batch: Batch<K, P>) -> Vec<Batch<K, P>> {
        let m = self.arity();
        if m == 1 {
            return vec![batch];
        }
        let mut parts: Vec<Batch<K, P>> = (0..m).map(|_| Vec::new()).collect();
        match &self.mode {
            SprayMode::RoundRobin => {
                let start = self.cursor.fetch_add(batch.len(), Ordering::Relaxed);
                for (i, e) in batch.into_iter().enumerate() {
                    parts[start.wrapping_add(i) % m].push(e);
                }
            }
            SprayMode::EventKey => {
                for e in batch {
                    parts[lane_of(&e.key, m)].push(e);
                }
            }
            SprayMode::Payload(key) => {
                for e in batch {
                    let lane = (key.hash(&e.payload) % m as u64) as usize;
                    parts[lane].push(e);
                }
            }
            SprayMode::Broadcast => {
                for part in parts.iter_mut().skip(1) {
                    part.clone_from(&batch);
                }
                parts[0] = batch;
            }
        }
        parts
    }
}

impl<K: StreamKey, P: StreamData> Observer<K, P> for SprayNode<K, P> {
    fn on_next(&self, batch: Batch<K, P>) {
        if self.lanes.flag().is_disposed() || batch.is_empty() {
            return;
        }
        self.scheduler.metrics().sprayed(batch.len());
        let items: Vec<(usize, Batch<K, P>)> = self
            .route(batch)
            .into_iter()
            .enumerate()
            .filter(|(_, b)| !b.is_empty())
            .collect();
        trace!(partitions = items.len(), "spray");
        let lanes = &self.lanes;
        self.scheduler.for_each_lane(items, |i, b| lanes.push(i, b));
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

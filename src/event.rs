//! Events, batches and key types that flow through the dataflow graph.
//!
//! An [`Event`] covers the half-open interval `[sync_time, other_time)`. Every edge carries
//! events in non-decreasing `sync_time` order *per key*; sources additionally emit them in
//! globally non-decreasing order.

use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::hash::Hash;

/// Application time, in ticks.
pub type Timestamp = i64;

/// Sentinel for "end of time", used as the frontier of a completed input.
pub const INFINITY: Timestamp = Timestamp::MAX;

/// Bound for anything that can travel as a payload.
pub trait StreamData: 'static + Send + Sync + Clone + Debug {}
impl<T> StreamData for T where T: 'static + Send + Sync + Clone + Debug {}

/// Bound for anything that can be used as a grouping key.
pub trait StreamKey: StreamData + Eq + Hash {}
impl<T> StreamKey for T where T: StreamData + Eq + Hash {}

/// A keyed, interval-stamped row.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Event<K, P> {
    pub sync_time: Timestamp,
    pub other_time: Timestamp,
    pub key: K,
    pub payload: P,
}

impl<K, P> Event<K, P> {
    #[inline]
    pub fn new(sync_time: Timestamp, other_time: Timestamp, key: K, payload: P) -> Self {
        debug_assert!(other_time >= sync_time);
        Self {
            sync_time,
            other_time,
            key,
            payload,
        }
    }

    /// A point event occupying exactly one tick.
    #[inline]
    pub fn point(time: Timestamp, key: K, payload: P) -> Self {
        Self::new(time, time.saturating_add(1), key, payload)
    }

    /// Replace the key, keeping interval and payload.
    #[inline]
    pub fn with_key<K2>(self, key: K2) -> Event<K2, P> {
        Event {
            sync_time: self.sync_time,
            other_time: self.other_time,
            key,
            payload: self.payload,
        }
    }

    /// Replace the payload, keeping interval and key.
    #[inline]
    pub fn with_payload<Q>(self, payload: Q) -> Event<K, Q> {
        Event {
            sync_time: self.sync_time,
            other_time: self.other_time,
            key: self.key,
            payload,
        }
    }

    /// Whether two intervals share at least one tick.
    #[inline]
    pub fn overlaps<K2, P2>(&self, other: &Event<K2, P2>) -> bool {
        self.sync_time < other.other_time && other.sync_time < self.other_time
    }
}

/// The unit of work pushed along an edge.
pub type Batch<K, P> = Vec<Event<K, P>>;

/// Key of an ungrouped stream.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Empty;

/// The map-level (outer) key paired with the reduce-time (inner) key.
///
/// Exists only between Shuffle (or the local group) and Ungroup.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CompoundGroupKey<O, I> {
    pub outer: O,
    pub inner: I,
}

impl<O, I> CompoundGroupKey<O, I> {
    #[inline]
    pub fn new(outer: O, inner: I) -> Self {
        Self { outer, inner }
    }
}

/// Deterministic hash used for every routing decision (spray and shuffle).
///
/// Two values that compare equal always hash equal within and across processes.
#[inline]
pub fn route_hash<T: Hash + ?Sized>(value: &T) -> u64 {
    fxhash::hash64(value)
}

/// Lane index for `value` among `arity` lanes.
#[inline]
pub(crate) fn lane_of<T: Hash + ?Sized>(value: &T, arity: usize) -> usize {
    debug_assert!(arity > 0);
    (route_hash(value) % arity as u64) as usize
}

//! The push-based stream contract.
//!
//! A [`Streamable`] is a lazy description. Calling [`Streamable::subscribe`] instantiates
//! fresh per-subscription state for every operator between the observer and the sources,
//! and returns a [`Subscription`] that owns all of it.

use crate::error::{EngineError, Result};
use crate::event::{Batch, Timestamp};
use crate::partition::PartitionDescriptor;
use crate::subscription::Subscription;
use std::sync::Arc;

/// Receiver side of an edge.
///
/// Implementations are shared between threads; all methods take `&self`.
pub trait Observer<K, P>: Send + Sync {
    fn on_next(&self, batch: Batch<K, P>);
    /// No later event on this edge has `sync_time < time`.
    fn on_punctuation(&self, time: Timestamp);
    fn on_completed(&self);
    fn on_error(&self, error: EngineError);
}

pub type ObserverRef<K, P> = Arc<dyn Observer<K, P>>;

/// Read-only metadata carried by every stream.
pub struct StreamProperties<P> {
    /// How rows are, or can be, hash-partitioned.
    pub partitioning: PartitionDescriptor<P>,
    /// Free of temporally-overlapping duplicate keys.
    pub key_distinct: bool,
    /// Already inside a parallel partition; further fan-out is redundant.
    pub nested: bool,
}

impl<P> Clone for StreamProperties<P> {
    fn clone(&self) -> Self {
        Self {
            partitioning: self.partitioning.clone(),
            key_distinct: self.key_distinct,
            nested: self.nested,
        }
    }
}

impl<P> Default for StreamProperties<P> {
    fn default() -> Self {
        Self {
            partitioning: PartitionDescriptor::unpartitioned(),
            key_distinct: false,
            nested: false,
        }
    }
}

impl<P> std::fmt::Debug for StreamProperties<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamProperties")
            .field("partitioning", &self.partitioning)
            .field("key_distinct", &self.key_distinct)
            .field("nested", &self.nested)
            .finish()
    }
}

impl<P> StreamProperties<P> {
    /// Properties after a payload-changing operator.
    pub fn project<Q>(&self) -> StreamProperties<Q> {
        StreamProperties {
            partitioning: self.partitioning.project(),
            key_distinct: false,
            nested: self.nested,
        }
    }

    #[must_use]
    pub fn with_partitioning(mut self, partitioning: PartitionDescriptor<P>) -> Self {
        self.partitioning = partitioning;
        self
    }

    #[must_use]
    pub fn with_nested(mut self, nested: bool) -> Self {
        self.nested = nested;
        self
    }
}

/// A lazily-built, subscribable stream of `Event<K, P>`.
pub trait Streamable<K, P>: Send + Sync {
    fn properties(&self) -> StreamProperties<P>;

    /// Wire `observer` to this stream.
    ///
    /// # Errors
    /// Construction-time failures (`InvalidConfig`, `PlanReused`). Runtime failures arrive
    /// through [`Observer::on_error`] instead.
    fn subscribe(&self, observer: ObserverRef<K, P>) -> Result<Subscription>;
}

pub type Stream<K, P> = Arc<dyn Streamable<K, P>>;

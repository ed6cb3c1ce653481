//! Partition descriptors.
//!
//! A [`PartitionDescriptor`] records how the rows of a stream are, or can be,
//! hash-partitioned. Spray reads it to pick a routing function, and the
//! co-partitioning optimizer reads it to decide whether shuffling can be skipped.

use crate::event::{route_hash, StreamKey};
use crate::selector::{KeySelector, SelectorInfo, SelectorRegistry};
use std::fmt::{Debug, Formatter, Result as FormatResult};
use std::sync::Arc;

/// Hash routing over a payload, tagged with the selector it was derived from.
pub struct SprayKey<P> {
    info: SelectorInfo,
    hasher: Arc<dyn Fn(&P) -> u64 + Send + Sync>,
}

impl<P> Clone for SprayKey<P> {
    fn clone(&self) -> Self {
        Self {
            info: self.info.clone(),
            hasher: Arc::clone(&self.hasher),
        }
    }
}

impl<P> Debug for SprayKey<P> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FormatResult {
        f.debug_tuple("SprayKey").field(&self.info.name()).finish()
    }
}

impl<P: 'static> SprayKey<P> {
    pub fn from_selector<SK: StreamKey>(selector: &KeySelector<P, SK>) -> Self {
        let sel = selector.clone();
        Self {
            info: selector.info().clone(),
            hasher: Arc::new(move |p: &P| route_hash(&sel.key(p))),
        }
    }
}

impl<P> SprayKey<P> {
    pub fn info(&self) -> &SelectorInfo {
        &self.info
    }

    #[inline]
    pub fn hash(&self, payload: &P) -> u64 {
        (self.hasher)(payload)
    }
}

/// How rows of a stream are laid out with respect to a hash key.
pub enum Partitioning<P> {
    /// Nothing is known; spraying falls back to per-row round robin.
    Unpartitioned,
    /// Rows are routable by their event key. The selector, when known, names how the key
    /// was computed.
    ByEventKey(Option<SelectorInfo>),
    /// Rows are routable by a key computed from the payload.
    ByPayload(SprayKey<P>),
}

impl<P> Clone for Partitioning<P> {
    fn clone(&self) -> Self {
        match self {
            Self::Unpartitioned => Self::Unpartitioned,
            Self::ByEventKey(info) => Self::ByEventKey(info.clone()),
            Self::ByPayload(key) => Self::ByPayload(key.clone()),
        }
    }
}

impl<P> Debug for Partitioning<P> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FormatResult {
        match self {
            Self::Unpartitioned => f.write_str("Unpartitioned"),
            Self::ByEventKey(info) => f
                .debug_tuple("ByEventKey")
                .field(&info.as_ref().map(SelectorInfo::name))
                .finish(),
            Self::ByPayload(key) => f.debug_tuple("ByPayload").field(&key.info().name()).finish(),
        }
    }
}

/// Partitioning metadata carried in stream properties.
pub struct PartitionDescriptor<P> {
    partitioning: Partitioning<P>,
}

impl<P> Clone for PartitionDescriptor<P> {
    fn clone(&self) -> Self {
        Self {
            partitioning: self.partitioning.clone(),
        }
    }
}

impl<P> Debug for PartitionDescriptor<P> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FormatResult {
        self.partitioning.fmt(f)
    }
}

impl<P> Default for PartitionDescriptor<P> {
    fn default() -> Self {
        Self::unpartitioned()
    }
}

impl<P> PartitionDescriptor<P> {
    pub fn unpartitioned() -> Self {
        Self {
            partitioning: Partitioning::Unpartitioned,
        }
    }

    pub fn by_event_key(selector: Option<SelectorInfo>) -> Self {
        Self {
            partitioning: Partitioning::ByEventKey(selector),
        }
    }

    pub fn by_payload(key: SprayKey<P>) -> Self {
        Self {
            partitioning: Partitioning::ByPayload(key),
        }
    }

    pub fn partitioning(&self) -> &Partitioning<P> {
        &self.partitioning
    }

    /// The named selector this partitioning follows, if any.
    pub fn selector(&self) -> Option<&SelectorInfo> {
        match &self.partitioning {
            Partitioning::Unpartitioned => None,
            Partitioning::ByEventKey(info) => info.as_ref().filter(|i| !i.is_anonymous()),
            Partitioning::ByPayload(key) => Some(key.info()).filter(|i| !i.is_anonymous()),
        }
    }

    /// Whether every row mapped to the same `reduce` key is guaranteed to sit in the same
    /// partition when sprayed by this descriptor.
    ///
    /// Holds only when the descriptor names a selector and `reduce` determines it. This is
    /// the soundness gate for skipping Shuffle and Gather.
    pub fn is_compatible_with(&self, registry: &SelectorRegistry, reduce: &SelectorInfo) -> bool {
        self.selector()
            .is_some_and(|spray| registry.determines(reduce, spray))
    }

    /// Keep event-key partitioning across a payload change; payload routing does not survive it.
    pub fn project<Q>(&self) -> PartitionDescriptor<Q> {
        match &self.partitioning {
            Partitioning::ByEventKey(info) => PartitionDescriptor::by_event_key(info.clone()),
            _ => PartitionDescriptor::unpartitioned(),
        }
    }
}

/// Whether two streams over the same event key type send matching rows to the same
/// partition index.
///
/// Event-key sprays always agree: both sides route by the hash of the key itself. Otherwise
/// both descriptors must name the same selector.
pub fn same_spray<P, P2>(a: &PartitionDescriptor<P>, b: &PartitionDescriptor<P2>) -> bool {
    if let (Partitioning::ByEventKey(_), Partitioning::ByEventKey(_)) = (a.partitioning(), b.partitioning()) {
        return true;
    }
    match (a.selector(), b.selector()) {
        (Some(x), Some(y)) => x.id() == y.id() && x.key_type() == y.key_type(),
        _ => false,
    }
}

/// Whether `output` is still partitioned by the event key `sprayed` routed on.
///
/// Both must be event-keyed, and the key must be the unnamed input key on both sides or the
/// same named selector. An anonymous re-key proves nothing.
pub fn keeps_event_key<P, Q>(sprayed: &PartitionDescriptor<P>, output: &PartitionDescriptor<Q>) -> bool {
    match (sprayed.partitioning(), output.partitioning()) {
        (Partitioning::ByEventKey(None), Partitioning::ByEventKey(None)) => true,
        (Partitioning::ByEventKey(Some(s)), Partitioning::ByEventKey(Some(o))) => {
            s.id().is_some() && s.id() == o.id() && s.key_type() == o.key_type()
        }
        _ => false,
    }
}

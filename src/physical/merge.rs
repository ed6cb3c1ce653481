//! Binary merge trees.
//!
//! `N` streams are combined by a balanced tree of two-input merge nodes, depth
//! `ceil(log2 N)`. The tree is built bottom-up: adjacent streams are paired level by
//! level and an odd stream is carried up unchanged to the next level. Nodes built on the
//! first level are tagged `base_level`; the single top node is tagged `root` and, when the
//! caller asks for it, registers with the scheduler.
//!
//! Two node variants exist:
//!
//! - [`MergeVariant::General`] buffers each side and releases rows in sync-time order once
//!   both sides' frontiers have passed them. Ties go to the left input first.
//!   Frontiers only move on punctuation or completion, so inputs that are ordered per key
//!   but not globally are still merged correctly.
//! - [`MergeVariant::Disjoint`] assumes its inputs never share a key. Rows are forwarded as
//!   they arrive; only frontiers are tracked, to derive punctuations.
//!
//! Either way a node completes when both inputs have, and forwards the first error only.

use crate::error::{EngineError, Result};
use crate::event::{Batch, Event, INFINITY, StreamData, Timestamp};
use crate::partition::PartitionDescriptor;
use crate::scheduler::{RootRegistration, Scheduler};
use crate::stream::{Observer, ObserverRef, Stream, StreamProperties, Streamable};
use crate::subscription::{DisposeFlag, Subscription};
use std::collections::VecDeque;
use std::fmt::{Display, Formatter, Result as FormatResult};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

const LEFT: usize = 0;
const RIGHT: usize = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeVariant {
    General,
    Disjoint,
}

impl Display for MergeVariant {
    fn fmt(&self, f: &mut Formatter<'_>) -> FormatResult {
        match self {
            Self::General => f.write_str("general"),
            Self::Disjoint => f.write_str("disjoint"),
        }
    }
}

/// Position of a node inside its tree.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MergeTags {
    pub base_level: bool,
    pub root: bool,
}

struct MergeState<K, P> {
    buffers: [VecDeque<Event<K, P>>; 2],
    frontier: [Timestamp; 2],
    completed: [bool; 2],
    forwarded: Timestamp,
    failed: bool,
}

impl<K, P> MergeState<K, P> {
    fn new() -> Self {
        Self {
            buffers: [VecDeque::new(), VecDeque::new()],
            frontier: [Timestamp::MIN; 2],
            completed: [false; 2],
            forwarded: Timestamp::MIN,
            failed: false,
        }
    }

    fn effective(&self, side: usize) -> Timestamp {
        if self.completed[side] { INFINITY } else { self.frontier[side] }
    }

    fn bound(&self) -> Timestamp {
        self.effective(LEFT).min(self.effective(RIGHT))
    }

    /// Pop every buffered row at or below the joint frontier, in sync order, left first.
    fn release(&mut self) -> Batch<K, P> {
        let bound = self.bound();
        let mut out = Vec::new();
        loop {
            let l = self.buffers[LEFT].front().map(|e| e.sync_time);
            let r = self.buffers[RIGHT].front().map(|e| e.sync_time);
            let side = match (l, r) {
                (Some(a), Some(b)) if a <= b => LEFT,
                (Some(_), Some(_)) => RIGHT,
                (Some(_), None) => LEFT,
                (None, Some(_)) => RIGHT,
                (None, None) => break,
            };
            match self.buffers[side].front() {
                Some(e) if e.sync_time <= bound => {}
                _ => break,
            }
            if let Some(e) = self.buffers[side].pop_front() {
                out.push(e);
            }
        }
        out
    }
}

/// A two-input merge node.
pub struct MergeNode<K, P> {
    variant: MergeVariant,
    tags: MergeTags,
    state: Mutex<MergeState<K, P>>,
    downstream: ObserverRef<K, P>,
    root: Option<RootRegistration>,
    flag: DisposeFlag,
}

impl<K: StreamData, P: StreamData> MergeNode<K, P> {
    pub(crate) fn new(
        variant: MergeVariant,
        tags: MergeTags,
        downstream: ObserverRef<K, P>,
        root: Option<RootRegistration>,
    ) -> Arc<Self> {
        Arc::new(Self {
            variant,
            tags,
            state: Mutex::new(MergeState::new()),
            downstream,
            root,
            flag: DisposeFlag::new(),
        })
    }

    pub fn variant(&self) -> MergeVariant {
        self.variant
    }

    pub fn tags(&self) -> MergeTags {
        self.tags
    }

    /// Observer for input `side` (0 = left, 1 = right).
    pub(crate) fn port(self: &Arc<Self>, side: usize) -> ObserverRef<K, P> {
        Arc::new(MergePort {
            node: Arc::clone(self),
            side,
        })
    }

    fn deliver(&self, batch: Batch<K, P>) {
        if batch.is_empty() {
            return;
        }
        if let Some(root) = &self.root {
            root.delivered(batch.len());
        }
        self.downstream.on_next(batch);
    }

    fn advance(&self, st: &mut MergeState<K, P>) {
        let b = st.bound();
        if b > st.forwarded && b != INFINITY {
            st.forwarded = b;
            self.downstream.on_punctuation(b);
        }
    }

    fn on_next(&self, side: usize, batch: Batch<K, P>) {
        if self.flag.is_disposed() || batch.is_empty() {
            return;
        }
        let mut st = self.state.lock().unwrap();
        if st.failed || st.completed[side] {
            return;
        }
        match self.variant {
            MergeVariant::Disjoint => self.deliver(batch),
            MergeVariant::General => {
                let buffer = &mut st.buffers[side];
                buffer.extend(batch);
                buffer.make_contiguous().sort_by_key(|e| e.sync_time);
                let out = st.release();
                self.deliver(out);
            }
        }
    }

    fn on_punctuation(&self, side: usize, time: Timestamp) {
        if self.flag.is_disposed() {
            return;
        }
        let mut st = self.state.lock().unwrap();
        if st.failed || st.completed[side] || time <= st.frontier[side] {
            return;
        }
        st.frontier[side] = time;
        if self.variant == MergeVariant::General {
            let out = st.release();
            self.deliver(out);
        }
        self.advance(&mut st);
    }

    fn on_completed(&self, side: usize) {
        if self.flag.is_disposed() {
            return;
        }
        let mut st = self.state.lock().unwrap();
        if st.failed || st.completed[side] {
            return;
        }
        st.completed[side] = true;
        let out = st.release();
        self.deliver(out);
        if st.completed[LEFT] && st.completed[RIGHT] {
            if self.tags.root {
                debug!("root merge completed");
            }
            self.downstream.on_completed();
        } else {
            self.advance(&mut st);
        }
    }

    fn on_error(&self, error: EngineError) {
        if self.flag.is_disposed() {
            return;
        }
        let mut st = self.state.lock().unwrap();
        if st.failed {
            return;
        }
        st.failed = true;
        st.buffers[LEFT].clear();
        st.buffers[RIGHT].clear();
        if self.tags.root {
            warn!(%error, "forwarding error to subscriber");
        }
        self.downstream.on_error(error);
    }
}

struct MergePort<K, P> {
    node: Arc<MergeNode<K, P>>,
    side: usize,
}

impl<K: StreamData, P: StreamData> Observer<K, P> for MergePort<K, P> {
    fn on_next(&self, batch: Batch<K, P>) {
        self.node.on_next(self.side, batch);
    }

    fn on_punctuation(&self, time: Timestamp) {
        self.node.on_punctuation(self.side, time);
    }

    fn on_completed(&self) {
        self.node.on_completed(self.side);
    }

    fn on_error(&self, error: EngineError) {
        self.node.on_error(error);
    }
}

/// Shape of a merge tree over `n` leaves.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TreeShape {
    Leaf(usize),
    Node {
        left: Box<TreeShape>,
        right: Box<TreeShape>,
        level: usize,
    },
}

impl TreeShape {
    /// Pair adjacent subtrees level by level; `None` when `n == 0`.
    pub fn build(n: usize) -> Option<Self> {
        let mut level: Vec<TreeShape> = (0..n).map(TreeShape::Leaf).collect();
        let mut depth = 0;
        while level.len() > 1 {
            let mut next = Vec::with_capacity(level.len().div_ceil(2));
            let mut it = level.into_iter();
            while let Some(left) = it.next() {
                match it.next() {
                    Some(right) => next.push(TreeShape::Node {
                        left: Box::new(left),
                        right: Box::new(right),
                        level: depth,
                    }),
                    None => next.push(left),
                }
            }
            level = next;
            depth += 1;
        }
        level.pop()
    }

    pub fn depth(&self) -> usize {
        match self {
            Self::Leaf(_) => 0,
            Self::Node { left, right, .. } => 1 + left.depth().max(right.depth()),
        }
    }

    /// Number of two-input nodes.
    pub fn node_count(&self) -> usize {
        match self {
            Self::Leaf(_) => 0,
            Self::Node { left, right, .. } => 1 + left.node_count() + right.node_count(),
        }
    }

    /// Leaf indices, left to right.
    pub fn leaves(&self) -> Vec<usize> {
        match self {
            Self::Leaf(i) => vec![*i],
            Self::Node { left, right, .. } => {
                let mut v = left.leaves();
                v.extend(right.leaves());
                v
            }
        }
    }
}

/// `ceil(log2 n)`, the depth of a merge tree over `n` inputs.
pub fn merge_depth(n: usize) -> usize {
    match n {
        0 | 1 => 0,
        _ => (usize::BITS - (n - 1).leading_zeros()) as usize,
    }
}

struct MergeStreamable<K, P> {
    inputs: Vec<Stream<K, P>>,
    variant: MergeVariant,
    shape: TreeShape,
    root_label: Option<String>,
    scheduler: Arc<Scheduler>,
    properties: StreamProperties<P>,
}

impl<K: StreamData, P: StreamData> MergeStreamable<K, P> {
    fn wire(&self, shape: &TreeShape, downstream: ObserverRef<K, P>, top: bool, sub: &Subscription) -> Result<()> {
        match shape {
            TreeShape::Leaf(i) => {
                let input = self
                    .inputs
                    .get(*i)
                    .ok_or(EngineError::LaneOutOfRange {
                        lane: *i,
                        arity: self.inputs.len(),
                    })?;
                sub.absorb(input.subscribe(downstream)?);
            }
            TreeShape::Node { left, right, level } => {
                let tags = MergeTags {
                    base_level: *level == 0,
                    root: top,
                };
                let root = match (&self.root_label, top) {
                    (Some(label), true) => Some(self.scheduler.register_root(label)),
                    _ => None,
                };
                let node = MergeNode::new(self.variant, tags, downstream, root);
                self.scheduler.metrics().merge_node(tags.base_level);
                sub.add_disposable(Arc::new(node.flag.clone()));
                self.wire(left, node.port(LEFT), false, sub)?;
                self.wire(right, node.port(RIGHT), false, sub)?;
            }
        }
        Ok(())
    }
}

impl<K: StreamData, P: StreamData> Streamable<K, P> for MergeStreamable<K, P> {
    fn properties(&self) -> StreamProperties<P> {
        self.properties.clone()
    }

    fn subscribe(&self, observer: ObserverRef<K, P>) -> Result<Subscription> {
        let sub = Subscription::new();
        if let Err(e) = self.wire(&self.shape, observer, true, &sub) {
            sub.dispose();
            return Err(e);
        }
        Ok(sub)
    }
}

/// Merge `inputs` with a binary tree of `variant` nodes.
///
/// A single input is returned unchanged. With `root_label`, the top node registers with
/// the scheduler and reports delivered rows.
///
/// # Errors
/// `InvalidConfig` if `inputs` is empty.
pub fn merge_streams<K: StreamData, P: StreamData>(
    mut inputs: Vec<Stream<K, P>>,
    variant: MergeVariant,
    scheduler: &Arc<Scheduler>,
    root_label: Option<&str>,
) -> Result<Stream<K, P>> {
    let shape = TreeShape::build(inputs.len()).ok_or(EngineError::invalid("cannot merge zero streams"))?;
    if inputs.len() == 1 {
        if let Some(only) = inputs.pop() {
            return Ok(only);
        }
    }
    let first = inputs[0].properties();
    let properties = StreamProperties {
        partitioning: PartitionDescriptor::unpartitioned(),
        key_distinct: variant == MergeVariant::Disjoint && inputs.iter().all(|s| s.properties().key_distinct),
        nested: first.nested,
    };
    debug!(inputs = inputs.len(), depth = shape.depth(), %variant, "merge tree");
    Ok(Arc::new(MergeStreamable {
        inputs,
        variant,
        shape,
        root_label: root_label.map(str::to_owned),
        scheduler: Arc::clone(scheduler),
        properties,
    }))
}

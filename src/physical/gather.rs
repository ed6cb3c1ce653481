//! Gather: combine lane `j` of every shuffle into the single input of reducer `j`.

use crate::error::Result;
use crate::event::{CompoundGroupKey, StreamData, StreamKey};
use crate::physical::merge::{MergeVariant, merge_streams};
use crate::physical::shuffle::ShuffleNode;
use crate::scheduler::Scheduler;
use crate::stream::Stream;
use std::sync::Arc;
use tracing::trace;

/// Merge lane `lane` of every node in `shuffles`.
///
/// The lane index is explicit; nothing is derived from construction order.
///
/// # Errors
/// `LaneOutOfRange` if `lane` exceeds the shuffles' reduce arity, `InvalidConfig` if
/// `shuffles` is empty.
pub fn gather<K, Q, RK>(
    lane: usize,
    shuffles: &[Arc<ShuffleNode<K, Q, RK>>],
    variant: MergeVariant,
    scheduler: &Arc<Scheduler>,
) -> Result<Stream<CompoundGroupKey<K, RK>, Q>>
where
    K: StreamKey,
    Q: StreamData,
    RK: StreamKey,
{
    let inputs = shuffles
        .iter()
        .map(|s| s.lane(lane))
        .collect::<Result<Vec<_>>>()?;
    trace!(lane, inputs = inputs.len(), %variant, "gather");
    merge_streams(inputs, variant, scheduler, None)
}

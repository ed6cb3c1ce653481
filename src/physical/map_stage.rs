//! Map multicast: instantiate the map transform once per sprayed partition.

use crate::error::{EngineError, Result};
use crate::event::{StreamData, StreamKey};
use crate::stream::Stream;
use std::sync::Arc;

/// A single-input map transform over a stream.
pub type UnaryMap<K, P, Q> = Arc<dyn Fn(Stream<K, P>) -> Stream<K, Q> + Send + Sync>;
/// A two-input map transform; both inputs share the key type.
pub type BinaryMap<K, P, P2, Q> = Arc<dyn Fn(Stream<K, P>, Stream<K, P2>) -> Stream<K, Q> + Send + Sync>;

pub fn map_unary<K, P, Q>(map: &UnaryMap<K, P, Q>, partitions: Vec<Stream<K, P>>) -> Vec<Stream<K, Q>>
where
    K: StreamKey,
    P: StreamData,
    Q: StreamData,
{
    partitions.into_iter().map(|p| map(p)).collect()
}

/// Apply `map` to the i-th left and i-th right partition.
///
/// # Errors
/// `InvalidConfig` if the two sides have a different number of partitions.
pub fn map_binary<K, P, P2, Q>(
    map: &BinaryMap<K, P, P2, Q>,
    lefts: Vec<Stream<K, P>>,
    rights: Vec<Stream<K, P2>>,
) -> Result<Vec<Stream<K, Q>>>
where
    K: StreamKey,
    P: StreamData,
    P2: StreamData,
    Q: StreamData,
{
    if lefts.len() != rights.len() {
        return Err(EngineError::invalid(format!(
            "map inputs have {} and {} partitions",
            lefts.len(),
            rights.len()
        )));
    }
    Ok(lefts.into_iter().zip(rights).map(|(l, r)| map(l, r)).collect())
}

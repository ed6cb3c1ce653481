//! Reduce multicast: instantiate the reducer once per reduce lane.

use crate::error::{EngineError, Result};
use crate::event::{CompoundGroupKey, StreamData, StreamKey};
use crate::stream::Stream;
use std::sync::Arc;

/// Reducer over one gathered lane.
pub type UnaryReducer<K, RK, Q, R> =
    Arc<dyn Fn(Stream<CompoundGroupKey<K, RK>, Q>) -> Stream<CompoundGroupKey<K, RK>, R> + Send + Sync>;

/// Reducer over the same lane of two gathered sides.
pub type BinaryReducer<K, RK, Q1, Q2, R> = Arc<
    dyn Fn(Stream<CompoundGroupKey<K, RK>, Q1>, Stream<CompoundGroupKey<K, RK>, Q2>) -> Stream<CompoundGroupKey<K, RK>, R>
        + Send
        + Sync,
>;

pub fn reduce_unary<K, RK, Q, R>(
    reducer: &UnaryReducer<K, RK, Q, R>,
    lanes: Vec<Stream<CompoundGroupKey<K, RK>, Q>>,
) -> Vec<Stream<CompoundGroupKey<K, RK>, R>>
where
    K: StreamKey,
    RK: StreamKey,
    Q: StreamData,
    R: StreamData,
{
    lanes.into_iter().map(|l| reducer(l)).collect()
}

/// Pair lane `j` of the first side with lane `j` of the second.
///
/// # Errors
/// `InvalidConfig` if the sides have a different number of lanes.
pub fn reduce_binary<K, RK, Q1, Q2, R>(
    reducer: &BinaryReducer<K, RK, Q1, Q2, R>,
    first: Vec<Stream<CompoundGroupKey<K, RK>, Q1>>,
    second: Vec<Stream<CompoundGroupKey<K, RK>, Q2>>,
) -> Result<Vec<Stream<CompoundGroupKey<K, RK>, R>>>
where
    K: StreamKey,
    RK: StreamKey,
    Q1: StreamData,
    Q2: StreamData,
    R: StreamData,
{
    if first.len() != second.len() {
        return Err(EngineError::invalid(format!(
            "reduce inputs have {} and {} lanes",
            first.len(),
            second.len()
        )));
    }
    Ok(first.into_iter().zip(second).map(|(a, b)| reducer(a, b)).collect())
}

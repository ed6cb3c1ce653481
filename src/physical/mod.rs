//! The parallel map/reduce core.
//!
//! Stages, in data-flow order:
//!
//! | stage | module | fan |
//! |---|---|---|
//! | Spray | [`spray`] | 1 → m |
//! | Map | [`map_stage`] | m × transform |
//! | Shuffle | [`shuffle`] | each of m → r lanes |
//! | Gather | [`gather`] | lane j of all m → 1 |
//! | Reduce | [`reduce_stage`] | r × reducer |
//! | Ungroup | [`ungroup`] | r × rekey |
//! | Merge | [`merge`] | r → 1 |
//!
//! [`optimizer`] decides whether Shuffle + Gather can be replaced by a local group, and
//! [`plan`] wires everything behind a single-use [`Streamable`](crate::Streamable).

pub mod explain;
pub mod gather;
pub(crate) mod lanes;
pub mod map_stage;
pub mod merge;
pub mod optimizer;
pub mod plan;
pub mod reduce_stage;
pub mod shuffle;
pub mod spray;
pub mod ungroup;

//! # Ironstream
//!
//! The **parallel map/reduce core** of a push-based temporal stream engine.
//!
//! A query is a graph of lazy [`Streamable`] descriptions. Nothing runs until a
//! subscriber attaches; subscription wires the graph and returns a [`Subscription`] that
//! pumps the sources and tears everything down on dispose.
//!
//! The core turns one logical "group, then reduce" into a partitioned plan:
//!
//! ```text
//! Spray → Map → Shuffle → Gather → Reduce → Ungroup → Merge
//! ```
//!
//! and an optimizer that replaces Shuffle + Gather with a partition-local group when the
//! sources are already partitioned by a key the reduce key determines.
//!
//! ## Key Features
//!
//! - **Temporal events** - every row carries a `[sync_time, other_time)` interval and a
//!   grouping key; punctuations promise that no earlier row follows
//! - **Single and two-pipeline plans** - [`MapReduce`] and [`Map2Reduce`]
//! - **Co-partitioning optimizer** - named key selectors and declared refinements let the
//!   planner skip the shuffle, with [`explain`](MapReduce::explain) output to show it
//! - **Time-ordered merge trees** - general and disjoint merges, arranged as balanced
//!   binary trees
//! - **Combiners** - [`Count`], [`Sum`], [`Min`], [`Max`], [`AverageF64`] and tuples of them
//! - **Parallel fan-out** - partitions are pushed from a rayon pool when enabled
//!
//! ## Quick Start
//!
//! ```
//! use ironstream::*;
//!
//! # fn main() -> anyhow::Result<()> {
//! let container = QueryContainer::new(
//!     EngineConfig::sequential().with_map_arity(3).with_reduce_arity(2),
//! )?;
//!
//! let source = from_points(vec![(0, (1u32, 'A')), (1, (2u32, 'B')), (2, (1u32, 'C'))]);
//! let by_key = container.selector("key", |row: &(u32, char)| row.0)?;
//!
//! let plan = MapReduce::new(
//!     &container,
//!     MapDefinition::unary(source, |s| s, by_key),
//!     |group| group.aggregate(Windowing::Global, Count),
//!     |key: &u32, count: u64| (*key, count),
//! );
//!
//! let mut counts: Vec<_> = collect(&plan.stream())?.into_iter().map(|e| e.payload).collect();
//! counts.sort();
//! assert_eq!(counts, vec![(1, 2), (2, 1)]);
//! assert_eq!(plan.state(), PlanState::Disposed);
//! # Ok(())
//! # }
//! ```
//!
//! ## Core Concepts
//!
//! ### Containers
//!
//! A [`QueryContainer`] owns the [`Scheduler`](scheduler::Scheduler) (arities, thread
//! pool, metrics) and the [`SelectorRegistry`]. Selector identities are scoped to the
//! container; two containers never share them.
//!
//! ### Streams and observers
//!
//! [`Stream<K, P>`] is an `Arc<dyn Streamable<K, P>>`. Observers receive batches,
//! punctuations, completion and errors. See [`ops`] for the operators the planner composes
//! with.
//!
//! ### Plans
//!
//! A plan is single-use: `Unbuilt → Building → Running → Disposed`. Subscribing twice
//! fails with [`EngineError::PlanReused`].
//!
//! ## Configuration
//!
//! [`EngineConfig`] can be built in code, parsed from JSON, or overlaid with
//! `IRONSTREAM_*` environment variables.
//!
//! ## Testing
//!
//! The [`testing`] module carries builders, fixtures and assertions used by the
//! integration tests.

pub mod combiners;
pub mod config;
pub mod container;
pub mod error;
pub mod event;
pub mod metrics;
pub mod ops;
pub mod partition;
pub mod physical;
pub mod scheduler;
pub mod selector;
pub mod stream;
pub mod subscription;
pub mod testing;
pub mod type_token;
pub mod window;

pub use combiners::{AverageF64, CombineFn, Count, Max, Min, Sum};
pub use config::EngineConfig;
pub use container::QueryContainer;
pub use error::EngineError;
pub use event::{Batch, CompoundGroupKey, Empty, Event, INFINITY, StreamData, StreamKey, Timestamp, route_hash};
pub use metrics::{EngineMetrics, MetricsSnapshot};
pub use ops::StreamExt;
pub use ops::aggregate::aggregate;
pub use ops::group::{group_by, group_nested};
pub use ops::join::join;
pub use ops::sink::{Collector, collect};
pub use ops::source::{EventSource, from_events, from_points};
pub use ops::stateless::{select, where_};
pub use partition::{PartitionDescriptor, Partitioning, SprayKey};
pub use physical::explain::PlanExplanation;
pub use physical::gather::gather;
pub use physical::merge::{MergeVariant, merge_streams};
pub use physical::optimizer::{OptimizationDecision, ShuffleStrategy};
pub use physical::plan::{Map2Reduce, MapDefinition, MapReduce, MapTransform, OperationalHint, PlanState};
pub use physical::shuffle::ShuffleNode;
pub use physical::spray::{SprayMode, SprayNode};
pub use selector::{KeySelector, SelectorInfo, SelectorRegistry};
pub use stream::{Observer, ObserverRef, Stream, StreamProperties, Streamable};
pub use subscription::{Disposable, Subscription};
pub use type_token::TypeTag;
pub use window::{Window, Windowing};

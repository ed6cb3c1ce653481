//! Testing utilities for ironstream queries.
//!
//! - **Assertions**: compare collected rows with expected results, check ordering and
//!   punctuation contracts
//! - **Builders**: construct event vectors fluently, or generate reproducible ones
//! - **Fixtures**: small canned datasets
//!
//! # Quick Start
//!
//! ```
//! use ironstream::*;
//! use ironstream::testing::*;
//!
//! # fn main() -> anyhow::Result<()> {
//! let c = TestContainer::parallel(3, 2)?;
//! let events = EventBuilder::new()
//!     .add_point(1, "a", 1u32)
//!     .add_point(2, "b", 2u32)
//!     .build();
//! let out = collect(&from_events(events))?;
//! assert_payloads_unordered_equal(&out, &[1, 2]);
//! assert!(c.config().map_arity == 3);
//! # Ok(())
//! # }
//! ```

pub mod assertions;
pub mod builders;
pub mod fixtures;

pub use assertions::*;
pub use builders::*;
pub use fixtures::*;

use crate::config::EngineConfig;
use crate::container::QueryContainer;
use crate::error::Result;
use crate::metrics::MetricsSnapshot;

/// A test-focused wrapper around [`QueryContainer`].
///
/// Dereferences to the container, so it can be passed wherever one is expected.
#[derive(Clone)]
pub struct TestContainer {
    container: QueryContainer,
}

impl TestContainer {
    /// Arity 1, no thread pool.
    #[must_use]
    pub fn new() -> Self {
        Self {
            container: QueryContainer::sequential(),
        }
    }

    /// `map_arity` / `reduce_arity` partitions, pushed from a small rayon pool.
    ///
    /// # Errors
    /// `InvalidConfig` for a zero arity.
    pub fn parallel(map_arity: usize, reduce_arity: usize) -> Result<Self> {
        Self::with_config(
            EngineConfig::default()
                .with_map_arity(map_arity)
                .with_reduce_arity(reduce_arity)
                .with_threads(2),
        )
    }

    /// Same arities as [`parallel`](Self::parallel), but every batch is pushed on the
    /// calling thread.
    ///
    /// # Errors
    /// `InvalidConfig` for a zero arity.
    pub fn partitioned(map_arity: usize, reduce_arity: usize) -> Result<Self> {
        Self::with_config(
            EngineConfig::sequential()
                .with_map_arity(map_arity)
                .with_reduce_arity(reduce_arity),
        )
    }

    /// # Errors
    /// `InvalidConfig` if `config` does not validate.
    pub fn with_config(config: EngineConfig) -> Result<Self> {
        Ok(Self {
            container: QueryContainer::new(config)?,
        })
    }

    /// Current counters of the container's scheduler.
    #[must_use]
    pub fn metrics(&self) -> MetricsSnapshot {
        self.container.scheduler().metrics().snapshot()
    }
}

impl Default for TestContainer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestContainer {
    type Target = QueryContainer;

    fn deref(&self) -> &Self::Target {
        &self.container
    }
}

impl AsRef<QueryContainer> for TestContainer {
    fn as_ref(&self) -> &QueryContainer {
        &self.container
    }
}

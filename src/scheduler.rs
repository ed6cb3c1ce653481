//! The execution scheduler handle.
//!
//! The engine never spawns threads of its own accord. The scheduler owns an optional
//! rayon pool and decides, per fan-out, whether partition batches are pushed in parallel
//! or in sequence. It also answers arity queries (with the nested-parallelism guard) and
//! hands out root registrations to the top-level merge of each plan.

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::metrics::EngineMetrics;
use crate::stream::StreamProperties;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

pub struct Scheduler {
    config: EngineConfig,
    pool: Option<ThreadPool>,
    metrics: Arc<EngineMetrics>,
    roots: AtomicUsize,
}

impl Scheduler {
    /// # Errors
    /// `InvalidConfig` if the configuration does not validate or the pool cannot be built.
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let pool = if config.parallel {
            let mut b = ThreadPoolBuilder::new().thread_name(|i| format!("ironstream-{i}"));
            if let Some(t) = config.threads {
                b = b.num_threads(t);
            }
            Some(
                b.build()
                    .map_err(|e| EngineError::invalid(format!("thread pool: {e}")))?,
            )
        } else {
            None
        };
        Ok(Self {
            config,
            pool,
            metrics: Arc::new(EngineMetrics::new()),
            roots: AtomicUsize::new(0),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn map_arity(&self) -> usize {
        self.config.map_arity
    }

    pub fn reduce_arity(&self) -> usize {
        self.config.reduce_arity
    }

    /// `(map_arity, reduce_arity)` for a plan over a source with `props`.
    ///
    /// Both collapse to 1 when the source is already inside a partition.
    pub fn arity_for<P>(&self, props: &StreamProperties<P>) -> (usize, usize) {
        self.arity(props.nested)
    }

    pub(crate) fn arity(&self, nested: bool) -> (usize, usize) {
        if nested {
            (1, 1)
        } else {
            (self.config.map_arity, self.config.reduce_arity)
        }
    }

    pub fn metrics(&self) -> &EngineMetrics {
        &self.metrics
    }

    /// Number of root merges registered so far.
    pub fn root_count(&self) -> usize {
        self.roots.load(Ordering::Relaxed)
    }

    /// Register a top-level observer for delivery callbacks.
    pub fn register_root(&self, label: &str) -> RootRegistration {
        let id = self.roots.fetch_add(1, Ordering::Relaxed);
        debug!(root = id, label, "registered root merge");
        RootRegistration {
            id,
            metrics: Arc::clone(&self.metrics),
        }
    }

    /// Apply `f` to every `(lane, item)`.
    ///
    /// Runs on the pool when one exists, there is more than one item, and the caller is not
    /// already a pool worker. Workers run nested fan-outs inline so that a worker never waits
    /// on stolen work while holding a stage lock.
    pub fn for_each_lane<T, F>(&self, items: Vec<(usize, T)>, f: F)
    where
        T: Send,
        F: Fn(usize, T) + Send + Sync,
    {
        match &self.pool {
            Some(pool) if items.len() > 1 && pool.current_thread_index().is_none() => {
                pool.install(|| items.into_par_iter().for_each(|(i, t)| f(i, t)));
            }
            _ => {
                for (i, t) in items {
                    f(i, t);
                }
            }
        }
    }
}

/// Handle held by a root merge node.
#[derive(Clone)]
pub struct RootRegistration {
    id: usize,
    metrics: Arc<EngineMetrics>,
}

impl RootRegistration {
    pub fn id(&self) -> usize {
        self.id
    }

    #[inline]
    pub(crate) fn delivered(&self, rows: usize) {
        self.metrics.root_delivered(rows);
    }
}

use crate::config::EngineConfig;
use crate::error::Result;
use crate::scheduler::Scheduler;
use crate::selector::{KeySelector, SelectorInfo, SelectorRegistry};
use std::sync::Arc;

/// -------- Query container --------
/// Owns everything that lives as long as one compiled query: the scheduler handle and the
/// selector registry. Cheap to clone.
#[derive(Clone)]
pub struct QueryContainer {
    pub(crate) inner: Arc<ContainerInner>,
}

pub struct ContainerInner {
    pub scheduler: Arc<Scheduler>,
    pub selectors: SelectorRegistry,
}

impl QueryContainer {
    /// # Errors
    /// `InvalidConfig` if `config` does not validate.
    pub fn new(config: EngineConfig) -> Result<Self> {
        Ok(Self {
            inner: Arc::new(ContainerInner {
                scheduler: Arc::new(Scheduler::new(config)?),
                selectors: SelectorRegistry::new(),
            }),
        })
    }

    /// Arity 1, no thread pool.
    pub fn sequential() -> Self {
        Self {
            inner: Arc::new(ContainerInner {
                scheduler: Arc::new(Self::sequential_scheduler()),
                selectors: SelectorRegistry::new(),
            }),
        }
    }

    fn sequential_scheduler() -> Scheduler {
        match Scheduler::new(EngineConfig::sequential()) {
            Ok(s) => s,
            // The sequential config always validates and never builds a pool.
            Err(e) => unreachable!("sequential scheduler: {e}"),
        }
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.inner.scheduler
    }

    pub fn config(&self) -> &EngineConfig {
        self.inner.scheduler.config()
    }

    pub fn selectors(&self) -> &SelectorRegistry {
        &self.inner.selectors
    }

    /// Shorthand for [`SelectorRegistry::selector`].
    ///
    /// # Errors
    /// `InvalidConfig` if `name` is already bound to a different key type.
    pub fn selector<T, K, F>(&self, name: &str, f: F) -> Result<KeySelector<T, K>>
    where
        K: 'static,
        F: Fn(&T) -> K + Send + Sync + 'static,
    {
        self.inner.selectors.selector(name, f)
    }

    /// Shorthand for [`SelectorRegistry::refining`].
    ///
    /// # Errors
    /// `InvalidConfig` if `parent` is anonymous or `name` is bound to another key type.
    pub fn refining<T, K, F>(&self, name: &str, parent: &SelectorInfo, f: F) -> Result<KeySelector<T, K>>
    where
        K: 'static,
        F: Fn(&T) -> K + Send + Sync + 'static,
    {
        self.inner.selectors.refining(name, parent, f)
    }
}

impl Default for QueryContainer {
    fn default() -> Self {
        Self::sequential()
    }
}

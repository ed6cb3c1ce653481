//! Engine configuration.
//!
//! ```
//! use ironstream::config::EngineConfig;
//!
//! let cfg = EngineConfig::default().with_map_arity(4).with_reduce_arity(2);
//! cfg.validate().unwrap();
//! assert_eq!(cfg.map_arity, 4);
//! ```

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

/// Process-wide fan-out and threading settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Number of partitions the Spray stage fans out into.
    pub map_arity: usize,
    /// Number of lanes the Shuffle stage splits each map partition into.
    pub reduce_arity: usize,
    /// Run partition fan-out on a dedicated rayon pool.
    pub parallel: bool,
    /// Pool size; `None` uses rayon's default.
    pub threads: Option<usize>,
    /// Default number of events per source batch.
    pub batch_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let cpus = num_cpus::get().max(1);
        Self {
            map_arity: cpus,
            reduce_arity: cpus,
            parallel: true,
            threads: None,
            batch_size: 1024,
        }
    }
}

impl EngineConfig {
    /// Single-lane configuration: arities 1, no thread pool.
    pub fn sequential() -> Self {
        Self {
            map_arity: 1,
            reduce_arity: 1,
            parallel: false,
            threads: None,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_map_arity(mut self, n: usize) -> Self {
        self.map_arity = n;
        self
    }

    #[must_use]
    pub fn with_reduce_arity(mut self, n: usize) -> Self {
        self.reduce_arity = n;
        self
    }

    #[must_use]
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    #[must_use]
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads);
        self
    }

    #[must_use]
    pub fn with_batch_size(mut self, n: usize) -> Self {
        self.batch_size = n;
        self
    }

    /// # Errors
    /// `InvalidConfig` for a zero arity, zero batch size or zero threads.
    pub fn validate(&self) -> Result<()> {
        if self.map_arity == 0 {
            return Err(EngineError::invalid("map_arity must be positive"));
        }
        if self.reduce_arity == 0 {
            return Err(EngineError::invalid("reduce_arity must be positive"));
        }
        if self.batch_size == 0 {
            return Err(EngineError::invalid("batch_size must be positive"));
        }
        if self.threads == Some(0) {
            return Err(EngineError::invalid("threads must be positive when set"));
        }
        Ok(())
    }

    /// Parse a JSON document; missing fields take their defaults.
    ///
    /// # Errors
    /// `InvalidConfig` on malformed JSON or a document that fails [`validate`](Self::validate).
    pub fn from_json(s: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(s)
            .map_err(|e| EngineError::invalid(format!("config: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Overlay `IRONSTREAM_*` environment variables onto `self`.
    ///
    /// Recognized: `IRONSTREAM_MAP_ARITY`, `IRONSTREAM_REDUCE_ARITY`, `IRONSTREAM_THREADS`,
    /// `IRONSTREAM_BATCH_SIZE`, `IRONSTREAM_PARALLEL`.
    ///
    /// # Errors
    /// `InvalidConfig` if a variable is set but does not parse.
    pub fn from_env(mut self) -> Result<Self> {
        if let Some(v) = env_var::<usize>("IRONSTREAM_MAP_ARITY")? {
            self.map_arity = v;
        }
        if let Some(v) = env_var::<usize>("IRONSTREAM_REDUCE_ARITY")? {
            self.reduce_arity = v;
        }
        if let Some(v) = env_var::<usize>("IRONSTREAM_THREADS")? {
            self.threads = Some(v);
        }
        if let Some(v) = env_var::<usize>("IRONSTREAM_BATCH_SIZE")? {
            self.batch_size = v;
        }
        if let Some(v) = env_var::<bool>("IRONSTREAM_PARALLEL")? {
            self.parallel = v;
        }
        self.validate()?;
        Ok(self)
    }
}

fn env_var<T: FromStr>(name: &str) -> Result<Option<T>> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| EngineError::invalid(format!("{name}={raw:?} does not parse"))),
        Err(_) => Ok(None),
    }
}

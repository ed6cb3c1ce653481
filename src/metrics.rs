//! Execution counters for the physical stages.
//!
//! Every [`Scheduler`](crate::scheduler::Scheduler) owns one [`EngineMetrics`]. Stages bump
//! the counters as rows move through them; [`EngineMetrics::snapshot`] returns a
//! serializable copy for printing or persisting.
//!
//! ```no_run
//! use ironstream::*;
//!
//! # fn main() -> anyhow::Result<()> {
//! let qc = QueryContainer::new(EngineConfig::default())?;
//! // ... build and run plans ...
//! qc.scheduler().metrics().print();
//! qc.scheduler().metrics().save_to_file("metrics.json")?;
//! # Ok(())
//! # }
//! ```

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fs::File;
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters, updated with relaxed atomics.
#[derive(Default, Debug)]
pub struct EngineMetrics {
    plans_built: AtomicU64,
    shuffles_skipped: AtomicU64,
    rows_sprayed: AtomicU64,
    rows_shuffled: AtomicU64,
    base_merge_nodes: AtomicU64,
    internal_merge_nodes: AtomicU64,
    root_batches: AtomicU64,
    root_rows: AtomicU64,
}

/// Point-in-time copy of [`EngineMetrics`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub plans_built: u64,
    pub shuffles_skipped: u64,
    pub rows_sprayed: u64,
    pub rows_shuffled: u64,
    pub base_merge_nodes: u64,
    pub internal_merge_nodes: u64,
    pub root_batches: u64,
    pub root_rows: u64,
}

#[inline]
fn bump(counter: &AtomicU64, by: u64) {
    if cfg!(feature = "metrics") {
        counter.fetch_add(by, Ordering::Relaxed);
    }
}

impl EngineMetrics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn plan_built(&self, shuffle_skipped: bool) {
        bump(&self.plans_built, 1);
        if shuffle_skipped {
            bump(&self.shuffles_skipped, 1);
        }
    }

    pub(crate) fn sprayed(&self, rows: usize) {
        bump(&self.rows_sprayed, rows as u64);
    }

    pub(crate) fn shuffled(&self, rows: usize) {
        bump(&self.rows_shuffled, rows as u64);
    }

    pub(crate) fn merge_node(&self, base_level: bool) {
        if base_level {
            bump(&self.base_merge_nodes, 1);
        } else {
            bump(&self.internal_merge_nodes, 1);
        }
    }

    pub(crate) fn root_delivered(&self, rows: usize) {
        bump(&self.root_batches, 1);
        bump(&self.root_rows, rows as u64);
    }

    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        MetricsSnapshot {
            plans_built: get(&self.plans_built),
            shuffles_skipped: get(&self.shuffles_skipped),
            rows_sprayed: get(&self.rows_sprayed),
            rows_shuffled: get(&self.rows_shuffled),
            base_merge_nodes: get(&self.base_merge_nodes),
            internal_merge_nodes: get(&self.internal_merge_nodes),
            root_batches: get(&self.root_batches),
            root_rows: get(&self.root_rows),
        }
    }

    /// All counters as a JSON object.
    #[must_use]
    pub fn to_json(&self) -> Value {
        json!(self.snapshot())
    }

    /// Print all counters to stdout in a human-readable format.
    pub fn print(&self) {
        let s = self.snapshot();
        println!("\n========== Engine Metrics ==========");
        println!("plans_built: {}", s.plans_built);
        println!("shuffles_skipped: {}", s.shuffles_skipped);
        println!("rows_sprayed: {}", s.rows_sprayed);
        println!("rows_shuffled: {}", s.rows_shuffled);
        println!("base_merge_nodes: {}", s.base_merge_nodes);
        println!("internal_merge_nodes: {}", s.internal_merge_nodes);
        println!("root_batches: {}", s.root_batches);
        println!("root_rows: {}", s.root_rows);
        println!("====================================\n");
    }

    /// Save all counters to a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or written to.
    pub fn save_to_file(&self, path: &str) -> Result<()> {
        let mut file = File::create(path)?;
        let formatted = serde_json::to_string_pretty(&self.to_json())?;
        file.write_all(formatted.as_bytes())?;
        Ok(())
    }
}

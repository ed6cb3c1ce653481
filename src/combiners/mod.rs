//! Combiners used by windowed aggregates.
//!
//! A [`CombineFn`] folds the values of one key (and one window) into an accumulator and
//! finishes it into an output:
//!
//! - [`Count`] -- number of values.
//! - [`Sum<T>`] -- sum of values.
//! - [`Min<T>`] / [`Max<T>`] -- minimum / maximum value.
//! - [`AverageF64`] -- average as `f64` (values convertible to `f64`).
//!
//! Tuples of combiners are combiners themselves: `(Count, Sum::<u64>::new())` computes
//! both aggregates over the same values in a single pass, producing `(u64, u64)`. Tuples
//! of up to eight members are supported and nest freely.
//!
//! # Examples
//! ```
//! use ironstream::combiners::{CombineFn, Count, Max, Sum};
//!
//! type Out = (u64, u64, u64);
//!
//! let both = (Count, Sum::<u64>::new(), Max::<u64>::new());
//! let mut acc: (u64, u64, Option<u64>) = CombineFn::<u64, _, Out>::create(&both);
//! for v in [3u64, 9, 4] {
//!     CombineFn::<u64, _, Out>::add_input(&both, &mut acc, v);
//! }
//! assert_eq!(CombineFn::<u64, _, Out>::finish(&both, acc), (3, 16, 9));
//! ```

mod basic;
mod statistical;
mod tuple;

pub use basic::{Max, Min, Sum};
pub use statistical::{AverageF64, MeanState};

/// Per-key aggregation: create, add, merge and finish an accumulator.
pub trait CombineFn<V, A, O>: Send + Sync + 'static {
    fn create(&self) -> A;
    fn add_input(&self, acc: &mut A, v: V);
    fn merge(&self, acc: &mut A, other: A);
    fn finish(&self, acc: A) -> O;
}

/// Number of values per key.
#[derive(Clone, Copy, Debug, Default)]
pub struct Count;

impl<V> CombineFn<V, u64, u64> for Count {
    fn create(&self) -> u64 {
        0
    }
    fn add_input(&self, acc: &mut u64, _v: V) {
        *acc += 1;
    }
    fn merge(&self, acc: &mut u64, other: u64) {
        *acc += other;
    }
    fn finish(&self, acc: u64) -> u64 {
        acc
    }
}

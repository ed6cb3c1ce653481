//! Running mean.

use crate::combiners::CombineFn;
use crate::event::StreamData;

/// Sum and count of the values seen so far.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MeanState {
    pub sum: f64,
    pub count: u64,
}

impl MeanState {
    #[allow(clippy::cast_precision_loss)]
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }
}

/// Arithmetic mean per key and window, for any value convertible into `f64`.
/// An empty group averages to `0.0`.
#[derive(Clone, Copy, Debug, Default)]
pub struct AverageF64;

impl<V> CombineFn<V, MeanState, f64> for AverageF64
where
    V: StreamData + Into<f64>,
{
    fn create(&self) -> MeanState {
        MeanState::default()
    }

    fn add_input(&self, acc: &mut MeanState, v: V) {
        acc.sum += v.into();
        acc.count += 1;
    }

    fn merge(&self, acc: &mut MeanState, other: MeanState) {
        acc.sum += other.sum;
        acc.count += other.count;
    }

    fn finish(&self, acc: MeanState) -> f64 {
        acc.mean()
    }
}

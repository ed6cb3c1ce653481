//! Arithmetic and ordering combiners: `Sum`, `Min`, `Max`.
//!
//! The aggregate operator opens an accumulator only when the first value of a key
//! arrives, so `finish` never sees an empty group in a running query. Folding by hand
//! over nothing yields `T::default()`.

use crate::combiners::CombineFn;
use crate::event::StreamData;
use std::cmp::Ordering;
use std::fmt::{Debug, Formatter, Result as FormatResult};
use std::marker::PhantomData;
use std::mem::take;
use std::ops::Add;

macro_rules! value_combiner {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        pub struct $name<T>(PhantomData<fn(T) -> T>);

        impl<T> $name<T> {
            pub fn new() -> Self {
                Self(PhantomData)
            }
        }

        impl<T> Default for $name<T> {
            fn default() -> Self {
                Self::new()
            }
        }

        impl<T> Clone for $name<T> {
            fn clone(&self) -> Self {
                *self
            }
        }

        impl<T> Copy for $name<T> {}

        impl<T> Debug for $name<T> {
            fn fmt(&self, f: &mut Formatter<'_>) -> FormatResult {
                write!(f, "{}<{}>", stringify!($name), std::any::type_name::<T>())
            }
        }
    };
}

value_combiner!(
    /// Running total per key and window. Accumulator and output are `T`.
    Sum
);

value_combiner!(
    /// Smallest value per key and window.
    Min
);

value_combiner!(
    /// Largest value per key and window.
    Max
);

impl<T> CombineFn<T, T, T> for Sum<T>
where
    T: StreamData + Add<Output = T> + Default,
{
    fn create(&self) -> T {
        T::default()
    }

    fn add_input(&self, acc: &mut T, v: T) {
        *acc = take(acc) + v;
    }

    fn merge(&self, acc: &mut T, other: T) {
        self.add_input(acc, other);
    }

    fn finish(&self, acc: T) -> T {
        acc
    }
}

/// Replace `acc` with `v` unless `acc` already compares as `keep` against it.
fn keep_extreme<T: Ord>(acc: &mut Option<T>, v: T, keep: Ordering) {
    if let Some(cur) = acc.as_ref() {
        if cur.cmp(&v) == keep || cur == &v {
            return;
        }
    }
    *acc = Some(v);
}

macro_rules! extreme_combiner {
    ($name:ident, $keep:expr) => {
        impl<T> CombineFn<T, Option<T>, T> for $name<T>
        where
            T: StreamData + Ord + Default,
        {
            fn create(&self) -> Option<T> {
                None
            }

            fn add_input(&self, acc: &mut Option<T>, v: T) {
                keep_extreme(acc, v, $keep);
            }

            fn merge(&self, acc: &mut Option<T>, other: Option<T>) {
                if let Some(v) = other {
                    keep_extreme(acc, v, $keep);
                }
            }

            fn finish(&self, acc: Option<T>) -> T {
                acc.unwrap_or_default()
            }
        }
    };
}

extreme_combiner!(Min, Ordering::Less);
extreme_combiner!(Max, Ordering::Greater);

use crate::event::{INFINITY, Timestamp};
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

/// A closed-open time range: [start, end).
#[derive(Copy, Clone, Debug, Serialize, Deserialize, Eq)]
pub struct Window {
    pub start: Timestamp,
    pub end: Timestamp,
}

impl Window {
    #[inline]
    pub fn new(start: Timestamp, end: Timestamp) -> Self {
        debug_assert!(end >= start);
        Self { start, end }
    }

    /// The window that never closes before completion.
    #[inline]
    pub fn global() -> Self {
        Self { start: Timestamp::MIN, end: INFINITY }
    }

    /// Compute the tumbling window [win_start, win_start + size) for a timestamp.
    /// `size` > 0; `offset` may be negative or positive.
    #[inline]
    pub fn tumble(ts: Timestamp, size: i64, offset: i64) -> Self {
        debug_assert!(size > 0);
        let rel = ts - offset;
        let k = div_floor(rel, size);
        let win_start = k * size + offset;
        Self { start: win_start, end: win_start + size }
    }

    /// Whether a frontier at `t` guarantees no further input for this window.
    #[inline]
    pub fn closed_by(&self, t: Timestamp) -> bool {
        self.end != INFINITY && t >= self.end
    }
}

/// Floor division for i64 (unlike `/` which truncates toward zero).
#[inline]
fn div_floor(a: i64, b: i64) -> i64 {
    let q = a / b;
    let r = a % b;
    if (r != 0) && ((r > 0) != (b > 0)) { q - 1 } else { q }
}

// Hash/Ord so Windows can be used as keys and sorted deterministically.
impl PartialEq for Window {
    #[inline] fn eq(&self, other: &Self) -> bool { self.start == other.start && self.end == other.end }
}
impl Hash for Window {
    #[inline] fn hash<H: Hasher>(&self, state: &mut H) { self.start.hash(state); self.end.hash(state); }
}
impl Ord for Window {
    #[inline] fn cmp(&self, o: &Self) -> std::cmp::Ordering {
        self.start.cmp(&o.start).then(self.end.cmp(&o.end))
    }
}
impl PartialOrd for Window {
    #[inline] fn partial_cmp(&self, o: &Self) -> Option<std::cmp::Ordering> { Some(self.cmp(o)) }
}

/// How a windowed aggregate assigns events to windows.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Windowing {
    /// One window per key, emitted on completion.
    Global,
    /// Fixed-size, non-overlapping windows keyed on `sync_time`.
    Tumbling { size: i64, offset: i64 },
}

impl Windowing {
    #[inline]
    pub fn tumbling(size: i64) -> Self {
        Self::Tumbling { size, offset: 0 }
    }

    #[inline]
    pub fn assign(&self, ts: Timestamp) -> Window {
        match *self {
            Self::Global => Window::global(),
            Self::Tumbling { size, offset } => Window::tumble(ts, size, offset),
        }
    }
}

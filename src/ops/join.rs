//! Temporal equi-join on the event key.
//!
//! Two events join when their keys are equal and their intervals overlap. The output
//! interval is the intersection. Each side's punctuations evict rows of the other side that
//! can no longer overlap anything still to come.

use crate::error::EngineError;
use crate::event::{Batch, Event, INFINITY, StreamData, StreamKey, Timestamp};
use crate::ops::binary;
use crate::stream::{Observer, ObserverRef, Stream, StreamProperties};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

const LEFT: usize = 0;
const RIGHT: usize = 1;

struct JoinState<K, L, R> {
    left: HashMap<K, Vec<Event<K, L>>>,
    right: HashMap<K, Vec<Event<K, R>>>,
    frontier: [Timestamp; 2],
    completed: [bool; 2],
    forwarded: Timestamp,
    failed: bool,
}

impl<K: StreamKey, L, R> JoinState<K, L, R> {
    fn bound(&self) -> Timestamp {
        let eff = |i: usize| if self.completed[i] { INFINITY } else { self.frontier[i] };
        eff(LEFT).min(eff(RIGHT))
    }

    /// Drop rows of the opposite side that end at or before `side`'s frontier.
    fn evict(&mut self, side: usize) {
        let t = if self.completed[side] { INFINITY } else { self.frontier[side] };
        if side == LEFT {
            self.right.retain(|_, rows| {
                rows.retain(|e| e.other_time > t);
                !rows.is_empty()
            });
        } else {
            self.left.retain(|_, rows| {
                rows.retain(|e| e.other_time > t);
                !rows.is_empty()
            });
        }
    }
}

struct JoinNode<K, L, R, O> {
    state: Mutex<JoinState<K, L, R>>,
    result: Arc<dyn Fn(&L, &R) -> O + Send + Sync>,
    down: ObserverRef<K, O>,
}

impl<K, L, R, O> JoinNode<K, L, R, O>
where
    K: StreamKey,
    L: StreamData,
    R: StreamData,
    O: StreamData,
{
    fn on_left(&self, batch: Batch<K, L>) {
        let mut st = self.state.lock().unwrap();
        if st.failed {
            return;
        }
        let mut out = Vec::new();
        for l in batch {
            if let Some(rows) = st.right.get(&l.key) {
                for r in rows.iter().filter(|r| l.overlaps(*r)) {
                    out.push(self.joined(&l, r, (self.result)(&l.payload, &r.payload)));
                }
            }
            if !st.completed[RIGHT] {
                st.left.entry(l.key.clone()).or_default().push(l);
            }
        }
        self.emit(out);
    }

    fn on_right(&self, batch: Batch<K, R>) {
        let mut st = self.state.lock().unwrap();
        if st.failed {
            return;
        }
        let mut out = Vec::new();
        for r in batch {
            if let Some(rows) = st.left.get(&r.key) {
                for l in rows.iter().filter(|l| l.overlaps(&r)) {
                    out.push(self.joined(l, &r, (self.result)(&l.payload, &r.payload)));
                }
            }
            if !st.completed[LEFT] {
                st.right.entry(r.key.clone()).or_default().push(r);
            }
        }
        self.emit(out);
    }

    fn joined(&self, l: &Event<K, L>, r: &Event<K, R>, o: O) -> Event<K, O> {
        Event::new(
            l.sync_time.max(r.sync_time),
            l.other_time.min(r.other_time),
            l.key.clone(),
            o,
        )
    }

    fn emit(&self, mut out: Batch<K, O>) {
        if !out.is_empty() {
            out.sort_by_key(|e| e.sync_time);
            self.down.on_next(out);
        }
    }

    fn on_punctuation(&self, side: usize, time: Timestamp) {
        let mut st = self.state.lock().unwrap();
        if st.failed || time <= st.frontier[side] {
            return;
        }
        st.frontier[side] = time;
        st.evict(side);
        self.advance(&mut st);
    }

    fn on_completed(&self, side: usize) {
        let mut st = self.state.lock().unwrap();
        if st.failed || st.completed[side] {
            return;
        }
        st.completed[side] = true;
        st.evict(side);
        if st.completed[LEFT] && st.completed[RIGHT] {
            self.down.on_completed();
        } else {
            self.advance(&mut st);
        }
    }

    fn on_error(&self, error: EngineError) {
        let mut st = self.state.lock().unwrap();
        if st.failed {
            return;
        }
        st.failed = true;
        st.left.clear();
        st.right.clear();
        self.down.on_error(error);
    }

    fn advance(&self, st: &mut JoinState<K, L, R>) {
        let b = st.bound();
        if b > st.forwarded && b != INFINITY {
            st.forwarded = b;
            self.down.on_punctuation(b);
        }
    }
}

struct LeftPort<K, L, R, O>(Arc<JoinNode<K, L, R, O>>);
struct RightPort<K, L, R, O>(Arc<JoinNode<K, L, R, O>>);

impl<K: StreamKey, L: StreamData, R: StreamData, O: StreamData> Observer<K, L> for LeftPort<K, L, R, O> {
    fn on_next(&self, batch: Batch<K, L>) {
        self.0.on_left(batch);
    }
    fn on_punctuation(&self, time: Timestamp) {
        self.0.on_punctuation(LEFT, time);
    }
    fn on_completed(&self) {
        self.0.on_completed(LEFT);
    }
    fn on_error(&self, error: EngineError) {
        self.0.on_error(error);
    }
}

impl<K: StreamKey, L: StreamData, R: StreamData, O: StreamData> Observer<K, R> for RightPort<K, L, R, O> {
    fn on_next(&self, batch: Batch<K, R>) {
        self.0.on_right(batch);
    }
    fn on_punctuation(&self, time: Timestamp) {
        self.0.on_punctuation(RIGHT, time);
    }
    fn on_completed(&self) {
        self.0.on_completed(RIGHT);
    }
    fn on_error(&self, error: EngineError) {
        self.0.on_error(error);
    }
}

/// Join `left` and `right` on equal keys and overlapping intervals.
pub fn join<K, L, R, O, F>(left: &Stream<K, L>, right: &Stream<K, R>, result: F) -> Stream<K, O>
where
    K: StreamKey,
    L: StreamData,
    R: StreamData,
    O: StreamData,
    F: Fn(&L, &R) -> O + Send + Sync + 'static,
{
    let result: Arc<dyn Fn(&L, &R) -> O + Send + Sync> = Arc::new(result);
    let lp = left.properties();
    let props = StreamProperties {
        partitioning: lp.partitioning.project(),
        key_distinct: false,
        nested: lp.nested || right.properties().nested,
    };
    binary(Arc::clone(left), Arc::clone(right), props, move |down| {
        let node = Arc::new(JoinNode {
            state: Mutex::new(JoinState {
                left: HashMap::new(),
                right: HashMap::new(),
                frontier: [Timestamp::MIN; 2],
                completed: [false; 2],
                forwarded: Timestamp::MIN,
                failed: false,
            }),
            result: Arc::clone(&result),
            down,
        });
        let l: ObserverRef<K, L> = Arc::new(LeftPort(Arc::clone(&node)));
        let r: ObserverRef<K, R> = Arc::new(RightPort(node));
        (l, r)
    })
}

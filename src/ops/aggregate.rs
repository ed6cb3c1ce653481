//! Windowed per-key aggregation over a [`CombineFn`].
//!
//! Tumbling windows are emitted once a punctuation (or completion) closes them; the output
//! event spans the window. Global windows are emitted on completion only, stamped with the
//! last sync time seen for the key.
//!
//! Punctuations are only forwarded up to the start of the earliest open window, so an
//! output never lands behind a frontier this operator has already announced.

use crate::combiners::CombineFn;
use crate::error::EngineError;
use crate::event::{Batch, Event, INFINITY, StreamData, StreamKey, Timestamp};
use crate::ops::unary;
use crate::stream::{Observer, ObserverRef, Stream};
use crate::window::{Window, Windowing};
use std::collections::{BTreeMap, HashMap};
use std::marker::PhantomData;
use std::sync::{Arc, Mutex};

struct Slot<A> {
    acc: A,
    last_sync: Timestamp,
}

struct AggState<K, A> {
    windows: BTreeMap<Window, HashMap<K, Slot<A>>>,
    forwarded: Timestamp,
    done: bool,
}

struct AggregateObserver<K, V, A, O, C> {
    windowing: Windowing,
    comb: Arc<C>,
    state: Mutex<AggState<K, A>>,
    down: ObserverRef<K, O>,
    _v: PhantomData<fn(V)>,
}

impl<K, V, A, O, C> AggregateObserver<K, V, A, O, C>
where
    K: StreamKey,
    V: StreamData,
    A: Send + 'static,
    O: StreamData,
    C: CombineFn<V, A, O>,
{
    /// Finish every window closed by `frontier`, in window order.
    fn drain_closed(&self, st: &mut AggState<K, A>, frontier: Timestamp) -> Batch<K, O> {
        let closed: Vec<Window> = st
            .windows
            .keys()
            .take_while(|w| frontier == INFINITY || w.closed_by(frontier))
            .copied()
            .collect();
        let mut out = Vec::new();
        for w in closed {
            let Some(groups) = st.windows.remove(&w) else { continue };
            let mut rows: Vec<Event<K, O>> = groups
                .into_iter()
                .map(|(k, slot)| {
                    let o = self.comb.finish(slot.acc);
                    if w == Window::global() {
                        Event::new(slot.last_sync, INFINITY, k, o)
                    } else {
                        Event::new(w.start, w.end, k, o)
                    }
                })
                .collect();
            rows.sort_by_key(|e| e.sync_time);
            out.extend(rows);
        }
        out
    }

    /// The highest frontier that is safe to announce downstream.
    fn safe_frontier(&self, st: &AggState<K, A>, frontier: Timestamp) -> Timestamp {
        match self.windowing {
            Windowing::Global => Timestamp::MIN,
            Windowing::Tumbling { .. } => st.windows.keys().next().map_or(frontier, |w| w.start.min(frontier)),
        }
    }
}

impl<K, V, A, O, C> Observer<K, V> for AggregateObserver<K, V, A, O, C>
where
    K: StreamKey,
    V: StreamData,
    A: Send + 'static,
    O: StreamData,
    C: CombineFn<V, A, O>,
{
    fn on_next(&self, batch: Batch<K, V>) {
        let mut st = self.state.lock().unwrap();
        if st.done {
            return;
        }
        for e in batch {
            let w = self.windowing.assign(e.sync_time);
            let slot = st.windows.entry(w).or_default().entry(e.key).or_insert_with(|| Slot {
                acc: self.comb.create(),
                last_sync: e.sync_time,
            });
            slot.last_sync = slot.last_sync.max(e.sync_time);
            self.comb.add_input(&mut slot.acc, e.payload);
        }
    }

    fn on_punctuation(&self, time: Timestamp) {
        let mut st = self.state.lock().unwrap();
        if st.done {
            return;
        }
        let out = self.drain_closed(&mut st, time);
        if !out.is_empty() {
            self.down.on_next(out);
        }
        let safe = self.safe_frontier(&st, time);
        if safe > st.forwarded {
            st.forwarded = safe;
            self.down.on_punctuation(safe);
        }
    }

    fn on_completed(&self) {
        let mut st = self.state.lock().unwrap();
        if st.done {
            return;
        }
        st.done = true;
        let out = self.drain_closed(&mut st, INFINITY);
        if !out.is_empty() {
            self.down.on_next(out);
        }
        self.down.on_completed();
    }

    fn on_error(&self, error: EngineError) {
        let mut st = self.state.lock().unwrap();
        if st.done {
            return;
        }
        st.done = true;
        st.windows.clear();
        self.down.on_error(error);
    }
}

/// Aggregate payloads per key and window with `comb`.
///
/// ```
/// use ironstream::*;
///
/// # fn main() -> anyhow::Result<()> {
/// let s = from_events(vec![
///     Event::point(1, "a", 2u64),
///     Event::point(2, "a", 3u64),
///     Event::point(12, "a", 4u64),
/// ]);
/// let sums = aggregate(&s, Windowing::tumbling(10), Sum::<u64>::new());
/// let out = collect(&sums)?;
/// assert_eq!(out.iter().map(|e| e.payload).collect::<Vec<_>>(), vec![5, 4]);
/// # Ok(())
/// # }
/// ```
pub fn aggregate<K, V, A, O, C>(input: &Stream<K, V>, windowing: Windowing, comb: C) -> Stream<K, O>
where
    K: StreamKey,
    V: StreamData,
    A: Send + 'static,
    O: StreamData,
    C: CombineFn<V, A, O>,
{
    let comb = Arc::new(comb);
    let mut props = input.properties().project();
    props.key_distinct = true;
    unary(Arc::clone(input), props, move |down| {
        Arc::new(AggregateObserver {
            windowing,
            comb: Arc::clone(&comb),
            state: Mutex::new(AggState {
                windows: BTreeMap::new(),
                forwarded: Timestamp::MIN,
                done: false,
            }),
            down,
            _v: PhantomData,
        })
    })
}

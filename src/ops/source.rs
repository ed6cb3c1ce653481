//! In-memory event sources.
//!
//! ```
//! use ironstream::*;
//!
//! # fn main() -> anyhow::Result<()> {
//! let s = from_points(vec![(1, "a"), (2, "b"), (2, "c")]);
//! let out = collect(&s)?;
//! assert_eq!(out.len(), 3);
//! # Ok(())
//! # }
//! ```

use crate::error::{EngineError, Result};
use crate::event::{Empty, Event, INFINITY, StreamData, StreamKey, Timestamp};
use crate::partition::{PartitionDescriptor, SprayKey};
use crate::selector::{KeySelector, SelectorInfo};
use crate::stream::{ObserverRef, Stream, StreamProperties, Streamable};
use crate::subscription::{DisposeFlag, Pump, Subscription};
use crate::type_token::TypeTag;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

const DEFAULT_BATCH: usize = 1024;

/// A finite, replayable source. Every subscription replays all events from the start.
pub struct EventSource<K, P> {
    events: Arc<Vec<Event<K, P>>>,
    batch_size: usize,
    properties: StreamProperties<P>,
    fail_after: Option<(usize, String)>,
}

impl<K: StreamKey, P: StreamData> EventSource<K, P> {
    /// Events are stable-sorted by `sync_time`.
    pub fn new(mut events: Vec<Event<K, P>>) -> Self {
        events.sort_by_key(|e| e.sync_time);
        Self {
            events: Arc::new(events),
            batch_size: DEFAULT_BATCH,
            properties: StreamProperties::default(),
            fail_after: None,
        }
    }

    /// # Errors
    /// `InvalidConfig` for a zero batch size.
    pub fn with_batch_size(mut self, n: usize) -> Result<Self> {
        if n == 0 {
            return Err(EngineError::invalid("batch size must be positive"));
        }
        self.batch_size = n;
        Ok(self)
    }

    /// Declare that payloads can be hash-partitioned by `selector`.
    #[must_use]
    pub fn sprayable_by<SK: StreamKey>(mut self, selector: &KeySelector<P, SK>) -> Self {
        self.properties.partitioning = PartitionDescriptor::by_payload(SprayKey::from_selector(selector));
        self
    }

    /// Declare that event keys were computed by `selector` (or are opaque when `None`).
    ///
    /// # Errors
    /// `InvalidConfig` if the selector's key type is not `K`.
    pub fn keyed_by(mut self, selector: Option<&SelectorInfo>) -> Result<Self> {
        if let Some(info) = selector {
            if info.key_type() != TypeTag::of::<K>() {
                return Err(EngineError::invalid(format!(
                    "selector `{}` yields {}, but event keys are {}",
                    info.name(),
                    info.key_type(),
                    TypeTag::of::<K>()
                )));
            }
        }
        self.properties.partitioning = PartitionDescriptor::by_event_key(selector.cloned());
        Ok(self)
    }

    /// Mark the source as already living inside a partition.
    #[must_use]
    pub fn nested(mut self) -> Self {
        self.properties.nested = true;
        self
    }

    #[must_use]
    pub fn key_distinct(mut self) -> Self {
        self.properties.key_distinct = true;
        self
    }

    /// Raise `EngineError::Upstream(message)` instead of the batch numbered `batches`.
    #[must_use]
    pub fn failing_after(mut self, batches: usize, message: impl Into<String>) -> Self {
        self.fail_after = Some((batches, message.into()));
        self
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn into_stream(self) -> Stream<K, P> {
        Arc::new(self)
    }
}

impl<K: StreamKey, P: StreamData> Streamable<K, P> for EventSource<K, P> {
    fn properties(&self) -> StreamProperties<P> {
        self.properties.clone()
    }

    fn subscribe(&self, observer: ObserverRef<K, P>) -> Result<Subscription> {
        let flag = DisposeFlag::new();
        let pump = Arc::new(SourcePump {
            events: Arc::clone(&self.events),
            batch_size: self.batch_size,
            fail_after: self.fail_after.clone(),
            cursor: Mutex::new((0, 0)),
            finished: AtomicBool::new(false),
            observer,
            flag: flag.clone(),
        });
        let sub = Subscription::from_disposable(Arc::new(flag));
        sub.add_pump(pump);
        Ok(sub)
    }
}

struct SourcePump<K, P> {
    events: Arc<Vec<Event<K, P>>>,
    batch_size: usize,
    fail_after: Option<(usize, String)>,
    // (next event index, batches sent)
    cursor: Mutex<(usize, usize)>,
    finished: AtomicBool,
    observer: ObserverRef<K, P>,
    flag: DisposeFlag,
}

enum Step<K, P> {
    Batch(Vec<Event<K, P>>, Option<Timestamp>),
    Fail(String),
    Complete,
}

impl<K: StreamKey, P: StreamData> Pump for SourcePump<K, P> {
    fn peek_time(&self) -> Option<Timestamp> {
        if self.finished.load(Ordering::Acquire) || self.flag.is_disposed() {
            return None;
        }
        let (pos, _) = *self.cursor.lock().unwrap();
        Some(self.events.get(pos).map_or(INFINITY, |e| e.sync_time))
    }

    fn step(&self) {
        if self.finished.load(Ordering::Acquire) || self.flag.is_disposed() {
            return;
        }
        let step = {
            let mut cur = self.cursor.lock().unwrap();
            let (pos, sent) = *cur;
            match &self.fail_after {
                Some((n, msg)) if sent == *n => Step::Fail(msg.clone()),
                _ if pos < self.events.len() => {
                    let end = (pos + self.batch_size).min(self.events.len());
                    *cur = (end, sent + 1);
                    let next = self.events.get(end).map(|e| e.sync_time);
                    Step::Batch(self.events[pos..end].to_vec(), next)
                }
                _ => Step::Complete,
            }
        };
        match step {
            Step::Batch(batch, next) => {
                self.observer.on_next(batch);
                if let Some(t) = next {
                    self.observer.on_punctuation(t);
                }
            }
            Step::Fail(msg) => {
                self.finished.store(true, Ordering::Release);
                self.observer.on_error(EngineError::Upstream(msg));
            }
            Step::Complete => {
                self.finished.store(true, Ordering::Release);
                self.observer.on_completed();
            }
        }
    }
}

/// Source over keyed events.
pub fn from_events<K: StreamKey, P: StreamData>(events: Vec<Event<K, P>>) -> Stream<K, P> {
    EventSource::new(events).into_stream()
}

/// Source of ungrouped point events `(time, payload)`.
pub fn from_points<P: StreamData>(points: Vec<(Timestamp, P)>) -> Stream<Empty, P> {
    from_events(
        points
            .into_iter()
            .map(|(t, p)| Event::point(t, Empty, p))
            .collect(),
    )
}

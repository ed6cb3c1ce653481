//! Terminal sinks.

use crate::error::EngineError;
use crate::event::{Batch, Event, StreamData, Timestamp};
use crate::stream::{Observer, Stream};
use anyhow::{Result, anyhow};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Observer that buffers everything it receives.
pub struct Collector<K, P> {
    events: Mutex<Vec<Event<K, P>>>,
    error: Mutex<Option<EngineError>>,
    punctuations: Mutex<Vec<Timestamp>>,
    completed: AtomicBool,
    batches: AtomicUsize,
}

impl<K, P> Default for Collector<K, P> {
    fn default() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            error: Mutex::new(None),
            punctuations: Mutex::new(Vec::new()),
            completed: AtomicBool::new(false),
            batches: AtomicUsize::new(0),
        }
    }
}

impl<K: StreamData, P: StreamData> Collector<K, P> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Snapshot of the rows received so far.
    pub fn events(&self) -> Vec<Event<K, P>> {
        self.events.lock().unwrap().clone()
    }

    pub fn take_events(&self) -> Vec<Event<K, P>> {
        std::mem::take(&mut *self.events.lock().unwrap())
    }

    pub fn punctuations(&self) -> Vec<Timestamp> {
        self.punctuations.lock().unwrap().clone()
    }

    pub fn error(&self) -> Option<EngineError> {
        self.error.lock().unwrap().clone()
    }

    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }

    pub fn batch_count(&self) -> usize {
        self.batches.load(Ordering::Relaxed)
    }
}

impl<K: StreamData, P: StreamData> Observer<K, P> for Collector<K, P> {
    fn on_next(&self, batch: Batch<K, P>) {
        self.batches.fetch_add(1, Ordering::Relaxed);
        self.events.lock().unwrap().extend(batch);
    }

    fn on_punctuation(&self, time: Timestamp) {
        self.punctuations.lock().unwrap().push(time);
    }

    fn on_completed(&self) {
        self.completed.store(true, Ordering::Release);
    }

    fn on_error(&self, error: EngineError) {
        self.error.lock().unwrap().get_or_insert(error);
    }
}

/// Subscribe, drive the sources to exhaustion and return every delivered row.
///
/// Errors raised inside the graph come back as an [`EngineError`] wrapped in
/// `anyhow::Error`, so callers can `downcast_ref::<EngineError>()`.
pub fn collect<K: StreamData, P: StreamData>(stream: &Stream<K, P>) -> Result<Vec<Event<K, P>>> {
    let sink = Collector::<K, P>::new();
    let sub = stream.subscribe(sink.clone())?;
    sub.run();
    sub.dispose();
    if let Some(e) = sink.error() {
        return Err(e.into());
    }
    if !sink.is_completed() {
        return Err(anyhow!("stream stopped before completion"));
    }
    let out = sink.take_events();
    debug!(rows = out.len(), batches = sink.batch_count(), "collected stream");
    Ok(out)
}

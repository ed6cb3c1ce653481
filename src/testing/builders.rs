//! Test data builders for creating event vectors fluently.

use crate::event::{Empty, Event, Timestamp};

/// A fluent builder for keyed events.
///
/// # Example
///
/// ```
/// use ironstream::testing::EventBuilder;
///
/// let events = EventBuilder::new()
///     .add_point(1, "a", 10)
///     .add_interval(2, 5, "b", 20)
///     .add_repeated(3, "a", 1, 4)
///     .build();
///
/// assert_eq!(events.len(), 6);
/// ```
pub struct EventBuilder<K, P> {
    events: Vec<Event<K, P>>,
}

impl<K, P> Default for EventBuilder<K, P> {
    fn default() -> Self {
        Self { events: Vec::new() }
    }
}

impl<K, P> EventBuilder<K, P> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a one-tick event at `time`.
    #[must_use]
    pub fn add_point(mut self, time: Timestamp, key: K, payload: P) -> Self {
        self.events.push(Event::point(time, key, payload));
        self
    }

    /// Add an event covering `[start, end)`.
    #[must_use]
    pub fn add_interval(mut self, start: Timestamp, end: Timestamp, key: K, payload: P) -> Self {
        self.events.push(Event::new(start, end, key, payload));
        self
    }

    /// Add `count` identical point events.
    #[must_use]
    pub fn add_repeated(mut self, time: Timestamp, key: K, payload: P, count: usize) -> Self
    where
        K: Clone,
        P: Clone,
    {
        for _ in 0..count {
            self.events.push(Event::point(time, key.clone(), payload.clone()));
        }
        self
    }

    #[must_use]
    pub fn build(self) -> Vec<Event<K, P>> {
        self.events
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Ungrouped point events carrying `(key, value)` payloads, one per tick, in input order.
///
/// # Example
///
/// ```
/// use ironstream::testing::keyed_points;
///
/// let events = keyed_points(vec![(1u32, "A"), (2, "B")]);
/// assert_eq!(events[1].sync_time, 1);
/// assert_eq!(events[1].payload, (2, "B"));
/// ```
#[must_use]
pub fn keyed_points<RK, V>(rows: Vec<(RK, V)>) -> Vec<Event<Empty, (RK, V)>> {
    rows.into_iter()
        .zip(0..)
        .map(|(row, t)| Event::point(t, Empty, row))
        .collect()
}

/// Reproducible pseudo-random `(key, value)` point events.
///
/// Times are non-decreasing and advance by 0-2 ticks per row, so rows regularly share a
/// timestamp. Uses a linear congruential generator with a fixed seed.
///
/// # Example
///
/// ```
/// use ironstream::testing::pseudo_random_events;
///
/// let events = pseudo_random_events(50, 7, 100);
/// assert_eq!(events.len(), 50);
/// assert!(events.iter().all(|e| e.payload.0 < 7 && e.payload.1 < 100));
/// ```
#[must_use]
pub fn pseudo_random_events(count: usize, num_keys: u32, value_max: u32) -> Vec<Event<Empty, (u32, u32)>> {
    let mut data = Vec::with_capacity(count);
    let mut seed: u32 = 12345;
    let mut t: Timestamp = 0;
    let mut next = || {
        seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
        seed / 65536
    };
    for _ in 0..count {
        t += Timestamp::from(next() % 3);
        let key = next() % num_keys.max(1);
        let value = next() % value_max.max(1);
        data.push(Event::point(t, Empty, (key, value)));
    }
    data
}

//! Subscriptions, disposal and ingress pumps.
//!
//! Subscribing never moves data. Sources register a [`Pump`] with the returned
//! [`Subscription`]; [`Subscription::run`] then drives all pumps, always stepping the one
//! with the smallest pending sync time, until they are exhausted or the subscription is
//! disposed. Every stage adds its own [`Disposable`] to the same composite, so one
//! `dispose()` tears the whole graph down.

use crate::event::Timestamp;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Anything that can be torn down.
pub trait Disposable: Send + Sync {
    fn dispose(&self);
}

/// A shared "stop delivering" flag owned by a stage.
#[derive(Clone, Default, Debug)]
pub struct DisposeFlag(Arc<AtomicBool>);

impl DisposeFlag {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn is_disposed(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

impl Disposable for DisposeFlag {
    fn dispose(&self) {
        self.0.store(true, Ordering::Release);
    }
}

/// Disposal hook backed by a closure.
pub struct OnDispose<F: Fn() + Send + Sync>(pub F);

impl<F: Fn() + Send + Sync> Disposable for OnDispose<F> {
    fn dispose(&self) {
        (self.0)()
    }
}

/// An ingress driver: pushes one batch per step into its observer.
pub trait Pump: Send + Sync {
    /// Sync time of the next batch, or `None` once exhausted.
    fn peek_time(&self) -> Option<Timestamp>;
    /// Push the next batch (and completion after the last one).
    fn step(&self);
}

#[derive(Default)]
struct SubscriptionInner {
    disposables: Mutex<Vec<Arc<dyn Disposable>>>,
    pumps: Mutex<Vec<Arc<dyn Pump>>>,
    disposed: AtomicBool,
}

/// Composite handle over every stage and source of one subscription.
#[derive(Clone, Default)]
pub struct Subscription {
    inner: Arc<SubscriptionInner>,
}

impl Subscription {
    pub fn new() -> Self {
        Self::default()
    }

    /// A subscription holding a single disposable.
    pub fn from_disposable(d: Arc<dyn Disposable>) -> Self {
        let s = Self::new();
        s.add_disposable(d);
        s
    }

    /// Add a child. If this subscription is already disposed, the child is disposed at once.
    pub fn add_disposable(&self, d: Arc<dyn Disposable>) {
        let mut held = self.inner.disposables.lock().unwrap();
        if !self.is_disposed() {
            held.push(d);
            return;
        }
        drop(held);
        d.dispose();
    }

    pub fn add_pump(&self, p: Arc<dyn Pump>) {
        self.inner.pumps.lock().unwrap().push(p);
    }

    /// Move every child of `other` into this composite.
    pub fn absorb(&self, other: Subscription) {
        if Arc::ptr_eq(&self.inner, &other.inner) {
            return;
        }
        let ds: Vec<_> = other.inner.disposables.lock().unwrap().drain(..).collect();
        for d in ds {
            self.add_disposable(d);
        }
        let ps: Vec<_> = other.inner.pumps.lock().unwrap().drain(..).collect();
        self.inner.pumps.lock().unwrap().extend(ps);
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    /// Number of disposables currently held.
    pub fn len(&self) -> usize {
        self.inner.disposables.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Dispose every child exactly once. Idempotent.
    pub fn dispose(&self) {
        let ds: Vec<_> = {
            let mut held = self.inner.disposables.lock().unwrap();
            if self.inner.disposed.swap(true, Ordering::AcqRel) {
                return;
            }
            held.drain(..).collect()
        };
        debug!(stages = ds.len(), "disposing subscription");
        for d in ds {
            d.dispose();
        }
        self.inner.pumps.lock().unwrap().clear();
    }

    /// Drive every pump to exhaustion, earliest pending batch first.
    ///
    /// Returns early if the subscription is disposed, including from inside an observer.
    pub fn run(&self) {
        loop {
            if self.is_disposed() {
                return;
            }
            let next = {
                let pumps = self.inner.pumps.lock().unwrap();
                pumps
                    .iter()
                    .filter_map(|p| p.peek_time().map(|t| (t, Arc::clone(p))))
                    .min_by_key(|(t, _)| *t)
                    .map(|(_, p)| p)
            };
            match next {
                Some(p) => p.step(),
                None => return,
            }
        }
    }
}

impl Disposable for Subscription {
    fn dispose(&self) {
        Subscription::dispose(self);
    }
}

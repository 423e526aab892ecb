//! Subscription Registry and Dynamic Observer
//!
//! Two pieces of subscription plumbing:
//!
//! - [`SubscriptionRegistry`] collects subscriptions so that a component
//!   can tear all of them down at once.
//! - [`DynamicObserver`] is an observer whose destination is itself
//!   reactive: it forwards everything it receives to whichever observer an
//!   inner observable most recently selected.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};

use crate::error::StreamError;
use crate::stream::{Observable, Observer, ObserverRef, Subscription};

/// Identifies a subscription held by a [`SubscriptionRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegistryKey(u64);

impl RegistryKey {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// A set of subscriptions released together.
#[derive(Default)]
pub struct SubscriptionRegistry {
    entries: Mutex<IndexMap<RegistryKey, Subscription>>,
}

impl SubscriptionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of `subscription`.
    pub fn add(&self, subscription: Subscription) -> RegistryKey {
        let key = RegistryKey::new();
        self.entries.lock().insert(key, subscription);
        key
    }

    /// Give a subscription back without unsubscribing it.
    pub fn remove(&self, key: RegistryKey) -> Option<Subscription> {
        self.entries.lock().shift_remove(&key)
    }

    /// Unsubscribe every member and empty the registry.
    ///
    /// Works on a snapshot: subscriptions added while this runs, for
    /// instance by another subscription's teardown, stay registered.
    pub fn unsubscribe_all(&self) {
        let members = std::mem::take(&mut *self.entries.lock());
        if members.is_empty() {
            return;
        }

        tracing::debug!(count = members.len(), "unsubscribing registry");
        for (_, subscription) in members {
            subscription.unsubscribe();
        }
    }

    /// Number of subscriptions held.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the registry holds no subscriptions.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionRegistry")
            .field("len", &self.len())
            .finish()
    }
}

/// An observer that forwards to a target chosen by another observable.
///
/// While no target is selected, everything received is dropped.
///
/// ```rust,ignore
/// let target: Signal<Option<ObserverRef<i32>>> = Signal::new(None);
/// let forward = DynamicObserver::new(&target);
/// let _sub = values.subscribe(forward.clone());
///
/// target.set(Some(ObserverRef::new(|v: &i32| println!("{v}"))));
/// ```
pub struct DynamicObserver<T> {
    inner: Arc<DynamicInner<T>>,
}

struct DynamicInner<T> {
    target: RwLock<Option<ObserverRef<T>>>,
    tracking: Mutex<Option<Subscription>>,
}

impl<T> DynamicObserver<T>
where
    T: 'static,
{
    /// Follow the observers selected by `selector`.
    pub fn new<S>(selector: &S) -> Self
    where
        S: Observable<Option<ObserverRef<T>>> + ?Sized,
    {
        let inner = Arc::new(DynamicInner {
            target: RwLock::new(None),
            tracking: Mutex::new(None),
        });

        let weak: Weak<DynamicInner<T>> = Arc::downgrade(&inner);
        let tracker: Arc<dyn Observer<Option<ObserverRef<T>>>> =
            Arc::new(move |selection: &Option<ObserverRef<T>>| {
                if let Some(inner) = weak.upgrade() {
                    *inner.target.write() = selection.clone();
                }
            });
        *inner.tracking.lock() = Some(selector.subscribe_arc(tracker));

        Self { inner }
    }

    /// Stop following target changes.
    ///
    /// The last selected target keeps receiving what this observer is
    /// given.
    pub fn unsubscribe(&self) {
        let tracking = self.inner.tracking.lock().take();
        if let Some(tracking) = tracking {
            tracking.unsubscribe();
        }
    }

    /// Whether a target is currently selected.
    pub fn has_target(&self) -> bool {
        self.inner.target.read().is_some()
    }

    fn target(&self) -> Option<ObserverRef<T>> {
        self.inner.target.read().clone()
    }
}

impl<T> Observer<T> for DynamicObserver<T>
where
    T: 'static,
{
    fn next(&self, value: &T) {
        if let Some(target) = self.target() {
            target.observer().next(value);
        }
    }

    fn error(&self, error: &StreamError) {
        if let Some(target) = self.target() {
            target.observer().error(error);
        }
    }

    fn complete(&self) {
        if let Some(target) = self.target() {
            target.observer().complete();
        }
    }
}

impl<T> Clone for DynamicObserver<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

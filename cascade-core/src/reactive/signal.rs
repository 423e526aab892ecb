//! Signal Implementation
//!
//! A Signal is the reactive cell: it always holds a value, reads are
//! synchronous, and changes reach subscribers one scheduler tick later.
//!
//! # How Signals Work
//!
//! 1. `set` stores the new value immediately, so `get` sees it at once.
//!
//! 2. The comparator decides whether the change is worth announcing. The
//!    default comparator is `PartialEq`; setting an equal value stores it
//!    and stops there.
//!
//! 3. Otherwise a task is scheduled. On the next tick it runs the update
//!    callback with `(new, previous)` and emits the new value.
//!
//! 4. A new subscriber receives the value current at subscription time on
//!    the next tick, unless an emission reaches it first.
//!
//! # Views
//!
//! [`ReadSignal`] is the read-only surface: `get`, `with`, `subscribe`.
//! [`Signal`] dereferences to it and adds the write side. Both share one
//! value and one subscriber set.

use std::fmt::{self, Debug};
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::error::StreamError;
use crate::scheduler::{current_scheduler, SchedulerHandle};
use crate::stream::{
    channel, Emitter, Interop, KeepAlive, Observable, Observer, Stream, StreamStatus, Subscription,
};

/// Counter for generating unique signal IDs.
static SIGNAL_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a new unique signal ID.
fn next_signal_id() -> u64 {
    SIGNAL_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Decides whether two values are equal (no notification needed).
pub type Comparator<T> = Arc<dyn Fn(&T, &T) -> bool + Send + Sync>;

/// Invoked with `(new, previous)` just before a change is emitted.
pub type UpdateCallback<T> = Arc<dyn Fn(&T, &T) + Send + Sync>;

pub(crate) struct SignalInner<T> {
    /// Unique identifier for this signal.
    id: u64,

    value: RwLock<T>,

    comparator: Option<Comparator<T>>,

    on_update: Option<UpdateCallback<T>>,

    /// False until the first value has been announced. While false, `set`
    /// bypasses the comparator.
    initialized: AtomicBool,

    emitter: Emitter<T>,

    stream: Stream<T>,

    scheduler: SchedulerHandle,
}

/// The read-only view of a signal.
pub struct ReadSignal<T> {
    inner: Arc<SignalInner<T>>,
}

/// A reactive cell holding a value of type `T`.
///
/// # Example
///
/// ```rust,ignore
/// let count = Signal::new(0);
/// let _sub = count.subscribe(|v: &i32| println!("count = {v}"));
///
/// count.set(5);
/// assert_eq!(count.get(), 5);   // immediately
/// event_loop.tick();            // prints "count = 5"
/// ```
pub struct Signal<T> {
    read: ReadSignal<T>,
}

/// A signal handle that does not keep the signal alive.
pub(crate) struct WeakSignal<T> {
    inner: Weak<SignalInner<T>>,
}

/// Configures a [`Signal`] before creating it.
pub struct SignalBuilder<T> {
    value: T,
    comparator: Option<Comparator<T>>,
    on_update: Option<UpdateCallback<T>>,
    scheduler: Option<SchedulerHandle>,
    initialized: bool,
}

impl<T> SignalBuilder<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// A builder with no comparator: every `set` notifies.
    pub fn new(value: T) -> Self {
        Self {
            value,
            comparator: None,
            on_update: None,
            scheduler: None,
            initialized: true,
        }
    }

    /// Use a custom equality test.
    pub fn comparator<F>(mut self, comparator: F) -> Self
    where
        F: Fn(&T, &T) -> bool + Send + Sync + 'static,
    {
        self.comparator = Some(Arc::new(comparator));
        self
    }

    /// Notify on every `set`, even when the value did not change.
    pub fn no_comparator(mut self) -> Self {
        self.comparator = None;
        self
    }

    /// Run `callback(new, previous)` before each change is emitted.
    pub fn on_update<F>(mut self, callback: F) -> Self
    where
        F: Fn(&T, &T) + Send + Sync + 'static,
    {
        self.on_update = Some(Arc::new(callback));
        self
    }

    /// Schedule notifications on `scheduler` instead of the current one.
    pub fn scheduler(mut self, scheduler: SchedulerHandle) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Treat the builder's value as a placeholder: the first `set` always
    /// notifies.
    pub(crate) fn placeholder(mut self) -> Self {
        self.initialized = false;
        self
    }

    /// Create the signal.
    pub fn build(self) -> Signal<T> {
        let (emitter, stream) = channel();
        Signal {
            read: ReadSignal {
                inner: Arc::new(SignalInner {
                    id: next_signal_id(),
                    value: RwLock::new(self.value),
                    comparator: self.comparator,
                    on_update: self.on_update,
                    initialized: AtomicBool::new(self.initialized),
                    emitter,
                    stream,
                    scheduler: self.scheduler.unwrap_or_else(current_scheduler),
                }),
            },
        }
    }
}

impl<T> Signal<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    /// Create a signal compared with `PartialEq`.
    pub fn new(value: T) -> Self {
        Self::builder(value).build()
    }

    /// Configure a signal, starting from `PartialEq` comparison.
    pub fn builder(value: T) -> SignalBuilder<T> {
        SignalBuilder::new(value).comparator(|a: &T, b: &T| a == b)
    }
}

impl<T> Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Store a new value and, unless the comparator reports it equal,
    /// announce it on the next tick.
    pub fn set(&self, value: T) {
        let inner = &self.read.inner;
        let previous = std::mem::replace(&mut *inner.value.write(), value.clone());

        let first = !inner.initialized.swap(true, Ordering::SeqCst);
        if !first {
            if let Some(equal) = &inner.comparator {
                if equal(&previous, &value) {
                    tracing::trace!(signal = inner.id, "value unchanged; not notifying");
                    return;
                }
            }
        }

        let task_inner = Arc::clone(inner);
        inner.scheduler.schedule(Box::new(move || {
            if let Some(callback) = &task_inner.on_update {
                callback(&value, &previous);
            }
            task_inner.emitter.next(value);
        }));
    }

    /// Set the value computed from the current one.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        let next = self.with(f);
        self.set(next);
    }

    /// Terminate the signal with an error on the next tick.
    ///
    /// Upstream subscriptions are released at once.
    pub fn fail(&self, error: impl Into<StreamError>) {
        let error = error.into();
        let inner = &self.read.inner;
        tracing::debug!(signal = inner.id, %error, "signal failing");
        inner.stream.release_upstream();

        let task_inner = Arc::clone(inner);
        inner
            .scheduler
            .schedule(Box::new(move || task_inner.emitter.error(error)));
    }

    /// Complete the signal on the next tick. The value stays readable.
    pub fn complete(&self) {
        let inner = &self.read.inner;
        inner.stream.release_upstream();

        let task_inner = Arc::clone(inner);
        inner
            .scheduler
            .schedule(Box::new(move || task_inner.emitter.complete()));
    }

    /// The read-only view of this signal.
    pub fn as_readonly(&self) -> ReadSignal<T> {
        self.read.clone()
    }

    pub(crate) fn downgrade(&self) -> WeakSignal<T> {
        WeakSignal {
            inner: Arc::downgrade(&self.read.inner),
        }
    }
}

impl<T> ReadSignal<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// The signal's unique ID.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// A clone of the current value.
    pub fn get(&self) -> T {
        self.inner.value.read().clone()
    }

    /// Borrow the current value.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.value.read())
    }

    /// Lifecycle state of the underlying stream.
    pub fn status(&self) -> StreamStatus {
        self.inner.stream.status()
    }

    /// Whether the signal has completed or failed.
    pub fn is_terminated(&self) -> bool {
        self.inner.stream.is_terminated()
    }

    /// Number of registered subscribers, including stale ones.
    pub fn subscriber_count(&self) -> usize {
        self.inner.stream.observer_count()
    }

    /// A view that holds its subscribers strongly.
    pub fn as_interop(&self) -> Interop<T> {
        Interop::new(self.clone())
    }

    /// The scheduler this signal notifies on.
    pub(crate) fn scheduler(&self) -> SchedulerHandle {
        Arc::clone(&self.inner.scheduler)
    }

    /// Observe changes only, without the initial delivery.
    ///
    /// The subscription keeps this signal alive.
    pub(crate) fn watch(&self, observer: Arc<dyn Observer<T>>) -> Subscription {
        let keepalive: KeepAlive = self.inner.clone();
        self.inner.stream.attach(observer, Some(keepalive)).0
    }

    /// Tie a subscription to this signal's lifetime.
    pub(crate) fn retain_upstream(&self, subscription: Subscription) {
        self.inner.stream.retain_upstream(subscription);
    }
}

/// Wraps a subscriber to remember whether an emission reached it.
struct Tracked<T> {
    delivered: AtomicBool,
    observer: Arc<dyn Observer<T>>,
}

impl<T> Observer<T> for Tracked<T> {
    fn next(&self, value: &T) {
        self.delivered.store(true, Ordering::SeqCst);
        self.observer.next(value);
    }

    fn error(&self, error: &StreamError) {
        self.observer.error(error);
    }

    fn complete(&self) {
        self.observer.complete();
    }
}

impl<T> Observable<T> for ReadSignal<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn subscribe_arc(&self, observer: Arc<dyn Observer<T>>) -> Subscription {
        let tracked = Arc::new(Tracked {
            delivered: AtomicBool::new(false),
            observer,
        });
        let keepalive: KeepAlive = self.inner.clone();
        let (subscription, key) = self.inner.stream.attach(tracked.clone(), Some(keepalive));

        if let Some(key) = key {
            let value = self.get();
            let stream = self.inner.stream.clone();
            let target = Arc::downgrade(&tracked);
            self.inner.scheduler.schedule(Box::new(move || {
                let Some(tracked) = target.upgrade() else {
                    return;
                };
                if tracked.delivered.load(Ordering::SeqCst) || !stream.is_registered(key) {
                    return;
                }
                tracked.next(&value);
            }));
        }

        subscription
    }

    fn status(&self) -> StreamStatus {
        ReadSignal::status(self)
    }
}

impl<T> Observable<T> for Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn subscribe_arc(&self, observer: Arc<dyn Observer<T>>) -> Subscription {
        self.read.subscribe_arc(observer)
    }

    fn status(&self) -> StreamStatus {
        self.read.status()
    }
}

/// A signal is also a sink: values become `set`, errors become `fail`,
/// completion completes it.
impl<T> Observer<T> for Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn next(&self, value: &T) {
        self.set(value.clone());
    }

    fn error(&self, error: &StreamError) {
        self.fail(error.clone());
    }

    fn complete(&self) {
        Signal::complete(self);
    }
}

impl<T> WeakSignal<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub(crate) fn upgrade(&self) -> Option<Signal<T>> {
        self.inner.upgrade().map(|inner| Signal {
            read: ReadSignal { inner },
        })
    }
}

impl<T> Clone for WeakSignal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
        }
    }
}

impl<T> Deref for Signal<T> {
    type Target = ReadSignal<T>;

    fn deref(&self) -> &ReadSignal<T> {
        &self.read
    }
}

impl<T> Clone for ReadSignal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            read: self.read.clone(),
        }
    }
}

/// Signals compare by identity, so a signal can itself be a signal's value.
impl<T> PartialEq for ReadSignal<T> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T> Eq for ReadSignal<T> {}

impl<T> PartialEq for Signal<T> {
    fn eq(&self, other: &Self) -> bool {
        self.read == other.read
    }
}

impl<T> Eq for Signal<T> {}

impl<T> From<Signal<T>> for ReadSignal<T> {
    fn from(signal: Signal<T>) -> Self {
        signal.read
    }
}

impl<T> Debug for ReadSignal<T>
where
    T: Clone + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.inner.id)
            .field("value", &*self.inner.value.read())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

impl<T> Debug for Signal<T>
where
    T: Clone + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Debug::fmt(&self.read, f)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

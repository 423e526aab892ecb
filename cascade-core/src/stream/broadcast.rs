//! Broadcast Stream
//!
//! A multicast stream whose subscribers are held weakly.
//!
//! # Handle Table
//!
//! Observers live in a `SlotMap`, keyed by index plus generation. A stream
//! only keeps a `Weak` to each observer; the strong reference belongs to the
//! [`Subscription`]. When a subscription is dropped without unsubscribing,
//! the observer dies and its slot goes stale. Stale slots are pruned lazily,
//! the next time the stream walks its observers. The generation in each key
//! means an old key can never reach a slot that was reused.
//!
//! # Emission
//!
//! Every emission snapshots the live observers under the lock, releases the
//! lock, then calls them. Observers may therefore subscribe, unsubscribe or
//! emit from inside a callback.
//!
//! # Termination
//!
//! `complete` and `error` are terminal. Afterwards every emission is a
//! silent no-op and new subscriptions come back closed.

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use slotmap::{new_key_type, SlotMap};
use smallvec::SmallVec;

use super::interop::Interop;
use super::observer::Observer;
use super::subscription::{Link, Subscription};
use super::Observable;
use crate::error::StreamError;

new_key_type! {
    /// Key of an observer slot in a stream's handle table.
    pub struct ObserverKey;
}

/// Keeps an arbitrary value alive for as long as a subscription exists.
pub(crate) type KeepAlive = Arc<dyn Any + Send + Sync>;

type Snapshot<T> = SmallVec<[Arc<dyn Observer<T>>; 4]>;

/// Lifecycle state of a stream.
#[derive(Debug, Clone)]
pub enum StreamStatus {
    /// Still accepting values.
    Active,
    /// Finished normally.
    Completed,
    /// Terminated with an error.
    Errored(StreamError),
}

impl StreamStatus {
    /// Whether the stream has reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StreamStatus::Active)
    }
}

/// The subscribe-only view of a broadcast stream.
pub struct Stream<T> {
    inner: Arc<StreamInner<T>>,
}

/// The driving side of a broadcast stream.
///
/// Only whoever created the stream holds one, so only they can emit.
pub struct Emitter<T> {
    inner: Arc<StreamInner<T>>,
}

/// An emitter that does not keep its stream alive.
pub struct WeakEmitter<T> {
    inner: Weak<StreamInner<T>>,
}

pub(crate) struct StreamInner<T> {
    state: Mutex<BroadcastState<T>>,

    /// Subscriptions this stream depends on. Released on termination.
    upstream: Mutex<Vec<Subscription>>,
}

struct BroadcastState<T> {
    slots: SlotMap<ObserverKey, Weak<dyn Observer<T>>>,

    /// Keys in subscription order; emission follows this order.
    order: Vec<ObserverKey>,

    status: StreamStatus,
}

/// Create a stream and the emitter that drives it.
pub fn channel<T>() -> (Emitter<T>, Stream<T>)
where
    T: Send + Sync + 'static,
{
    let inner = Arc::new(StreamInner {
        state: Mutex::new(BroadcastState {
            slots: SlotMap::with_key(),
            order: Vec::new(),
            status: StreamStatus::Active,
        }),
        upstream: Mutex::new(Vec::new()),
    });

    (
        Emitter {
            inner: Arc::clone(&inner),
        },
        Stream { inner },
    )
}

impl<T> StreamInner<T>
where
    T: Send + Sync + 'static,
{
    fn attach(
        self: &Arc<Self>,
        observer: Arc<dyn Observer<T>>,
        keepalive: Option<KeepAlive>,
    ) -> (Subscription, Option<ObserverKey>) {
        let key = {
            let mut state = self.state.lock();
            if state.status.is_terminal() {
                return (Subscription::closed(), None);
            }
            let key = state.slots.insert(Arc::downgrade(&observer));
            state.order.push(key);
            key
        };

        tracing::debug!(?key, "observer subscribed");

        let link = BroadcastLink {
            stream: Arc::clone(self),
            key,
            _observer: observer,
            _keepalive: keepalive,
        };
        (Subscription::new(link), Some(key))
    }

    fn detach(&self, key: ObserverKey) {
        let mut state = self.state.lock();
        if state.slots.remove(key).is_some() {
            state.order.retain(|k| *k != key);
            tracing::debug!(?key, "observer unsubscribed");
        }
    }

    fn contains(&self, key: ObserverKey) -> bool {
        self.state.lock().slots.contains_key(key)
    }

    /// Upgrade live observers and drop stale slots.
    fn live(state: &mut BroadcastState<T>) -> Snapshot<T> {
        let mut live = Snapshot::new();
        let BroadcastState { slots, order, .. } = state;
        order.retain(|key| match slots.get(*key).and_then(Weak::upgrade) {
            Some(observer) => {
                live.push(observer);
                true
            }
            None => {
                slots.remove(*key);
                false
            }
        });
        live
    }

    fn emit_next(&self, value: &T) {
        let observers = {
            let mut state = self.state.lock();
            if state.status.is_terminal() {
                return;
            }
            Self::live(&mut state)
        };

        tracing::trace!(observers = observers.len(), "emit next");
        for observer in observers {
            observer.next(value);
        }
    }

    fn terminate(&self, status: StreamStatus) {
        let observers = {
            let mut state = self.state.lock();
            if state.status.is_terminal() {
                return;
            }
            let observers = Self::live(&mut state);
            state.status = status.clone();
            observers
        };

        tracing::debug!(observers = observers.len(), ?status, "stream terminated");
        for observer in &observers {
            match &status {
                StreamStatus::Errored(error) => observer.error(error),
                _ => observer.complete(),
            }
        }

        {
            let mut state = self.state.lock();
            state.slots.clear();
            state.order.clear();
        }
        self.release_upstream();
    }

    fn release_upstream(&self) {
        let upstream = std::mem::take(&mut *self.upstream.lock());
        for subscription in upstream {
            subscription.unsubscribe();
        }
    }
}

struct BroadcastLink<T> {
    stream: Arc<StreamInner<T>>,
    key: ObserverKey,
    _observer: Arc<dyn Observer<T>>,
    _keepalive: Option<KeepAlive>,
}

impl<T> Link for BroadcastLink<T>
where
    T: Send + Sync + 'static,
{
    fn unlink(&self) {
        self.stream.detach(self.key);
    }

    fn is_linked(&self) -> bool {
        self.stream.contains(self.key)
    }
}

impl<T> Stream<T>
where
    T: Send + Sync + 'static,
{
    /// Register an observer, keeping `keepalive` alive with the
    /// subscription. Also returns the slot key when registration happened.
    pub(crate) fn attach(
        &self,
        observer: Arc<dyn Observer<T>>,
        keepalive: Option<KeepAlive>,
    ) -> (Subscription, Option<ObserverKey>) {
        self.inner.attach(observer, keepalive)
    }

    /// Whether `key` still names a registered observer.
    pub(crate) fn is_registered(&self, key: ObserverKey) -> bool {
        self.inner.contains(key)
    }

    /// Tie an upstream subscription to this stream's lifetime.
    ///
    /// Released (unsubscribed) when this stream terminates, or immediately
    /// if it already has.
    pub(crate) fn retain_upstream(&self, subscription: Subscription) {
        if self.is_terminated() {
            subscription.unsubscribe();
            return;
        }
        self.inner.upstream.lock().push(subscription);
    }

    /// Unsubscribe every retained upstream subscription now.
    pub(crate) fn release_upstream(&self) {
        self.inner.release_upstream();
    }

    /// Current lifecycle state.
    pub fn status(&self) -> StreamStatus {
        self.inner.state.lock().status.clone()
    }

    /// Whether the stream has completed or errored.
    pub fn is_terminated(&self) -> bool {
        self.inner.state.lock().status.is_terminal()
    }

    /// Number of registered slots, including stale ones not yet pruned.
    pub fn observer_count(&self) -> usize {
        self.inner.state.lock().slots.len()
    }

    /// A view that holds its subscribers strongly.
    pub fn as_interop(&self) -> Interop<T> {
        Interop::new(self.clone())
    }
}

impl<T> Observable<T> for Stream<T>
where
    T: Send + Sync + 'static,
{
    fn subscribe_arc(&self, observer: Arc<dyn Observer<T>>) -> Subscription {
        self.attach(observer, None).0
    }

    fn status(&self) -> StreamStatus {
        Stream::status(self)
    }
}

impl<T> Clone for Stream<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for Stream<T>
where
    T: Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream")
            .field("status", &self.status())
            .field("observer_count", &self.observer_count())
            .finish()
    }
}

impl<T> Emitter<T>
where
    T: Send + Sync + 'static,
{
    /// Deliver a value to every live observer. No-op once terminated.
    pub fn next(&self, value: T) {
        self.inner.emit_next(&value);
    }

    /// Finish the stream. No-op once terminated.
    pub fn complete(&self) {
        self.inner.terminate(StreamStatus::Completed);
    }

    /// Fail the stream. No-op once terminated.
    pub fn error(&self, error: impl Into<StreamError>) {
        self.inner.terminate(StreamStatus::Errored(error.into()));
    }

    /// Whether the stream has terminated.
    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().status.is_terminal()
    }

    /// The subscribe-only view of this emitter's stream.
    pub fn stream(&self) -> Stream<T> {
        Stream {
            inner: Arc::clone(&self.inner),
        }
    }

    /// An emitter that does not keep the stream alive.
    pub fn downgrade(&self) -> WeakEmitter<T> {
        WeakEmitter {
            inner: Arc::downgrade(&self.inner),
        }
    }
}

impl<T> Clone for Emitter<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> WeakEmitter<T>
where
    T: Send + Sync + 'static,
{
    /// Recover a strong emitter if the stream still exists.
    pub fn upgrade(&self) -> Option<Emitter<T>> {
        self.inner.upgrade().map(|inner| Emitter { inner })
    }

    /// The stream, if it still exists.
    pub fn stream(&self) -> Option<Stream<T>> {
        self.inner.upgrade().map(|inner| Stream { inner })
    }
}

impl<T> Clone for WeakEmitter<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

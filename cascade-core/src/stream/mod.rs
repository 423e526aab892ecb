//! Streams
//!
//! The broadcast primitive every other part of the engine is built on.
//!
//! # Concepts
//!
//! ## Stream and Emitter
//!
//! [`channel`] returns a pair: the [`Emitter`] drives the stream
//! (`next`, `complete`, `error`) and the [`Stream`] can only be subscribed
//! to. Handing out the `Stream` never hands out the right to emit.
//!
//! ## Observers and Subscriptions
//!
//! An [`Observer`] receives `next`, `error` and `complete`. Subscribing
//! returns a [`Subscription`], which owns the observer; the stream itself
//! only holds it weakly.
//!
//! ## Observable
//!
//! [`Observable`] is what streams, signals and derived cells have in
//! common: something that can be subscribed to. Combinators and the async
//! bridge accept any `Observable`.

mod broadcast;
mod interop;
mod observer;
mod subscription;

use std::sync::Arc;

pub use broadcast::{channel, Emitter, ObserverKey, Stream, StreamStatus, WeakEmitter};
pub use interop::{Interop, InteropHandle};
pub use observer::{Observer, ObserverFns, ObserverRef};
pub use subscription::Subscription;

pub(crate) use broadcast::KeepAlive;
#[cfg(test)]
pub(crate) use subscription::Link;

/// A source of values that observers can subscribe to.
pub trait Observable<T>: Send + Sync {
    /// Register a shared observer.
    fn subscribe_arc(&self, observer: Arc<dyn Observer<T>>) -> Subscription;

    /// Whether the source is still active, and how it ended if not.
    ///
    /// A terminated source refuses new subscriptions, so this is the only
    /// way a late subscriber learns the outcome.
    fn status(&self) -> StreamStatus;

    /// Register an observer.
    fn subscribe<O>(&self, observer: O) -> Subscription
    where
        O: Observer<T> + 'static,
        Self: Sized,
    {
        self.subscribe_arc(Arc::new(observer))
    }
}

impl<T, S> Observable<T> for Arc<S>
where
    S: Observable<T> + ?Sized,
{
    fn subscribe_arc(&self, observer: Arc<dyn Observer<T>>) -> Subscription {
        (**self).subscribe_arc(observer)
    }

    fn status(&self) -> StreamStatus {
        (**self).status()
    }
}

//! Stream Combinators
//!
//! Operators that derive a new [`Stream`] from any [`Observable`].
//!
//! # Ownership
//!
//! The derived stream retains its upstream subscription, so a chain such as
//! `source.filter(..).map(..)` stays connected for as long as someone holds
//! the last stream or a subscription to it. The listener registered on the
//! source only holds the derived stream's emitter weakly; dropping the chain
//! releases everything.
//!
//! # Termination
//!
//! `error` and `complete` pass straight through. Terminating a derived
//! stream also unsubscribes it from its source.
//!
//! Every operator exists both as a free function over any `Observable`
//! (signals included) and as a method on `Stream`.

mod buffer;
mod filter;
mod map;
mod merge;

use std::marker::PhantomData;
use std::sync::Arc;

pub use buffer::buffer;
pub use filter::filter;
pub use map::{map, try_map};
pub use merge::merge;

use crate::error::StreamError;
use crate::stream::{channel, Emitter, Observable, Observer, Stream, WeakEmitter};

/// Subscribe `build`'s observer to `source` and return the stream it feeds.
pub(crate) fn derive<T, U, S, B>(source: &S, build: B) -> Stream<U>
where
    S: Observable<T> + ?Sized,
    U: Send + Sync + 'static,
    B: FnOnce(WeakEmitter<U>) -> Arc<dyn Observer<T>>,
{
    let (emitter, stream) = channel();
    let observer = build(emitter.downgrade());
    let subscription = source.subscribe_arc(observer);
    stream.retain_upstream(subscription);
    stream
}

/// Forwards terminal signals unchanged and hands each value to `on_next`.
pub(crate) struct Forward<T, U, N> {
    sink: WeakEmitter<U>,
    on_next: N,
    _source: PhantomData<fn(&T)>,
}

impl<T, U, N> Forward<T, U, N>
where
    U: Send + Sync + 'static,
    N: Fn(&T, &Emitter<U>) + Send + Sync,
{
    pub(crate) fn new(sink: WeakEmitter<U>, on_next: N) -> Self {
        Self {
            sink,
            on_next,
            _source: PhantomData,
        }
    }
}

impl<T, U, N> Observer<T> for Forward<T, U, N>
where
    U: Send + Sync + 'static,
    N: Fn(&T, &Emitter<U>) + Send + Sync,
{
    fn next(&self, value: &T) {
        if let Some(emitter) = self.sink.upgrade() {
            (self.on_next)(value, &emitter);
        }
    }

    fn error(&self, error: &StreamError) {
        if let Some(emitter) = self.sink.upgrade() {
            emitter.error(error.clone());
        }
    }

    fn complete(&self) {
        if let Some(emitter) = self.sink.upgrade() {
            emitter.complete();
        }
    }
}

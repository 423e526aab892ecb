//! Async Bridge
//!
//! Converts between observables and futures.
//!
//! # Stream to future
//!
//! [`to_future`] subscribes at once and returns a future that settles
//! exactly once:
//!
//! - with the first value accepted by `should_resolve`;
//! - with the last value seen, if the source completes before any value
//!   was accepted;
//! - with [`BridgeError::CompletedWithoutValue`] if it completes having
//!   produced nothing;
//! - with [`BridgeError::Source`] if it errors;
//! - with [`BridgeError::Cancelled`] or [`BridgeError::TimedOut`] if the
//!   cancellation future or the timeout wins the race.
//!
//! Whichever outcome comes first unsubscribes from the source; the others
//! are ignored.
//!
//! # Future to stream
//!
//! [`from_future`] runs a future on the tokio runtime and emits its value
//! followed by `complete`, or only `error` if it fails.

use std::future::{pending, Future};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::oneshot;

use crate::error::{BridgeError, EngineError, Result, StreamError};
use crate::reactive::ReadSignal;
use crate::stream::{channel, Observable, Observer, Stream, StreamStatus};

type Predicate<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;
type Outcome<T> = std::result::Result<T, BridgeError>;

/// How [`to_future`] decides when to settle.
pub struct ResolveOptions<T> {
    should_resolve: Option<Predicate<T>>,
    timeout: Option<Duration>,
    cancel: Option<BoxFuture<'static, ()>>,
}

impl<T> ResolveOptions<T> {
    /// Resolve on the first value, with no cancellation or timeout.
    pub fn new() -> Self {
        Self {
            should_resolve: None,
            timeout: None,
            cancel: None,
        }
    }

    /// Resolve only on a value accepted by `predicate`.
    pub fn resolve_when<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.should_resolve = Some(Arc::new(predicate));
        self
    }

    /// Reject with [`BridgeError::TimedOut`] after `timeout`.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Reject with [`BridgeError::Cancelled`] once `cancel` completes.
    pub fn cancel_on<F>(mut self, cancel: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.cancel = Some(cancel.boxed());
        self
    }
}

impl<T> Default for ResolveOptions<T> {
    fn default() -> Self {
        Self::new()
    }
}

struct Resolver<T> {
    should_resolve: Option<Predicate<T>>,
    state: Mutex<ResolverState<T>>,
}

struct ResolverState<T> {
    last: Option<T>,
    settle: Option<oneshot::Sender<Outcome<T>>>,
}

impl<T> Resolver<T> {
    fn settle(&self, outcome: Outcome<T>) {
        let sender = self.state.lock().settle.take();
        if let Some(sender) = sender {
            // The receiver is gone only if the future was dropped.
            let _ = sender.send(outcome);
        }
    }
}

impl<T> Observer<T> for Resolver<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn next(&self, value: &T) {
        let accepted = self
            .should_resolve
            .as_ref()
            .map_or(true, |predicate| predicate(value));
        if accepted {
            self.settle(Ok(value.clone()));
        } else {
            self.state.lock().last = Some(value.clone());
        }
    }

    fn error(&self, error: &StreamError) {
        self.settle(Err(BridgeError::Source(error.clone())));
    }

    fn complete(&self) {
        let last = self.state.lock().last.take();
        self.settle(last.ok_or(BridgeError::CompletedWithoutValue));
    }
}

/// Settle a future from the values of `source`.
///
/// The subscription is made before this function returns, so values
/// emitted before the future is first polled still count.
pub fn to_future<T, S>(
    source: &S,
    options: ResolveOptions<T>,
) -> impl Future<Output = Outcome<T>> + Send + 'static
where
    S: Observable<T> + ?Sized,
    T: Clone + Send + Sync + 'static,
{
    let ResolveOptions {
        should_resolve,
        timeout,
        cancel,
    } = options;

    let (settle, settled) = oneshot::channel();
    let resolver = Arc::new(Resolver {
        should_resolve,
        state: Mutex::new(ResolverState {
            last: None,
            settle: Some(settle),
        }),
    });
    let subscription = source.subscribe_arc(resolver);

    // A terminated source refuses the subscription and the sender is
    // dropped unused; report how the source ended instead.
    let refusal = match source.status() {
        StreamStatus::Errored(error) => BridgeError::Source(error),
        _ => BridgeError::CompletedWithoutValue,
    };

    async move {
        let cancelled = async move {
            match cancel {
                Some(cancel) => cancel.await,
                None => pending().await,
            }
        };
        let timed_out = async move {
            match timeout {
                Some(timeout) => tokio::time::sleep(timeout).await,
                None => pending().await,
            }
        };

        let outcome = tokio::select! {
            result = settled => result.unwrap_or(Err(refusal)),
            _ = cancelled => Err(BridgeError::Cancelled),
            _ = timed_out => Err(BridgeError::TimedOut),
        };

        subscription.unsubscribe();
        if let Err(error) = &outcome {
            tracing::debug!(%error, "stream future rejected");
        }
        outcome
    }
}

/// Run `future` on the current tokio runtime and expose its result as a
/// stream.
///
/// Fails with [`EngineError::NoRuntime`] outside of a runtime.
pub fn from_future<T, E, F>(future: F) -> Result<Stream<T>>
where
    T: Send + Sync + 'static,
    E: Into<StreamError>,
    F: Future<Output = std::result::Result<T, E>> + Send + 'static,
{
    let handle = Handle::try_current().map_err(|e| EngineError::NoRuntime(e.to_string()))?;
    let (emitter, stream) = channel();
    let sink = emitter.downgrade();
    drop(emitter);

    handle.spawn(async move {
        let outcome = future.await.map_err(Into::<StreamError>::into);
        let Some(emitter) = sink.upgrade() else {
            tracing::trace!("future settled after its stream was dropped");
            return;
        };
        match outcome {
            Ok(value) => {
                emitter.next(value);
                emitter.complete();
            }
            Err(error) => emitter.error(error),
        }
    });

    Ok(stream)
}

impl<T> Stream<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// See [`to_future`](crate::bridge::to_future).
    pub fn to_future(
        &self,
        options: ResolveOptions<T>,
    ) -> impl Future<Output = Outcome<T>> + Send + 'static {
        to_future(self, options)
    }
}

impl<T> ReadSignal<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// See [`to_future`](crate::bridge::to_future).
    ///
    /// The signal's current value arrives on its scheduler's next tick, so
    /// that scheduler must be running for the future to settle.
    pub fn to_future(
        &self,
        options: ResolveOptions<T>,
    ) -> impl Future<Output = Outcome<T>> + Send + 'static {
        to_future(self, options)
    }
}

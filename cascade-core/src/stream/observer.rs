//! Observer types.

use std::fmt;
use std::sync::Arc;

use crate::error::StreamError;

/// Receives the signals of a stream.
///
/// Only `next` is required; terminal handlers default to doing nothing.
/// Any `Fn(&T)` closure is an observer.
pub trait Observer<T>: Send + Sync {
    /// A new value.
    fn next(&self, value: &T);

    /// The stream failed. No further signals follow.
    fn error(&self, _error: &StreamError) {}

    /// The stream finished. No further signals follow.
    fn complete(&self) {}
}

impl<T, F> Observer<T> for F
where
    F: Fn(&T) + Send + Sync,
{
    fn next(&self, value: &T) {
        self(value)
    }
}

type NextFn<T> = Box<dyn Fn(&T) + Send + Sync>;
type ErrorFn = Box<dyn Fn(&StreamError) + Send + Sync>;
type CompleteFn = Box<dyn Fn() + Send + Sync>;

/// An observer assembled from separate callbacks.
///
/// ```rust,ignore
/// let observer = ObserverFns::new(|v: &i32| println!("{v}"))
///     .on_error(|e| eprintln!("failed: {e}"))
///     .on_complete(|| println!("done"));
/// ```
pub struct ObserverFns<T> {
    next: NextFn<T>,
    error: Option<ErrorFn>,
    complete: Option<CompleteFn>,
}

impl<T> ObserverFns<T> {
    /// Start from a `next` callback.
    pub fn new<F>(next: F) -> Self
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        Self {
            next: Box::new(next),
            error: None,
            complete: None,
        }
    }

    /// Handle the terminal error signal.
    pub fn on_error<F>(mut self, error: F) -> Self
    where
        F: Fn(&StreamError) + Send + Sync + 'static,
    {
        self.error = Some(Box::new(error));
        self
    }

    /// Handle the terminal completion signal.
    pub fn on_complete<F>(mut self, complete: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.complete = Some(Box::new(complete));
        self
    }
}

impl<T> Observer<T> for ObserverFns<T> {
    fn next(&self, value: &T) {
        (self.next)(value)
    }

    fn error(&self, error: &StreamError) {
        if let Some(handler) = &self.error {
            handler(error);
        }
    }

    fn complete(&self) {
        if let Some(handler) = &self.complete {
            handler();
        }
    }
}

/// A shared observer compared by identity.
///
/// Lets an observer travel through a signal (which compares values before
/// notifying) without requiring the observer itself to be comparable.
pub struct ObserverRef<T>(Arc<dyn Observer<T>>);

impl<T> ObserverRef<T> {
    /// Wrap an observer.
    pub fn new<O>(observer: O) -> Self
    where
        O: Observer<T> + 'static,
    {
        Self(Arc::new(observer))
    }

    /// Wrap an already shared observer.
    pub fn from_arc(observer: Arc<dyn Observer<T>>) -> Self {
        Self(observer)
    }

    /// The wrapped observer.
    pub fn observer(&self) -> &Arc<dyn Observer<T>> {
        &self.0
    }
}

impl<T> Clone for ObserverRef<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T> PartialEq for ObserverRef<T> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(
            Arc::as_ptr(&self.0) as *const (),
            Arc::as_ptr(&other.0) as *const (),
        )
    }
}

impl<T> Eq for ObserverRef<T> {}

impl<T> fmt::Debug for ObserverRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ObserverRef")
            .field(&(Arc::as_ptr(&self.0) as *const ()))
            .finish()
    }
}

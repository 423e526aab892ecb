//! Map operators.

use std::sync::Arc;

use super::{derive, Forward};
use crate::error::StreamError;
use crate::stream::{Emitter, Observable, Stream};

/// Forward `transform(value)` for every value.
pub fn map<T, U, S, F>(source: &S, transform: F) -> Stream<U>
where
    S: Observable<T> + ?Sized,
    T: 'static,
    U: Send + Sync + 'static,
    F: Fn(&T) -> U + Send + Sync + 'static,
{
    derive(source, |sink| {
        Arc::new(Forward::new(sink, move |value: &T, out: &Emitter<U>| {
            out.next(transform(value));
        }))
    })
}

/// Forward `transform(value)`; a failed transform terminates the stream.
///
/// The failure becomes the derived stream's error and the derived stream
/// unsubscribes from `source`. Later source values are never transformed.
pub fn try_map<T, U, E, S, F>(source: &S, transform: F) -> Stream<U>
where
    S: Observable<T> + ?Sized,
    T: 'static,
    U: Send + Sync + 'static,
    E: Into<StreamError>,
    F: Fn(&T) -> Result<U, E> + Send + Sync + 'static,
{
    derive(source, |sink| {
        Arc::new(Forward::new(sink, move |value: &T, out: &Emitter<U>| {
            if out.is_closed() {
                return;
            }
            match transform(value) {
                Ok(mapped) => out.next(mapped),
                Err(error) => {
                    let error: StreamError = error.into();
                    tracing::debug!(%error, "map transform failed");
                    out.error(error);
                }
            }
        }))
    })
}

impl<T> Stream<T>
where
    T: Send + Sync + 'static,
{
    /// See [`map`](crate::combinators::map).
    pub fn map<U, F>(&self, transform: F) -> Stream<U>
    where
        U: Send + Sync + 'static,
        F: Fn(&T) -> U + Send + Sync + 'static,
    {
        map(self, transform)
    }

    /// See [`try_map`](crate::combinators::try_map).
    pub fn try_map<U, E, F>(&self, transform: F) -> Stream<U>
    where
        U: Send + Sync + 'static,
        E: Into<StreamError>,
        F: Fn(&T) -> Result<U, E> + Send + Sync + 'static,
    {
        try_map(self, transform)
    }
}

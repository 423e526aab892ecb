//! Filter operator.

use std::sync::Arc;

use super::{derive, Forward};
use crate::stream::{Emitter, Observable, Stream};

/// Forward only the values for which `predicate` returns true.
pub fn filter<T, S, P>(source: &S, predicate: P) -> Stream<T>
where
    S: Observable<T> + ?Sized,
    T: Clone + Send + Sync + 'static,
    P: Fn(&T) -> bool + Send + Sync + 'static,
{
    derive(source, |sink| {
        Arc::new(Forward::new(sink, move |value: &T, out: &Emitter<T>| {
            if predicate(value) {
                out.next(value.clone());
            }
        }))
    })
}

impl<T> Stream<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// See [`filter`](crate::combinators::filter).
    pub fn filter<P>(&self, predicate: P) -> Stream<T>
    where
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        filter(self, predicate)
    }
}

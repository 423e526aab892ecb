//! Unwrapped Signals
//!
//! An unwrapped signal follows a cell (or stream) that is itself selected by
//! another value. The origin yields `Option<V>`; for `Some(v)` a supplied
//! function derives the nested observable to follow, for `None` the signal
//! falls back to a fixed value.
//!
//! Each time the origin changes, the previous nested subscription is
//! dropped before the new one is made. The unwrapped value only ever comes
//! from the nested subscription's deliveries, so it reflects the nested
//! cell's value at delivery time rather than anything cached at derive
//! time.
//!
//! A nested error fails the unwrapped signal. Nested completion only ends
//! that selection: the signal keeps its last value and stays live for the
//! next one.

use std::sync::Arc;

use parking_lot::Mutex;

use super::signal::{ReadSignal, SignalBuilder, WeakSignal};
use crate::stream::{Observable, ObserverFns, Subscription};

/// Follow the observable selected by `origin`.
///
/// ```rust,ignore
/// let selected: Signal<Option<Signal<String>>> = Signal::new(None);
/// let title = unwrapped(&selected, |doc| doc.clone(), String::new());
/// ```
pub fn unwrapped<S, V, O, U, F>(origin: &S, derive: F, fallback: U) -> ReadSignal<U>
where
    S: Observable<Option<V>>,
    V: Send + Sync + 'static,
    O: Observable<U> + 'static,
    U: Clone + Send + Sync + PartialEq + 'static,
    F: Fn(&V) -> O + Send + Sync + 'static,
{
    let target = SignalBuilder::new(fallback.clone())
        .comparator(|a: &U, b: &U| a == b)
        .placeholder()
        .build();
    let sink = target.downgrade();
    let nested: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

    let subscription = origin.subscribe(move |selection: &Option<V>| {
        let Some(target) = sink.upgrade() else {
            return;
        };

        let previous = nested.lock().take();
        if let Some(previous) = previous {
            previous.unsubscribe();
        }

        match selection {
            None => target.set(fallback.clone()),
            Some(value) => {
                let source = derive(value);
                let subscription = source.subscribe(forward_to(sink.clone()));
                *nested.lock() = Some(subscription);
            }
        }
    });
    target.retain_upstream(subscription);

    target.as_readonly()
}

fn forward_to<U>(sink: WeakSignal<U>) -> ObserverFns<U>
where
    U: Clone + Send + Sync + 'static,
{
    let on_error = sink.clone();
    ObserverFns::new(move |value: &U| {
        if let Some(target) = sink.upgrade() {
            target.set(value.clone());
        }
    })
    .on_error(move |error| {
        if let Some(target) = on_error.upgrade() {
            target.fail(error.clone());
        }
    })
}

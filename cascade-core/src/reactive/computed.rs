//! Computed Implementation
//!
//! A computed signal combines several source signals through a pure
//! function.
//!
//! # How Computed Signals Work
//!
//! 1. On creation the function runs once, synchronously, to produce the
//!    initial value.
//!
//! 2. One shared listener watches every source.
//!
//! 3. When any source announces a change, the listener marks a recompute
//!    as pending and schedules it, unless one is already pending.
//!
//! 4. The recompute reads every source's *current* value (never the values
//!    carried by the notifications) and `set`s the result, which then takes
//!    its own tick to reach subscribers.
//!
//! Several sources changing in one turn therefore cost one recompute, and
//! the result is never built from a mix of old and new inputs. The price is
//! latency: counting from the tick in which a source notifies, the computed
//! value changes one tick later and its subscribers hear of it one tick
//! after that.
//!
//! # Sources
//!
//! Sources are anything implementing [`Dependencies`]: tuples of up to six
//! signals (of mixed types) or a `Vec` of signals of one type.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::signal::{ReadSignal, Signal, WeakSignal};
use crate::error::StreamError;
use crate::stream::{Observer, Subscription};

/// Callback shared by all of a computed signal's source watchers.
pub type ChangeFn = Arc<dyn Fn() + Send + Sync>;

/// A single source of a computed signal.
pub trait Dependency: Send + Sync + 'static {
    /// The source's value type.
    type Value: Clone + Send + Sync + 'static;

    /// The source's current value.
    fn current(&self) -> Self::Value;

    /// Invoke `on_change` whenever the source announces a change.
    fn watch_changes(&self, on_change: &ChangeFn) -> Subscription;
}

impl<T> Dependency for ReadSignal<T>
where
    T: Clone + Send + Sync + 'static,
{
    type Value = T;

    fn current(&self) -> T {
        self.get()
    }

    fn watch_changes(&self, on_change: &ChangeFn) -> Subscription {
        let on_change = Arc::clone(on_change);
        let listener: Arc<dyn Observer<T>> = Arc::new(move |_: &T| on_change());
        self.watch(listener)
    }
}

impl<T> Dependency for Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    type Value = T;

    fn current(&self) -> T {
        self.get()
    }

    fn watch_changes(&self, on_change: &ChangeFn) -> Subscription {
        self.as_readonly().watch_changes(on_change)
    }
}

/// The full set of sources of a computed signal.
pub trait Dependencies: Send + Sync + 'static {
    /// Current values of every source, in source order.
    type Values;

    /// Read every source now.
    fn values(&self) -> Self::Values;

    /// Watch every source with one shared callback.
    fn watch_all(&self, on_change: &ChangeFn) -> Vec<Subscription>;
}

macro_rules! impl_dependencies {
    ($($name:ident . $idx:tt),+) => {
        impl<$($name: Dependency),+> Dependencies for ($($name,)+) {
            type Values = ($(<$name as Dependency>::Value,)+);

            fn values(&self) -> Self::Values {
                ($(self.$idx.current(),)+)
            }

            fn watch_all(&self, on_change: &ChangeFn) -> Vec<Subscription> {
                vec![$(self.$idx.watch_changes(on_change)),+]
            }
        }
    };
}

impl_dependencies!(A.0);
impl_dependencies!(A.0, B.1);
impl_dependencies!(A.0, B.1, C.2);
impl_dependencies!(A.0, B.1, C.2, D.3);
impl_dependencies!(A.0, B.1, C.2, D.3, E.4);
impl_dependencies!(A.0, B.1, C.2, D.3, E.4, F.5);

impl<D: Dependency> Dependencies for Vec<D> {
    type Values = Vec<D::Value>;

    fn values(&self) -> Self::Values {
        self.iter().map(Dependency::current).collect()
    }

    fn watch_all(&self, on_change: &ChangeFn) -> Vec<Subscription> {
        self.iter().map(|dep| dep.watch_changes(on_change)).collect()
    }
}

type ComputeFn<V, T> = Box<dyn Fn(V) -> Result<T, StreamError> + Send + Sync>;

/// Shared between the source listener and the scheduled recompute.
struct ComputedState<D: Dependencies, T> {
    deps: D,
    compute: ComputeFn<D::Values, T>,
    pending: AtomicBool,
    target: WeakSignal<T>,
}

impl<D, T> ComputedState<D, T>
where
    D: Dependencies,
    T: Clone + Send + Sync + 'static,
{
    fn on_change(self: &Arc<Self>) {
        if self.pending.swap(true, Ordering::SeqCst) {
            return;
        }
        let Some(target) = self.target.upgrade() else {
            return;
        };

        let state = Arc::clone(self);
        target.scheduler().schedule(Box::new(move || state.recompute()));
    }

    fn recompute(&self) {
        self.pending.store(false, Ordering::SeqCst);
        let Some(target) = self.target.upgrade() else {
            return;
        };
        if target.is_terminated() {
            return;
        }

        match (self.compute)(self.deps.values()) {
            Ok(value) => target.set(value),
            Err(error) => target.fail(error),
        }
    }
}

/// Create a signal computed from `deps`.
///
/// ```rust,ignore
/// let a = Signal::new(1);
/// let b = Signal::new(2);
/// let sum = computed((a.clone(), b.clone()), |(a, b)| a + b);
/// assert_eq!(sum.get(), 3);
/// ```
pub fn computed<D, T, F>(deps: D, compute: F) -> ReadSignal<T>
where
    D: Dependencies,
    T: Clone + Send + Sync + PartialEq + 'static,
    F: Fn(D::Values) -> T + Send + Sync + 'static,
{
    let initial = compute(deps.values());
    build(
        deps,
        initial,
        Box::new(move |values| Ok::<T, StreamError>(compute(values))),
    )
}

/// Create a signal computed by a fallible function.
///
/// Fails immediately if the initial computation fails. A later failure
/// terminates the computed signal with that error.
pub fn try_computed<D, T, E, F>(deps: D, compute: F) -> Result<ReadSignal<T>, StreamError>
where
    D: Dependencies,
    T: Clone + Send + Sync + PartialEq + 'static,
    E: Into<StreamError>,
    F: Fn(D::Values) -> Result<T, E> + Send + Sync + 'static,
{
    let initial = compute(deps.values()).map_err(Into::<StreamError>::into)?;
    Ok(build(
        deps,
        initial,
        Box::new(move |values| compute(values).map_err(Into::<StreamError>::into)),
    ))
}

fn build<D, T>(deps: D, initial: T, compute: ComputeFn<D::Values, T>) -> ReadSignal<T>
where
    D: Dependencies,
    T: Clone + Send + Sync + PartialEq + 'static,
{
    let target = Signal::new(initial);
    let state = Arc::new(ComputedState {
        deps,
        compute,
        pending: AtomicBool::new(false),
        target: target.downgrade(),
    });

    let listener_state = Arc::clone(&state);
    let on_change: ChangeFn = Arc::new(move || listener_state.on_change());
    for subscription in state.deps.watch_all(&on_change) {
        target.retain_upstream(subscription);
    }

    target.as_readonly()
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::EventLoop;
    use crate::stream::{Observable, ObserverFns};
    use parking_lot::Mutex;
    use std::sync::atomic::AtomicI32;

    #[test]
    fn initial_value_is_computed_synchronously() {
        let lp = EventLoop::new();
        let _ctx = lp.enter();

        let a = Signal::new(1);
        let b = Signal::new(2);
        let sum = computed((a.clone(), b.clone()), |(a, b)| a + b);

        assert_eq!(sum.get(), 3);
    }

    #[test]
    fn same_turn_changes_coalesce_into_one_recompute() {
        let lp = EventLoop::new();
        let _ctx = lp.enter();

        let runs = Arc::new(AtomicI32::new(0));
        let counter = runs.clone();
        let a = Signal::new(1);
        let b = Signal::new(2);
        let sum = computed((a.clone(), b.clone()), move |(a, b)| {
            counter.fetch_add(1, Ordering::SeqCst);
            a + b
        });
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        a.set(3);
        b.set(4);

        lp.tick();
        assert_eq!(sum.get(), 3);
        lp.tick();
        assert_eq!(sum.get(), 7);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn subscribers_see_change_one_tick_after_recompute() {
        let lp = EventLoop::new();
        let _ctx = lp.enter();

        let a = Signal::new(1);
        let doubled = computed((a.clone(),), |(a,)| a * 2);
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = log.clone();
        let _sub = doubled.subscribe(move |v: &i32| sink.lock().push(*v));
        lp.run_until_idle().unwrap();
        assert_eq!(*log.lock(), vec![2]);

        a.set(5);
        lp.tick();
        assert_eq!(*log.lock(), vec![2]);
        lp.tick();
        assert_eq!(*log.lock(), vec![2]);
        lp.tick();
        assert_eq!(*log.lock(), vec![2, 10]);
    }

    #[test]
    fn unchanged_result_is_not_announced() {
        let lp = EventLoop::new();
        let _ctx = lp.enter();

        let a = Signal::new(4);
        let parity = computed((a.clone(),), |(a,)| a % 2);
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = log.clone();
        let _sub = parity.subscribe(move |v: &i32| sink.lock().push(*v));
        lp.run_until_idle().unwrap();

        a.set(6);
        lp.run_until_idle().unwrap();
        assert_eq!(*log.lock(), vec![0]);
    }

    #[test]
    fn vec_of_sources() {
        let lp = EventLoop::new();
        let _ctx = lp.enter();

        let sources: Vec<Signal<i32>> = (1..=4).map(Signal::new).collect();
        let total = computed(sources.clone(), |values| values.iter().sum::<i32>());
        assert_eq!(total.get(), 10);

        sources[0].set(10);
        sources[3].set(40);
        lp.run_until_idle().unwrap();
        assert_eq!(total.get(), 55);
    }

    #[test]
    fn mixed_source_types() {
        let lp = EventLoop::new();
        let _ctx = lp.enter();

        let name = Signal::new("x".to_string());
        let count = Signal::new(2usize);
        let label = computed((name.clone(), count.as_readonly()), |(name, count)| {
            name.repeat(count)
        });
        assert_eq!(label.get(), "xx");

        count.set(3);
        lp.run_until_idle().unwrap();
        assert_eq!(label.get(), "xxx");
    }

    #[test]
    fn computed_keeps_sources_alive() {
        let lp = EventLoop::new();
        let _ctx = lp.enter();

        let a = Signal::new(1);
        let weak = a.downgrade();
        let plus_one = computed((a,), |(a,)| a + 1);

        assert!(weak.upgrade().is_some());
        drop(plus_one);
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn failing_recompute_terminates() {
        let lp = EventLoop::new();
        let _ctx = lp.enter();

        let divisor = Signal::new(2);
        let quotient = try_computed((divisor.clone(),), |(d,)| {
            if d == 0 {
                Err("division by zero")
            } else {
                Ok(100 / d)
            }
        })
        .unwrap();
        assert_eq!(quotient.get(), 50);

        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = errors.clone();
        let _sub = quotient
            .subscribe(ObserverFns::new(|_: &i32| {}).on_error(move |e| sink.lock().push(e.to_string())));

        divisor.set(0);
        lp.run_until_idle().unwrap();

        assert!(quotient.is_terminated());
        assert_eq!(*errors.lock(), vec!["division by zero"]);
        assert_eq!(divisor.subscriber_count(), 0);
    }

    #[test]
    fn failing_initial_computation_is_an_error() {
        let lp = EventLoop::new();
        let _ctx = lp.enter();

        let a = Signal::new(0);
        let result = try_computed((a,), |(a,)| if a == 0 { Err("zero") } else { Ok(a) });
        assert!(result.is_err());
    }
}

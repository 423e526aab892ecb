//! Mapped Signals
//!
//! A mapped signal applies a transform to every value of one source. The
//! transform runs synchronously when the source announces a value; its
//! result is compared with the mapped signal's current value and only a
//! different result is `set`.

use std::sync::Arc;

use super::signal::{ReadSignal, Signal, WeakSignal};
use crate::error::StreamError;
use crate::stream::Observer;

impl<T> ReadSignal<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// A signal holding `transform` applied to this signal's value.
    ///
    /// ```rust,ignore
    /// let celsius = Signal::new(100.0);
    /// let fahrenheit = celsius.map(|c| c * 9.0 / 5.0 + 32.0);
    /// ```
    pub fn map<U, F>(&self, transform: F) -> ReadSignal<U>
    where
        U: Clone + Send + Sync + PartialEq + 'static,
        F: Fn(&T) -> U + Send + Sync + 'static,
    {
        let target = Signal::new(self.with(&transform));
        let sink = target.downgrade();

        let listener: Arc<dyn Observer<T>> = Arc::new(move |value: &T| {
            if let Some(target) = sink.upgrade() {
                propagate(&target, transform(value));
            }
        });
        target.retain_upstream(self.watch(listener));

        target.as_readonly()
    }

    /// A signal holding a fallible transform of this signal's value.
    ///
    /// Fails immediately if the transform fails on the current value. A
    /// later failure terminates the mapped signal with that error and
    /// unsubscribes it from this one.
    pub fn try_map<U, E, F>(&self, transform: F) -> Result<ReadSignal<U>, StreamError>
    where
        U: Clone + Send + Sync + PartialEq + 'static,
        E: Into<StreamError>,
        F: Fn(&T) -> Result<U, E> + Send + Sync + 'static,
    {
        let initial = self.with(&transform).map_err(Into::<StreamError>::into)?;
        let target = Signal::new(initial);
        let sink: WeakSignal<U> = target.downgrade();

        let listener: Arc<dyn Observer<T>> = Arc::new(move |value: &T| {
            let Some(target) = sink.upgrade() else {
                return;
            };
            if target.is_terminated() {
                return;
            }
            match transform(value) {
                Ok(next) => propagate(&target, next),
                Err(error) => target.fail(error),
            }
        });
        target.retain_upstream(self.watch(listener));

        Ok(target.as_readonly())
    }
}

/// Set `next` unless the target already holds an equal value.
fn propagate<U>(target: &Signal<U>, next: U)
where
    U: Clone + Send + Sync + PartialEq + 'static,
{
    if target.with(|current| *current != next) {
        target.set(next);
    }
}

#[cfg(test)]
mod tests {
    use crate::error::StreamError;
    use crate::reactive::Signal;
    use crate::scheduler::EventLoop;
    use crate::stream::{Observable, ObserverFns};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn maps_initial_value_synchronously() {
        let lp = EventLoop::new();
        let _ctx = lp.enter();

        let source = Signal::new(21);
        let doubled = source.map(|v| v * 2);
        assert_eq!(doubled.get(), 42);
    }

    #[test]
    fn follows_source_changes() {
        let lp = EventLoop::new();
        let _ctx = lp.enter();

        let source = Signal::new(1);
        let label = source.map(|v| format!("#{v}"));
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = log.clone();
        let _sub = label.subscribe(move |v: &String| sink.lock().push(v.clone()));

        source.set(2);
        lp.tick();
        assert_eq!(label.get(), "#2");
        lp.run_until_idle().unwrap();

        assert_eq!(*log.lock(), vec!["#1", "#2"]);
    }

    #[test]
    fn unchanged_output_is_not_set() {
        let lp = EventLoop::new();
        let _ctx = lp.enter();

        let source = Signal::new(3);
        let is_odd = source.map(|v| v % 2 == 1);
        let notified = Arc::new(AtomicUsize::new(0));
        let counter = notified.clone();
        let _sub = is_odd.subscribe(move |_: &bool| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        lp.run_until_idle().unwrap();

        source.set(5);
        lp.tick();
        assert_eq!(lp.pending_tasks(), 0);
        assert_eq!(notified.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn transform_failure_becomes_stream_error() {
        let lp = EventLoop::new();
        let _ctx = lp.enter();

        let source = Signal::new("1".to_string());
        let parsed = source
            .try_map(|s| s.parse::<i32>().map_err(StreamError::new))
            .unwrap();
        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = errors.clone();
        let _sub = parsed.subscribe(
            ObserverFns::new(|_: &i32| {}).on_error(move |e| sink.lock().push(e.to_string())),
        );
        lp.run_until_idle().unwrap();

        source.set("nope".into());
        lp.run_until_idle().unwrap();

        assert!(parsed.is_terminated());
        assert_eq!(errors.lock().len(), 1);
        assert_eq!(parsed.get(), 1);

        // Failed closed: the source no longer feeds the mapped signal.
        assert_eq!(source.subscriber_count(), 0);
        source.set("7".into());
        lp.run_until_idle().unwrap();
        assert_eq!(parsed.get(), 1);
    }

    #[test]
    fn try_map_rejects_bad_initial_value() {
        let lp = EventLoop::new();
        let _ctx = lp.enter();

        let source = Signal::new("x".to_string());
        assert!(source
            .try_map(|s| s.parse::<u8>().map_err(StreamError::new))
            .is_err());
    }
}

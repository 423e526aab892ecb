//! Buffer operator.
//!
//! Collects values and emits them together once the source has been quiet
//! for a full window. Every new value pushes the deadline back, so a steady
//! burst is delivered as one batch after the burst ends, while values spaced
//! further apart than the window each arrive in their own batch.
//!
//! Timers come from the scheduler current when the buffer is created. A
//! batch is never empty. On `complete` or `error` any pending batch is
//! flushed first, then the terminal signal is forwarded.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;

use super::derive;
use crate::error::{EngineError, Result, StreamError};
use crate::scheduler::{current_scheduler, SchedulerHandle, TimerId};
use crate::stream::{Emitter, Observable, Observer, Stream, WeakEmitter};

/// Group values into batches separated by `window` of inactivity.
///
/// A zero window is rejected.
pub fn buffer<T, S>(source: &S, window: Duration) -> Result<Stream<Vec<T>>>
where
    S: Observable<T> + ?Sized,
    T: Clone + Send + Sync + 'static,
{
    if window.is_zero() {
        return Err(EngineError::InvalidArgument(
            "buffer window must be greater than zero".into(),
        ));
    }

    let scheduler = current_scheduler();
    Ok(derive(source, move |sink| {
        Arc::new(BufferObserver {
            shared: Arc::new(Shared {
                sink,
                window,
                scheduler,
                state: Mutex::new(Pending {
                    items: Vec::new(),
                    timer: None,
                    epoch: 0,
                }),
            }),
        })
    }))
}

struct BufferObserver<T> {
    shared: Arc<Shared<T>>,
}

struct Shared<T> {
    sink: WeakEmitter<Vec<T>>,
    window: Duration,
    scheduler: SchedulerHandle,
    state: Mutex<Pending<T>>,
}

struct Pending<T> {
    items: Vec<T>,
    timer: Option<TimerId>,

    /// Bumped on every value; a timer only flushes if it saw the latest one.
    epoch: u64,
}

impl<T> Shared<T>
where
    T: Send + Sync + 'static,
{
    /// Take the pending batch and cancel its timer.
    fn take(&self) -> Vec<T> {
        let (items, timer) = {
            let mut state = self.state.lock();
            (std::mem::take(&mut state.items), state.timer.take())
        };
        if let Some(timer) = timer {
            self.scheduler.cancel(timer);
        }
        items
    }

    fn flush(&self, emitter: &Emitter<Vec<T>>) {
        let items = self.take();
        if !items.is_empty() {
            tracing::trace!(items = items.len(), "buffer flush");
            emitter.next(items);
        }
    }

    fn on_timer(shared: Weak<Self>, epoch: u64) {
        let Some(shared) = shared.upgrade() else {
            return;
        };
        let items = {
            let mut state = shared.state.lock();
            if state.epoch != epoch {
                return;
            }
            state.timer = None;
            std::mem::take(&mut state.items)
        };
        if items.is_empty() {
            return;
        }
        if let Some(emitter) = shared.sink.upgrade() {
            tracing::trace!(items = items.len(), "buffer window elapsed");
            emitter.next(items);
        }
    }
}

impl<T> Observer<T> for BufferObserver<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn next(&self, value: &T) {
        let shared = &self.shared;
        let (previous, epoch) = {
            let mut state = shared.state.lock();
            state.items.push(value.clone());
            state.epoch += 1;
            (state.timer.take(), state.epoch)
        };
        if let Some(previous) = previous {
            shared.scheduler.cancel(previous);
        }

        let target = Arc::downgrade(shared);
        let timer = shared.scheduler.schedule_after(
            shared.window,
            Box::new(move || Shared::on_timer(target, epoch)),
        );

        let mut state = shared.state.lock();
        if state.epoch == epoch {
            state.timer = Some(timer);
        } else {
            drop(state);
            shared.scheduler.cancel(timer);
        }
    }

    fn error(&self, error: &StreamError) {
        if let Some(emitter) = self.shared.sink.upgrade() {
            self.shared.flush(&emitter);
            emitter.error(error.clone());
        }
    }

    fn complete(&self) {
        if let Some(emitter) = self.shared.sink.upgrade() {
            self.shared.flush(&emitter);
            emitter.complete();
        }
    }
}

impl<T> Stream<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// See [`buffer`](crate::combinators::buffer).
    pub fn buffer(&self, window: Duration) -> Result<Stream<Vec<T>>> {
        buffer(self, window)
    }
}

//! Tokio-backed Scheduler
//!
//! Immediate tasks go through an unbounded channel drained by one pump
//! task, which preserves scheduling order. Each timer is its own sleeping
//! task; when it wakes it feeds the timer's work into the same channel.

use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;

use dashmap::DashMap;
use tokio::runtime::{self, Handle};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

use super::{Scheduler, SchedulerGuard, Task, TimerId};
use crate::error::{EngineError, Result};

/// Default schedulers, one per live runtime.
static RUNTIME_DEFAULTS: OnceLock<DashMap<runtime::Id, TokioScheduler>> = OnceLock::new();

/// Scheduler running tasks on a tokio runtime.
#[derive(Clone)]
pub struct TokioScheduler {
    shared: Arc<Shared>,
}

struct Shared {
    queue: mpsc::UnboundedSender<Task>,
    timers: DashMap<TimerId, AbortHandle>,
    handle: Handle,
}

impl TokioScheduler {
    /// Create a scheduler on the runtime of the calling context.
    pub fn new() -> Result<Self> {
        let handle = Handle::try_current().map_err(|e| EngineError::NoRuntime(e.to_string()))?;
        Ok(Self::with_handle(handle))
    }

    /// Create a scheduler on an explicit runtime.
    pub fn with_handle(handle: Handle) -> Self {
        let (queue, mut tasks) = mpsc::unbounded_channel::<Task>();

        handle.spawn(async move {
            while let Some(task) = tasks.recv().await {
                task();
            }
            tracing::debug!("tokio scheduler pump stopped");
        });

        Self {
            shared: Arc::new(Shared {
                queue,
                timers: DashMap::new(),
                handle,
            }),
        }
    }

    /// Make this scheduler current on this thread.
    pub fn enter(&self) -> SchedulerGuard {
        super::enter(Arc::new(self.clone()))
    }

    /// Number of timers that have neither fired nor been cancelled.
    pub fn pending_timers(&self) -> usize {
        self.shared.timers.len()
    }

    /// The shared scheduler of the runtime the caller is running on.
    ///
    /// Returns `None` outside a runtime. Schedulers whose runtime has shut
    /// down are evicted on the way.
    pub fn for_current_runtime() -> Option<Self> {
        let handle = Handle::try_current().ok()?;
        let defaults = RUNTIME_DEFAULTS.get_or_init(DashMap::new);
        defaults.retain(|_, scheduler| scheduler.is_running());

        let scheduler = defaults
            .entry(handle.id())
            .or_insert_with(|| {
                tracing::debug!(runtime = %handle.id(), "creating default tokio scheduler");
                Self::with_handle(handle.clone())
            })
            .clone();
        Some(scheduler)
    }

    /// Whether the pump task is still alive.
    pub fn is_running(&self) -> bool {
        !self.shared.queue.is_closed()
    }

    /// Whether both handles drive the same queue.
    pub fn same_scheduler(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, task: Task) {
        if self.shared.queue.send(task).is_err() {
            tracing::warn!("tokio scheduler pump is gone; task dropped");
        }
    }

    fn schedule_after(&self, delay: Duration, task: Task) -> TimerId {
        let id = TimerId::new();
        let queue = self.shared.queue.clone();
        let shared: Weak<Shared> = Arc::downgrade(&self.shared);

        let timer = self.shared.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(shared) = shared.upgrade() {
                shared.timers.remove(&id);
            }
            // A failed send means the pump is gone, which only happens at
            // runtime shutdown.
            let _ = queue.send(task);
        });

        self.shared.timers.insert(id, timer.abort_handle());
        if timer.is_finished() {
            self.shared.timers.remove(&id);
        }
        id
    }

    fn cancel(&self, timer: TimerId) {
        if let Some((_, handle)) = self.shared.timers.remove(&timer) {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use parking_lot::Mutex;

    #[test]
    fn requires_a_runtime() {
        assert!(matches!(TokioScheduler::new(), Err(EngineError::NoRuntime(_))));
    }

    #[tokio::test]
    async fn runs_tasks_in_order() {
        let scheduler = TokioScheduler::new().unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));
        let (done_tx, done_rx) = tokio::sync::oneshot::channel();

        for i in 0..3 {
            let log = log.clone();
            scheduler.schedule(Box::new(move || log.lock().push(i)));
        }
        scheduler.schedule(Box::new(move || {
            let _ = done_tx.send(());
        }));

        done_rx.await.unwrap();
        assert_eq!(*log.lock(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn one_default_per_runtime() {
        let first = TokioScheduler::for_current_runtime().unwrap();
        let second = TokioScheduler::for_current_runtime().unwrap();
        assert!(first.same_scheduler(&second));
        assert!(first.is_running());
    }

    #[test]
    fn no_default_outside_a_runtime() {
        assert!(TokioScheduler::for_current_runtime().is_none());
    }

    #[test]
    fn defaults_do_not_outlive_their_runtime() {
        let build = || {
            tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap()
        };

        let first_rt = build();
        let first = first_rt.block_on(async { TokioScheduler::for_current_runtime().unwrap() });
        drop(first_rt);
        assert!(!first.is_running());

        let second_rt = build();
        let second = second_rt.block_on(async { TokioScheduler::for_current_runtime().unwrap() });
        assert!(second.is_running());
        assert!(!first.same_scheduler(&second));
    }

    #[tokio::test(start_paused = true)]
    async fn timers_fire_and_cancel() {
        let scheduler = TokioScheduler::new().unwrap();
        let fired = Arc::new(AtomicUsize::new(0));

        let counter = fired.clone();
        scheduler.schedule_after(
            Duration::from_millis(10),
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        let counter = fired.clone();
        let cancelled = scheduler.schedule_after(
            Duration::from_millis(10),
            Box::new(move || {
                counter.fetch_add(100, Ordering::SeqCst);
            }),
        );
        scheduler.cancel(cancelled);

        tokio::time::sleep(Duration::from_millis(50)).await;
        tokio::task::yield_now().await;

        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.pending_timers(), 0);
    }
}

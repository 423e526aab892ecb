//! Cooperative Scheduling
//!
//! Nothing in the engine notifies a subscriber inside the caller's own call
//! stack. Instead, work is handed to a [`Scheduler`], which offers two
//! distinct queues:
//!
//! - the *immediate* queue (`schedule`): runs after the current synchronous
//!   turn unwinds, before any timer. Signal notification and derived-cell
//!   recomputation use it exclusively.
//! - the *timer* queue (`schedule_after`): runs once a delay has elapsed.
//!   Only the buffer combinator uses it.
//!
//! # Implementations
//!
//! - [`EventLoop`] is deterministic and driven by hand: `tick`,
//!   `run_until_idle`, and `advance` over a virtual clock. Tests and
//!   embedders that own their main loop use it.
//! - [`TokioScheduler`] runs tasks on a tokio runtime, keeping the
//!   immediate queue FIFO through a single pump task.
//!
//! # Context
//!
//! Cells and combinators pick up the scheduler that is current on the
//! calling thread when they are built. `scheduler.enter()` pushes a
//! scheduler for the lifetime of the returned guard; without one, each
//! thread falls back to its own default [`EventLoop`].

mod context;
mod event_loop;
mod host;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub use context::{current_scheduler, enter, local_event_loop, SchedulerGuard};
pub use event_loop::EventLoop;
pub use host::TokioScheduler;

/// A unit of deferred work.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Shared handle to a scheduler.
pub type SchedulerHandle = Arc<dyn Scheduler>;

/// Identifies a pending timer so it can be cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerId(u64);

impl TimerId {
    /// Generate a new unique timer ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for TimerId {
    fn default() -> Self {
        Self::new()
    }
}

/// Deferred execution of tasks.
pub trait Scheduler: Send + Sync {
    /// Queue `task` for the next tick. Tasks run in the order scheduled.
    fn schedule(&self, task: Task);

    /// Queue `task` to run once `delay` has elapsed.
    fn schedule_after(&self, delay: Duration, task: Task) -> TimerId;

    /// Cancel a pending timer. Unknown or already-fired timers are ignored.
    fn cancel(&self, timer: TimerId);
}

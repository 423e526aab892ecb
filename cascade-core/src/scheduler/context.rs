//! Scheduler Context
//!
//! A thread-local stack records which scheduler is current. Entering pushes
//! onto the stack and the returned guard pops on drop, so nested contexts
//! unwind correctly even if the body panics.
//!
//! With nothing entered, code running on a tokio runtime gets that
//! runtime's shared [`TokioScheduler`]. Anywhere else it gets a per-thread
//! [`EventLoop`] that the caller drives.

use std::cell::RefCell;
use std::marker::PhantomData;
use std::sync::Arc;

use super::{EventLoop, SchedulerHandle, TokioScheduler};

thread_local! {
    static SCHEDULER_STACK: RefCell<Vec<SchedulerHandle>> = const { RefCell::new(Vec::new()) };

    static LOCAL_LOOP: EventLoop = EventLoop::new();
}

/// Guard that pops the scheduler context when dropped.
///
/// Not `Send`: the context belongs to the thread that entered it.
pub struct SchedulerGuard {
    depth: usize,
    _thread_bound: PhantomData<*const ()>,
}

/// Make `scheduler` current on this thread until the guard drops.
pub fn enter(scheduler: SchedulerHandle) -> SchedulerGuard {
    let depth = SCHEDULER_STACK.with(|stack| {
        let mut stack = stack.borrow_mut();
        stack.push(scheduler);
        stack.len()
    });

    SchedulerGuard {
        depth,
        _thread_bound: PhantomData,
    }
}

/// The innermost entered scheduler.
///
/// Falls back to the current runtime's default scheduler, then to this
/// thread's event loop.
pub fn current_scheduler() -> SchedulerHandle {
    if let Some(entered) = SCHEDULER_STACK.with(|stack| stack.borrow().last().cloned()) {
        return entered;
    }
    match TokioScheduler::for_current_runtime() {
        Some(scheduler) => Arc::new(scheduler),
        None => Arc::new(local_event_loop()),
    }
}

/// This thread's default event loop, used when no scheduler is entered.
pub fn local_event_loop() -> EventLoop {
    LOCAL_LOOP.with(EventLoop::clone)
}

impl Drop for SchedulerGuard {
    fn drop(&mut self) {
        SCHEDULER_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            debug_assert_eq!(
                stack.len(),
                self.depth,
                "scheduler guards dropped out of order"
            );
            stack.pop();
        });
    }
}

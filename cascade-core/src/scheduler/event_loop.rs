//! Event Loop
//!
//! A deterministic scheduler driven by its owner.
//!
//! # Ticks
//!
//! A tick runs exactly the tasks that were queued when it started. Anything
//! those tasks schedule waits for the following tick, which is what gives
//! "deferred by one tick" a precise meaning:
//!
//! ```text
//! signal.set(1)      -> notification queued
//! tick()             -> subscribers see 1
//! ```
//!
//! # Time
//!
//! Timers live on a virtual clock that only moves in `advance`. Before each
//! timer fires, the immediate queue is drained, so immediate work always
//! wins over timers that are due at the same moment.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::{enter, Scheduler, SchedulerGuard, Task, TimerId};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};

/// Manually driven scheduler with a virtual clock.
///
/// Cloning yields another handle to the same loop.
#[derive(Clone)]
pub struct EventLoop {
    shared: Arc<Shared>,
}

struct Shared {
    config: EngineConfig,
    state: Mutex<LoopState>,
}

#[derive(Default)]
struct LoopState {
    /// Tasks for the next tick, in scheduling order.
    ready: VecDeque<Task>,

    /// Pending timers ordered by deadline, then by creation.
    timers: BTreeMap<(Duration, TimerId), Task>,

    /// Deadline of each pending timer, for cancellation.
    deadlines: HashMap<TimerId, Duration>,

    /// Virtual time since the loop was created.
    now: Duration,
}

impl EventLoop {
    /// Create an event loop with the default configuration.
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    /// Create an event loop with the given configuration.
    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                state: Mutex::new(LoopState::default()),
            }),
        }
    }

    /// Make this loop the current scheduler on this thread.
    pub fn enter(&self) -> SchedulerGuard {
        enter(Arc::new(self.clone()))
    }

    /// Run one tick. Returns the number of tasks executed.
    pub fn tick(&self) -> usize {
        let batch = std::mem::take(&mut self.shared.state.lock().ready);
        let count = batch.len();
        if count > 0 {
            tracing::trace!(tasks = count, "event loop tick");
        }

        for task in batch {
            task();
        }

        count
    }

    /// Tick until the immediate queue is empty. Returns the ticks run.
    ///
    /// Fails if the queue is still busy after `max_ticks` ticks.
    pub fn run_until_idle(&self) -> Result<usize> {
        let limit = self.shared.config.max_ticks;
        let mut ticks = 0;

        while self.pending_tasks() > 0 {
            if ticks == limit {
                tracing::warn!(limit, "event loop did not go idle");
                return Err(EngineError::TickLimitExceeded { limit });
            }
            self.tick();
            ticks += 1;
        }

        Ok(ticks)
    }

    /// Move the virtual clock forward by `duration`, firing due timers.
    ///
    /// The immediate queue is drained before the first timer and after
    /// every timer.
    pub fn advance(&self, duration: Duration) -> Result<()> {
        let target = self.now() + duration;
        self.run_until_idle()?;

        loop {
            let due = {
                let mut state = self.shared.state.lock();
                let key = match state.timers.first_key_value() {
                    Some((&(deadline, id), _)) if deadline <= target => (deadline, id),
                    _ => break,
                };
                state.deadlines.remove(&key.1);
                state.now = key.0;
                state.timers.remove(&key)
            };

            if let Some(task) = due {
                task();
            }
            self.run_until_idle()?;
        }

        let mut state = self.shared.state.lock();
        if state.now < target {
            state.now = target;
        }
        Ok(())
    }

    /// Run the loop in real time until no work remains.
    ///
    /// Sleeps on the tokio clock between timers.
    pub async fn drive(&self) -> Result<()> {
        loop {
            self.run_until_idle()?;
            match self.time_to_next_timer() {
                Some(wait) => {
                    tokio::time::sleep(wait).await;
                    self.advance(wait)?;
                }
                None => return Ok(()),
            }
        }
    }

    /// Current virtual time.
    pub fn now(&self) -> Duration {
        self.shared.state.lock().now
    }

    /// Number of tasks waiting for the next tick.
    pub fn pending_tasks(&self) -> usize {
        self.shared.state.lock().ready.len()
    }

    /// Number of timers not yet fired or cancelled.
    pub fn pending_timers(&self) -> usize {
        self.shared.state.lock().timers.len()
    }

    /// Virtual time remaining until the earliest pending timer.
    pub fn time_to_next_timer(&self) -> Option<Duration> {
        let state = self.shared.state.lock();
        state
            .timers
            .keys()
            .next()
            .map(|(deadline, _)| deadline.saturating_sub(state.now))
    }
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for EventLoop {
    fn schedule(&self, task: Task) {
        self.shared.state.lock().ready.push_back(task);
    }

    fn schedule_after(&self, delay: Duration, task: Task) -> TimerId {
        let id = TimerId::new();
        let mut state = self.shared.state.lock();
        let deadline = state.now + delay;
        state.timers.insert((deadline, id), task);
        state.deadlines.insert(id, deadline);
        tracing::trace!(?id, ?deadline, "timer scheduled");
        id
    }

    fn cancel(&self, timer: TimerId) {
        let mut state = self.shared.state.lock();
        if let Some(deadline) = state.deadlines.remove(&timer) {
            state.timers.remove(&(deadline, timer));
        }
    }
}

impl std::fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("EventLoop")
            .field("now", &state.now)
            .field("pending_tasks", &state.ready.len())
            .field("pending_timers", &state.timers.len())
            .finish()
    }
}

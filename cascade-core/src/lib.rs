//! Cascade Core
//!
//! A reactive value-propagation engine. It provides:
//!
//! - Broadcast streams with weakly held subscribers
//! - Reactive cells (signals) with deferred, comparator-gated notification
//! - Derived cells: computed, mapped and unwrapped
//! - Stream combinators: filter, map, buffer, merge
//! - A bridge between streams and futures
//! - A kind-tagged async middleware chain
//!
//! # Architecture
//!
//! - `scheduler`: the immediate and timer queues every notification goes
//!   through, with a deterministic event loop and a tokio-backed scheduler
//! - `stream`: the broadcast primitive, observers and subscriptions
//! - `reactive`: signals and derived cells
//! - `combinators`: operators deriving one stream from others
//! - `bridge`: stream/future conversion
//! - `registry`: bulk subscription teardown and redirecting observers
//! - `middleware`: the chain executor
//!
//! # Example
//!
//! ```rust,ignore
//! use cascade_core::prelude::*;
//!
//! let event_loop = EventLoop::new();
//! let _ctx = event_loop.enter();
//!
//! let a = Signal::new(1);
//! let b = Signal::new(2);
//! let sum = computed((a.clone(), b.clone()), |(a, b)| a + b);
//!
//! let _sub = sum.subscribe(|v: &i32| println!("sum = {v}"));
//!
//! a.set(3);
//! b.set(4);
//! event_loop.run_until_idle()?;  // prints "sum = 3", then "sum = 7"
//! ```

pub mod bridge;
pub mod combinators;
pub mod config;
pub mod error;
pub mod middleware;
pub mod reactive;
pub mod registry;
pub mod scheduler;
pub mod stream;

pub use config::EngineConfig;
pub use error::{BridgeError, EngineError, Result, StreamError};

/// Commonly used types and functions.
pub mod prelude {
    pub use crate::bridge::{from_future, to_future, ResolveOptions};
    pub use crate::combinators::{buffer, filter, map, merge, try_map};
    pub use crate::config::EngineConfig;
    pub use crate::error::{BridgeError, EngineError, StreamError};
    pub use crate::middleware::{handler, ChainExecutor, Exchange, Handler};
    pub use crate::reactive::{computed, try_computed, unwrapped, ReadSignal, Signal};
    pub use crate::registry::{DynamicObserver, SubscriptionRegistry};
    pub use crate::scheduler::{EventLoop, Scheduler, TokioScheduler};
    pub use crate::stream::{
        channel, Emitter, Observable, Observer, ObserverFns, ObserverRef, Stream, Subscription,
    };
}

//! Error Types
//!
//! Three families of failure exist in the engine:
//!
//! - [`StreamError`]: the payload of a terminal `error` signal. It travels
//!   through streams and cells, so it is cheap to clone and type-erased.
//! - [`BridgeError`]: why a stream-to-future conversion rejected.
//! - [`EngineError`]: local, synchronous failures raised at the call site
//!   (bad arguments, bad configuration, a runaway event loop).

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// Result alias for engine operations.
pub type Result<T, E = EngineError> = std::result::Result<T, E>;

/// Errors raised synchronously by engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The event loop kept producing work past its configured tick budget.
    #[error("event loop exceeded {limit} ticks without going idle")]
    TickLimitExceeded { limit: usize },

    /// A caller broke an operation's contract.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A host-backed scheduler was created outside of a tokio runtime.
    #[error("no tokio runtime available: {0}")]
    NoRuntime(String),

    /// Configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(String),
}

/// The reason carried by a stream's terminal `error` signal.
///
/// Wraps any error (or a plain message) behind an `Arc` so that every
/// subscriber can receive the same value.
#[derive(Clone)]
pub struct StreamError {
    inner: Arc<dyn std::error::Error + Send + Sync>,
}

#[derive(Debug)]
struct Message(String);

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for Message {}

impl StreamError {
    /// Wrap an existing error.
    pub fn new<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(error),
        }
    }

    /// Build an error from a message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Message(message.into())),
        }
    }

    /// Try to view the wrapped error as a concrete type.
    pub fn downcast_ref<E: std::error::Error + 'static>(&self) -> Option<&E> {
        self.inner.downcast_ref::<E>()
    }

    /// Whether two handles share the same underlying error.
    pub fn ptr_eq(&self, other: &StreamError) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StreamError").field(&self.inner.to_string()).finish()
    }
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.inner, f)
    }
}

impl std::error::Error for StreamError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.inner.source()
    }
}

impl From<&str> for StreamError {
    fn from(message: &str) -> Self {
        Self::msg(message)
    }
}

impl From<String> for StreamError {
    fn from(message: String) -> Self {
        Self::msg(message)
    }
}

impl From<EngineError> for StreamError {
    fn from(error: EngineError) -> Self {
        Self::new(error)
    }
}

/// Why a stream-to-future conversion rejected.
#[derive(Debug, Clone, Error)]
pub enum BridgeError {
    /// The source completed before producing any value.
    #[error("stream completed without a value")]
    CompletedWithoutValue,

    /// The source terminated with an error.
    #[error("stream error: {0}")]
    Source(#[source] StreamError),

    /// The external cancellation signal fired first.
    #[error("cancelled")]
    Cancelled,

    /// The timeout elapsed first.
    #[error("timed out")]
    TimedOut,
}

//! Middleware Chain Executor
//!
//! An ordered list of `(kind, handler)` entries. Handlers are async steps
//! over a payload; `chain` folds a payload through every handler of one
//! kind, in registration order, one at a time.
//!
//! # Handlers
//!
//! A handler receives the current payload and returns either a replacement
//! (`Some`) or nothing (`None`), which keeps the current payload. Handlers
//! are identified by pointer, so registering the same `Handler` twice for
//! one kind is refused while two separately created handlers with the same
//! body are distinct.
//!
//! # Request/response pipelines
//!
//! With an [`Exchange`] payload, handlers may fill in a response. `dispatch`
//! runs the chain and falls back to a final handler only when no step
//! produced a response.
//!
//! The list is snapshotted before each pass, so handlers may add or remove
//! entries while a pass is running; the change applies to the next pass.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use parking_lot::Mutex;

/// An async middleware step.
pub type Handler<P> = Arc<dyn Fn(P) -> BoxFuture<'static, Option<P>> + Send + Sync>;

/// Wrap an async function as a [`Handler`].
///
/// ```rust,ignore
/// let add_one = handler(|v: i32| async move { Some(v + 1) });
/// ```
pub fn handler<P, F, Fut>(f: F) -> Handler<P>
where
    F: Fn(P) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Option<P>> + Send + 'static,
{
    Arc::new(move |payload| f(payload).boxed())
}

fn same_handler<P>(a: &Handler<P>, b: &Handler<P>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

/// Runs kind-tagged middleware in registration order.
pub struct ChainExecutor<K, P> {
    entries: Mutex<Vec<(K, Handler<P>)>>,
}

impl<K, P> ChainExecutor<K, P>
where
    K: PartialEq + Clone + fmt::Debug,
    P: Clone + Send + 'static,
{
    /// Create an empty executor.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Append `handler` for `kind`.
    ///
    /// Returns false, and changes nothing, if this exact handler is already
    /// registered for `kind`.
    pub fn add(&self, kind: K, handler: Handler<P>) -> bool {
        let mut entries = self.entries.lock();
        let duplicate = entries
            .iter()
            .any(|(k, h)| *k == kind && same_handler(h, &handler));
        if duplicate {
            tracing::warn!(?kind, "middleware already registered; ignoring");
            return false;
        }
        entries.push((kind, handler));
        true
    }

    /// Remove the first entry matching `kind` and `handler`.
    pub fn remove(&self, kind: &K, handler: &Handler<P>) -> bool {
        let mut entries = self.entries.lock();
        match entries
            .iter()
            .position(|(k, h)| k == kind && same_handler(h, handler))
        {
            Some(index) => {
                entries.remove(index);
                true
            }
            None => false,
        }
    }

    /// Total number of entries across all kinds.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether no middleware is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Handlers registered for `kind`, in order, as of now.
    fn snapshot(&self, kind: &K) -> Vec<Handler<P>> {
        self.entries
            .lock()
            .iter()
            .filter(|(k, _)| k == kind)
            .map(|(_, h)| Arc::clone(h))
            .collect()
    }

    /// Await `visit` for each handler of `kind`, one after another.
    pub async fn for_each<V, Fut>(&self, kind: &K, mut visit: V)
    where
        V: FnMut(Handler<P>) -> Fut,
        Fut: Future<Output = ()>,
    {
        for handler in self.snapshot(kind) {
            visit(handler).await;
        }
    }

    /// Fold `initial` through every handler of `kind`.
    ///
    /// A handler returning `None` leaves the payload unchanged.
    pub async fn chain(&self, kind: &K, initial: P) -> P {
        let handlers = self.snapshot(kind);
        tracing::trace!(?kind, handlers = handlers.len(), "running middleware chain");

        let mut current = initial;
        for handler in handlers {
            if let Some(next) = handler(current.clone()).await {
                current = next;
            }
        }
        current
    }
}

impl<K, P> Default for ChainExecutor<K, P>
where
    K: PartialEq + Clone + fmt::Debug,
    P: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, P> fmt::Debug for ChainExecutor<K, P>
where
    K: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kinds: Vec<String> = self
            .entries
            .lock()
            .iter()
            .map(|(k, _)| format!("{k:?}"))
            .collect();
        f.debug_struct("ChainExecutor").field("entries", &kinds).finish()
    }
}

/// A request travelling through a middleware chain, with the response a
/// handler may have produced.
#[derive(Debug, Clone, PartialEq)]
pub struct Exchange<Req, Res> {
    pub request: Req,
    pub response: Option<Res>,
}

impl<Req, Res> Exchange<Req, Res> {
    /// An exchange with no response yet.
    pub fn new(request: Req) -> Self {
        Self {
            request,
            response: None,
        }
    }

    /// The same request, answered with `response`.
    pub fn respond(self, response: Res) -> Self {
        Self {
            request: self.request,
            response: Some(response),
        }
    }
}

impl<K, Req, Res> ChainExecutor<K, Exchange<Req, Res>>
where
    K: PartialEq + Clone + fmt::Debug,
    Req: Clone + Send + 'static,
    Res: Clone + Send + 'static,
{
    /// Run the `kind` chain over `request`; call `fallback` with the
    /// (possibly rewritten) request if no handler answered it.
    pub async fn dispatch<F, Fut>(&self, kind: &K, request: Req, fallback: F) -> Res
    where
        F: FnOnce(Req) -> Fut,
        Fut: Future<Output = Res>,
    {
        let exchange = self.chain(kind, Exchange::new(request)).await;
        match exchange.response {
            Some(response) => response,
            None => {
                tracing::trace!(?kind, "no middleware answered; using fallback");
                fallback(exchange.request).await
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

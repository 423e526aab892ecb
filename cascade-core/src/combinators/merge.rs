//! Merge operator.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::StreamError;
use crate::stream::{channel, Observable, Observer, Stream, WeakEmitter};

/// Interleave several sources into one stream, in emission order.
///
/// The merged stream completes once every source has completed. The first
/// error from any source terminates it at once. Merging nothing yields a
/// stream that is already complete.
pub fn merge<T, S, I>(sources: I) -> Stream<T>
where
    I: IntoIterator<Item = S>,
    S: Observable<T>,
    T: Clone + Send + Sync + 'static,
{
    let sources: Vec<S> = sources.into_iter().collect();
    let (emitter, stream) = channel();

    if sources.is_empty() {
        emitter.complete();
        return stream;
    }

    let listener: Arc<dyn Observer<T>> = Arc::new(MergeObserver {
        sink: emitter.downgrade(),
        remaining: AtomicUsize::new(sources.len()),
    });
    for source in &sources {
        stream.retain_upstream(source.subscribe_arc(Arc::clone(&listener)));
    }

    stream
}

struct MergeObserver<T> {
    sink: WeakEmitter<T>,

    /// Sources that have not completed yet.
    remaining: AtomicUsize,
}

impl<T> Observer<T> for MergeObserver<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn next(&self, value: &T) {
        if let Some(emitter) = self.sink.upgrade() {
            emitter.next(value.clone());
        }
    }

    fn error(&self, error: &StreamError) {
        if let Some(emitter) = self.sink.upgrade() {
            emitter.error(error.clone());
        }
    }

    fn complete(&self) {
        if self.remaining.fetch_sub(1, Ordering::SeqCst) == 1 {
            if let Some(emitter) = self.sink.upgrade() {
                emitter.complete();
            }
        }
    }
}

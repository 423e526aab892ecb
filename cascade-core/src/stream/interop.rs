//! Strong-reference adapter.
//!
//! Consumers that register a callback and forget the token (typical of
//! foreign observer protocols) would lose their observer immediately under
//! weak semantics. `Interop` parks each subscription in its own table so the
//! registration lasts until the handle is explicitly unsubscribed.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use slotmap::{new_key_type, SlotMap};

use super::observer::Observer;
use super::subscription::Subscription;
use super::Observable;

new_key_type! {
    struct InteropKey;
}

type Table = Mutex<SlotMap<InteropKey, Subscription>>;

/// A view of an observable that holds its subscribers strongly.
pub struct Interop<T> {
    source: Arc<dyn Observable<T>>,
    table: Arc<Table>,
}

/// Handle returned by [`Interop::subscribe`].
///
/// Dropping the handle does not end the registration.
pub struct InteropHandle {
    table: Weak<Table>,
    key: InteropKey,
}

impl<T> Interop<T>
where
    T: 'static,
{
    pub(crate) fn new<S>(source: S) -> Self
    where
        S: Observable<T> + 'static,
    {
        Self {
            source: Arc::new(source),
            table: Arc::new(Mutex::new(SlotMap::with_key())),
        }
    }

    /// Register an observer for as long as this view exists or until the
    /// handle is unsubscribed.
    pub fn subscribe<O>(&self, observer: O) -> InteropHandle
    where
        O: Observer<T> + 'static,
    {
        let subscription = self.source.subscribe_arc(Arc::new(observer));
        let key = self.table.lock().insert(subscription);
        InteropHandle {
            table: Arc::downgrade(&self.table),
            key,
        }
    }

    /// Number of registrations held by this view.
    pub fn len(&self) -> usize {
        self.table.lock().len()
    }

    /// Whether this view holds no registrations.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Clone for Interop<T> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            table: Arc::clone(&self.table),
        }
    }
}

impl InteropHandle {
    /// End the registration. Idempotent.
    pub fn unsubscribe(&self) {
        let Some(table) = self.table.upgrade() else {
            return;
        };
        let removed = table.lock().remove(self.key);
        if let Some(subscription) = removed {
            subscription.unsubscribe();
        }
    }

    /// Whether the registration is still held.
    pub fn is_active(&self) -> bool {
        self.table
            .upgrade()
            .map(|table| table.lock().contains_key(self.key))
            .unwrap_or(false)
    }
}

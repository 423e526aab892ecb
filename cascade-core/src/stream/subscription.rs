//! Subscription tokens.

use std::fmt;

use parking_lot::Mutex;

/// The registration behind a [`Subscription`].
pub(crate) trait Link: Send + Sync {
    /// Remove the registration.
    fn unlink(&self);

    /// Whether the registration is still in place.
    fn is_linked(&self) -> bool;
}

/// Handle to a registered observer.
///
/// The subscription owns the observer: while it exists the observer stays
/// registered. `unsubscribe` removes the registration immediately; simply
/// dropping the subscription releases the observer, and the stream prunes
/// the dead registration the next time it notifies.
pub struct Subscription {
    link: Mutex<Option<Box<dyn Link>>>,
}

impl Subscription {
    pub(crate) fn new<L>(link: L) -> Self
    where
        L: Link + 'static,
    {
        Self {
            link: Mutex::new(Some(Box::new(link))),
        }
    }

    /// A subscription that is already inactive.
    ///
    /// Returned when subscribing to a stream that has terminated.
    pub fn closed() -> Self {
        Self {
            link: Mutex::new(None),
        }
    }

    /// Remove the registration. Calling this more than once is harmless.
    pub fn unsubscribe(&self) {
        let link = self.link.lock().take();
        if let Some(link) = link {
            link.unlink();
        }
    }

    /// Whether the observer is still registered.
    pub fn is_active(&self) -> bool {
        self.link
            .lock()
            .as_ref()
            .map(|link| link.is_linked())
            .unwrap_or(false)
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

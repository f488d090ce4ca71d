//! Synchronous broadcast channel.
//!
//! Subscribers live in a slot map keyed by generational ids, so an
//! [`Unsubscribe`] handle that outlives its slot can never remove a
//! subscriber that later reused the slot.

use slotmap::{new_key_type, SlotMap};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

new_key_type! {
    /// Identifies one subscriber of a [`Subject`].
    pub struct SubscriberId;
}

/// Subscriber callback invoked with each published message.
pub type Subscriber<T> = Rc<dyn Fn(&T)>;

type Observers<T> = RefCell<SlotMap<SubscriberId, Subscriber<T>>>;

/// A set of subscribers notified synchronously on every publish.
pub struct Subject<T> {
    observers: Rc<Observers<T>>,
}

impl<T> Clone for Subject<T> {
    fn clone(&self) -> Self {
        Self {
            observers: self.observers.clone(),
        }
    }
}

impl<T> Default for Subject<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Subject<T> {
    /// Create a subject with no subscribers.
    pub fn new() -> Self {
        Self {
            observers: Rc::new(RefCell::new(SlotMap::with_key())),
        }
    }

    /// Number of registered subscribers.
    pub fn len(&self) -> usize {
        self.observers.borrow().len()
    }

    /// Whether no subscriber is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: 'static> Subject<T> {
    /// Register `observer` and return the handle that removes it again.
    pub fn subscribe(&self, observer: impl Fn(&T) + 'static) -> Unsubscribe {
        let id = self.observers.borrow_mut().insert(Rc::new(observer));
        tracing::trace!(?id, "subscriber added");

        let observers: Weak<Observers<T>> = Rc::downgrade(&self.observers);
        Unsubscribe::new(move || {
            if let Some(observers) = observers.upgrade() {
                if observers.borrow_mut().remove(id).is_some() {
                    tracing::trace!(?id, "subscriber removed");
                }
            }
        })
    }

    /// Invoke every current subscriber with `message`.
    ///
    /// The subscriber set is copied before dispatch, so observers may
    /// subscribe, unsubscribe or publish again from inside their callback.
    /// Such changes take effect from the next publish on.
    pub fn publish(&self, message: &T) {
        let observers: Vec<Subscriber<T>> = self.observers.borrow().values().cloned().collect();
        tracing::trace!(subscribers = observers.len(), "publish");

        for observer in observers {
            observer(message);
        }
    }
}

impl<T> fmt::Debug for Subject<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subject")
            .field("subscribers", &self.len())
            .finish()
    }
}

/// Handle returned by every `subscribe` call.
///
/// Calling [`Unsubscribe::unsubscribe`] detaches the observer; later calls
/// are no-ops. Dropping the handle leaves the subscription in place.
#[derive(Clone)]
pub struct Unsubscribe {
    remove: Rc<Cell<Option<Box<dyn FnOnce()>>>>,
}

impl Unsubscribe {
    /// Wrap a removal closure. It runs at most once.
    pub fn new(remove: impl FnOnce() + 'static) -> Self {
        Self {
            remove: Rc::new(Cell::new(Some(Box::new(remove)))),
        }
    }

    /// A handle with nothing to remove.
    pub fn noop() -> Self {
        Self {
            remove: Rc::new(Cell::new(None)),
        }
    }

    /// Detach the observer this handle was created for.
    pub fn unsubscribe(&self) {
        if let Some(remove) = self.remove.take() {
            remove();
        }
    }

    /// Whether [`Unsubscribe::unsubscribe`] still has work to do.
    pub fn is_active(&self) -> bool {
        let remove = self.remove.take();
        let active = remove.is_some();
        self.remove.set(remove);
        active
    }
}

impl fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unsubscribe")
            .field("active", &self.is_active())
            .finish()
    }
}

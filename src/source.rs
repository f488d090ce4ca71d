//! The read/subscribe contract shared by every observable in the crate.

use crate::subject::Unsubscribe;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-unique identity of a source.
///
/// Selectors use it to register each dependency exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SourceId(u64);

impl SourceId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Anything that holds a live value, a server value, and notifies on change.
///
/// Implemented by notifiers, selectors, bridges and raw external stores, so
/// selectors and bridges can be stacked on top of each other freely.
pub trait Source {
    /// The value this source publishes.
    type Value: 'static;

    /// Identity of this source. Clones of a handle share it.
    fn source_id(&self) -> SourceId;

    /// Current live value.
    fn snapshot(&self) -> Rc<Self::Value>;

    /// Value to use for server rendering and hydration.
    fn server_snapshot(&self) -> Rc<Self::Value>;

    /// Call `observer` with every value this source publishes.
    fn subscribe(&self, observer: impl Fn(&Self::Value) + 'static) -> Unsubscribe;
}

impl<S: Source> Source for &S {
    type Value = S::Value;

    fn source_id(&self) -> SourceId {
        (**self).source_id()
    }

    fn snapshot(&self) -> Rc<Self::Value> {
        (**self).snapshot()
    }

    fn server_snapshot(&self) -> Rc<Self::Value> {
        (**self).server_snapshot()
    }

    fn subscribe(&self, observer: impl Fn(&Self::Value) + 'static) -> Unsubscribe {
        (**self).subscribe(observer)
    }
}

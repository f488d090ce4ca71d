//! Adapters between sources and a host framework's external-store contract.
//!
//! A host framework that renders from external state needs three things:
//! a way to subscribe to changes, a snapshot that stays the same allocation
//! until the state really changes, and a separate snapshot for server
//! rendering and hydration. [`Bridge`] provides all three for any
//! [`Source`], optionally narrowed by a projection.

use crate::compare::{same_value, Comparator, DeepEqual, SharedComparator};
use crate::error::{Error, Result};
use crate::source::{Source, SourceId};
use crate::subject::{Subject, Unsubscribe};
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

/// The synchronization contract a host framework consumes.
///
/// The host calls `get_snapshot` after every `on_store_change` and compares
/// snapshots by identity to decide whether to re-render.
pub trait ExternalStore {
    /// Snapshot type handed to the host.
    type Snapshot: 'static;

    /// Register `on_store_change` with the store.
    fn subscribe(&self, on_store_change: Box<dyn Fn()>) -> Unsubscribe;

    /// Snapshot for interactive rendering.
    fn get_snapshot(&self) -> Rc<Self::Snapshot>;

    /// Snapshot for server rendering and hydration.
    fn get_server_snapshot(&self) -> Rc<Self::Snapshot>;
}

/// Which snapshot a render pass must observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderPhase {
    /// Rendering on the server.
    Server,
    /// First client render, which must match the server output.
    Hydrating,
    /// Any later client render.
    Client,
}

type Projection<I, R> = Rc<dyn Fn(Rc<I>) -> Rc<R>>;

struct BridgeInner<R> {
    id: SourceId,
    snapshot: RefCell<Rc<R>>,
    server_snapshot: Rc<R>,
    subject: Subject<R>,
    comparator: SharedComparator<R>,
    upstream: Unsubscribe,
}

impl<R: 'static> BridgeInner<R> {
    fn update(&self, next: Rc<R>) {
        let unchanged = {
            let current = self.snapshot.borrow();
            same_value(&current, &next, self.comparator.as_ref())
        };
        if unchanged {
            tracing::debug!(id = ?self.id, "projection unchanged, not notifying");
            return;
        }

        *self.snapshot.borrow_mut() = next.clone();
        self.subject.publish(&next);
    }
}

impl<R> Drop for BridgeInner<R> {
    fn drop(&mut self) {
        self.upstream.unsubscribe();
    }
}

/// A projection of a source that only notifies when the projected value
/// changes.
///
/// The server snapshot is computed once, when the bridge is attached. The
/// live snapshot is recomputed on every upstream publish and replaced only
/// when it differs from the previous one, so consecutive
/// [`Bridge::value`] calls return the same allocation until then.
pub struct Bridge<R> {
    inner: Rc<BridgeInner<R>>,
}

impl<R> Clone for Bridge<R> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<R: 'static> Bridge<R> {
    /// Attach to `source` with a custom change test and a projection.
    pub fn with_comparator<S>(
        source: &S,
        comparator: impl Comparator<R> + 'static,
        projection: impl Fn(&S::Value) -> R + 'static,
    ) -> Self
    where
        S: Source + Clone + 'static,
    {
        let project: Projection<S::Value, R> =
            Rc::new(move |value: Rc<S::Value>| Rc::new(projection(&*value)));
        Self::attach(source, project, Rc::new(comparator))
    }

    fn attach<S>(
        source: &S,
        project: Projection<S::Value, R>,
        comparator: SharedComparator<R>,
    ) -> Self
    where
        S: Source + Clone + 'static,
    {
        let server_snapshot = project(source.server_snapshot());
        let snapshot = project(source.snapshot());

        let inner = Rc::new_cyclic(|weak: &Weak<BridgeInner<R>>| {
            let weak = weak.clone();
            let upstream_source = source.clone();
            let upstream = source.subscribe(move |_| {
                if let Some(inner) = weak.upgrade() {
                    inner.update(project(upstream_source.snapshot()));
                }
            });

            BridgeInner {
                id: SourceId::next(),
                snapshot: RefCell::new(snapshot),
                server_snapshot,
                subject: Subject::new(),
                comparator,
                upstream,
            }
        });
        tracing::trace!(id = ?inner.id, source = ?source.source_id(), "bridge attached");

        Self { inner }
    }

    /// Last projected live value.
    pub fn value(&self) -> Rc<R> {
        self.inner.snapshot.borrow().clone()
    }

    /// Projection of the server value, taken at attach time.
    pub fn server_value(&self) -> Rc<R> {
        self.inner.server_snapshot.clone()
    }

    /// The snapshot a render pass in `phase` must use.
    pub fn snapshot_for(&self, phase: RenderPhase) -> Rc<R> {
        match phase {
            RenderPhase::Server | RenderPhase::Hydrating => self.server_value(),
            RenderPhase::Client => self.value(),
        }
    }

    /// Subscribe to changes of the projected value.
    pub fn subscribe(&self, on_change: impl Fn(&R) + 'static) -> Unsubscribe {
        self.inner.subject.subscribe(on_change)
    }

    /// Number of current subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subject.len()
    }
}

impl<R: PartialEq + 'static> Bridge<R> {
    /// Attach to `source` without a projection.
    ///
    /// Snapshots are the source's own values, shared rather than cloned.
    pub fn new<S>(source: &S) -> Self
    where
        S: Source<Value = R> + Clone + 'static,
    {
        Self::attach(source, Rc::new(|value: Rc<R>| value), Rc::new(DeepEqual))
    }

    /// Attach to `source` through `projection`.
    pub fn with_projection<S>(source: &S, projection: impl Fn(&S::Value) -> R + 'static) -> Self
    where
        S: Source + Clone + 'static,
    {
        Self::with_comparator(source, DeepEqual, projection)
    }
}

/// Observe a whole source.
pub fn observe<S>(source: &S) -> Bridge<S::Value>
where
    S: Source + Clone + 'static,
    S::Value: PartialEq,
{
    Bridge::new(source)
}

/// Observe the part of a source selected by `projection`.
pub fn observe_with<S, R>(source: &S, projection: impl Fn(&S::Value) -> R + 'static) -> Bridge<R>
where
    S: Source + Clone + 'static,
    R: PartialEq + 'static,
{
    Bridge::with_projection(source, projection)
}

impl<R: 'static> ExternalStore for Bridge<R> {
    type Snapshot = R;

    fn subscribe(&self, on_store_change: Box<dyn Fn()>) -> Unsubscribe {
        self.inner.subject.subscribe(move |_| on_store_change())
    }

    fn get_snapshot(&self) -> Rc<R> {
        self.value()
    }

    fn get_server_snapshot(&self) -> Rc<R> {
        self.server_value()
    }
}

impl<R: 'static> Source for Bridge<R> {
    type Value = R;

    fn source_id(&self) -> SourceId {
        self.inner.id
    }

    fn snapshot(&self) -> Rc<R> {
        self.value()
    }

    fn server_snapshot(&self) -> Rc<R> {
        self.server_value()
    }

    fn subscribe(&self, observer: impl Fn(&R) + 'static) -> Unsubscribe {
        Bridge::subscribe(self, observer)
    }
}

impl<R: 'static + fmt::Debug> fmt::Debug for Bridge<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bridge")
            .field("id", &self.inner.id)
            .field("value", &self.value())
            .field("server_value", &self.server_value())
            .finish()
    }
}

type SubscribeFn<T> = Rc<dyn Fn(Box<dyn Fn(&T)>) -> Unsubscribe>;
type SnapshotFn<T> = Rc<dyn Fn() -> Rc<T>>;

/// A store owned by foreign code, described by its three capabilities.
pub struct RawSource<T> {
    id: SourceId,
    subscribe: SubscribeFn<T>,
    snapshot: SnapshotFn<T>,
    server_snapshot: SnapshotFn<T>,
}

impl<T> Clone for RawSource<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            subscribe: self.subscribe.clone(),
            snapshot: self.snapshot.clone(),
            server_snapshot: self.server_snapshot.clone(),
        }
    }
}

impl<T: 'static> RawSource<T> {
    /// Start describing a foreign store.
    pub fn builder() -> RawSourceBuilder<T> {
        RawSourceBuilder {
            subscribe: None,
            snapshot: None,
            server_snapshot: None,
        }
    }
}

impl<T: 'static> Source for RawSource<T> {
    type Value = T;

    fn source_id(&self) -> SourceId {
        self.id
    }

    fn snapshot(&self) -> Rc<T> {
        (self.snapshot)()
    }

    fn server_snapshot(&self) -> Rc<T> {
        (self.server_snapshot)()
    }

    fn subscribe(&self, observer: impl Fn(&T) + 'static) -> Unsubscribe {
        (self.subscribe)(Box::new(observer))
    }
}

impl<T> fmt::Debug for RawSource<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawSource").field("id", &self.id).finish()
    }
}

/// Builder for [`RawSource`].
pub struct RawSourceBuilder<T> {
    subscribe: Option<SubscribeFn<T>>,
    snapshot: Option<SnapshotFn<T>>,
    server_snapshot: Option<SnapshotFn<T>>,
}

impl<T: 'static> RawSourceBuilder<T> {
    /// How to register an observer with the store.
    pub fn subscribe(
        mut self,
        subscribe: impl Fn(Box<dyn Fn(&T)>) -> Unsubscribe + 'static,
    ) -> Self {
        self.subscribe = Some(Rc::new(subscribe));
        self
    }

    /// How to read the live value.
    pub fn snapshot(mut self, snapshot: impl Fn() -> Rc<T> + 'static) -> Self {
        self.snapshot = Some(Rc::new(snapshot));
        self
    }

    /// How to read the server value.
    pub fn server_snapshot(mut self, server_snapshot: impl Fn() -> Rc<T> + 'static) -> Self {
        self.server_snapshot = Some(Rc::new(server_snapshot));
        self
    }

    /// Finish the description.
    ///
    /// Fails with [`Error::InvalidSource`] listing every missing capability.
    pub fn build(self) -> Result<RawSource<T>> {
        match (self.subscribe, self.snapshot, self.server_snapshot) {
            (Some(subscribe), Some(snapshot), Some(server_snapshot)) => Ok(RawSource {
                id: SourceId::next(),
                subscribe,
                snapshot,
                server_snapshot,
            }),
            (subscribe, snapshot, server_snapshot) => {
                let missing: Vec<&str> = [
                    ("subscribe", subscribe.is_none()),
                    ("snapshot", snapshot.is_none()),
                    ("server_snapshot", server_snapshot.is_none()),
                ]
                .into_iter()
                .filter_map(|(name, missing)| missing.then_some(name))
                .collect();
                Err(Error::InvalidSource(format!(
                    "source must provide {}",
                    missing.join(", ")
                )))
            }
        }
    }
}

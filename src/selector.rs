//! Derived state computed from notifiers and other selectors.

use crate::compare::{Comparator, DeepEqual, SharedComparator};
use crate::error::Result;
use crate::notifier::Notifier;
use crate::source::{Source, SourceId};
use crate::subject::{Subject, Unsubscribe};
use futures::future::{FutureExt, LocalBoxFuture};
use futures::task::{LocalSpawn, LocalSpawnExt, SpawnError};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::rc::{Rc, Weak};

/// Dependencies discovered while evaluating a selector.
///
/// Each source is subscribed at most once, keyed by [`SourceId`]. The
/// subscriptions only hold a weak reference back to the selector.
struct Dependencies {
    tracked: RefCell<HashMap<SourceId, Unsubscribe>>,
    on_change: Rc<dyn Fn()>,
}

impl Dependencies {
    fn new(on_change: Rc<dyn Fn()>) -> Rc<Self> {
        Rc::new(Self {
            tracked: RefCell::new(HashMap::new()),
            on_change,
        })
    }

    fn track<D: Source + ?Sized>(&self, dep: &D) {
        let id = dep.source_id();
        if self.tracked.borrow().contains_key(&id) {
            return;
        }

        let on_change = self.on_change.clone();
        let unsubscribe = dep.subscribe(move |_| on_change());
        tracing::trace!(dependency = ?id, "selector dependency tracked");
        self.tracked.borrow_mut().insert(id, unsubscribe);
    }

    fn contains(&self, id: SourceId) -> bool {
        self.tracked.borrow().contains_key(&id)
    }

    fn len(&self) -> usize {
        self.tracked.borrow().len()
    }
}

impl Drop for Dependencies {
    fn drop(&mut self) {
        for (_, unsubscribe) in self.tracked.get_mut().drain() {
            unsubscribe.unsubscribe();
        }
    }
}

/// Read access handed to a selector's evaluation function.
///
/// Every source read through a `Getter` becomes a dependency of the
/// selector, so the selector re-evaluates whenever that source publishes.
#[derive(Clone)]
pub struct Getter {
    deps: Rc<Dependencies>,
    server: bool,
}

impl Getter {
    fn live(deps: Rc<Dependencies>) -> Self {
        Self {
            deps,
            server: false,
        }
    }

    fn server(deps: Rc<Dependencies>) -> Self {
        Self { deps, server: true }
    }

    /// Read `dep` and track it.
    ///
    /// During the server pass this returns the server value.
    pub fn get<D: Source + ?Sized>(&self, dep: &D) -> Rc<D::Value> {
        self.deps.track(dep);
        if self.server {
            dep.server_snapshot()
        } else {
            dep.snapshot()
        }
    }

    /// Read the server value of `dep` and track it.
    pub fn get_server<D: Source + ?Sized>(&self, dep: &D) -> Rc<D::Value> {
        self.deps.track(dep);
        dep.server_snapshot()
    }

    /// Write `value` into `dep` if it is already a dependency.
    ///
    /// Returns false, without writing, for notifiers this selector has never
    /// read.
    pub fn set<S: 'static>(&self, dep: &Notifier<S>, value: S) -> bool {
        if !self.deps.contains(dep.source_id()) {
            tracing::debug!(dependency = ?dep.source_id(), "write to untracked dependency ignored");
            return false;
        }
        dep.set_state(value);
        true
    }

    /// Whether this getter belongs to the server pass.
    pub fn is_server(&self) -> bool {
        self.server
    }
}

impl fmt::Debug for Getter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Getter")
            .field("dependencies", &self.deps.len())
            .field("server", &self.server)
            .finish()
    }
}

type SyncEval<V> = Rc<dyn Fn(&Getter) -> V>;
type AsyncEval<V> = Rc<dyn Fn(Getter) -> LocalBoxFuture<'static, V>>;

enum Evaluator<V> {
    Sync(SyncEval<V>),
    Async {
        eval: AsyncEval<V>,
        spawner: Rc<dyn LocalSpawn>,
    },
}

struct EvaluationGuard<'a>(&'a Cell<bool>);

impl Drop for EvaluationGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

struct SelectorInner<V> {
    id: SourceId,
    value: RefCell<Rc<V>>,
    server_value: RefCell<Rc<V>>,
    subject: Subject<V>,
    deps: Rc<Dependencies>,
    evaluator: Evaluator<V>,
    comparator: SharedComparator<V>,
    evaluating: Cell<bool>,
    dirty: Cell<bool>,
    issued: Cell<u64>,
    applied: Cell<u64>,
}

impl<V: 'static> SelectorInner<V> {
    fn recompute(self: &Rc<Self>) {
        match &self.evaluator {
            Evaluator::Sync(eval) => {
                if self.evaluating.replace(true) {
                    self.dirty.set(true);
                    return;
                }
                let _guard = EvaluationGuard(&self.evaluating);

                loop {
                    self.dirty.set(false);
                    tracing::trace!(id = ?self.id, "re-evaluating selector");
                    let value = eval(&Getter::live(self.deps.clone()));
                    self.apply(value);
                    if !self.dirty.get() {
                        break;
                    }
                }
            }
            Evaluator::Async { .. } => {
                if let Err(err) = self.spawn_live() {
                    tracing::warn!(id = ?self.id, %err, "failed to spawn selector re-evaluation");
                }
            }
        }
    }

    /// Store `value` and publish it unless it equals the cached value.
    fn apply(&self, value: V) {
        let unchanged = {
            let current = self.value.borrow();
            self.comparator.equals(&**current, &value)
        };
        if unchanged {
            tracing::debug!(id = ?self.id, "selector value unchanged, not publishing");
            return;
        }

        let value = Rc::new(value);
        *self.value.borrow_mut() = value.clone();
        self.subject.publish(&value);
    }

    fn spawn_live(self: &Rc<Self>) -> Result<(), SpawnError> {
        let Evaluator::Async { eval, spawner } = &self.evaluator else {
            return Ok(());
        };

        let seq = self.issued.get() + 1;
        self.issued.set(seq);
        let future = eval(Getter::live(self.deps.clone()));
        let weak = Rc::downgrade(self);

        spawner.spawn_local(async move {
            let value = future.await;
            if let Some(inner) = weak.upgrade() {
                inner.finish(seq, value);
            }
        })
    }

    fn spawn_server(self: &Rc<Self>) -> Result<(), SpawnError> {
        let Evaluator::Async { eval, spawner } = &self.evaluator else {
            return Ok(());
        };

        let future = eval(Getter::server(self.deps.clone()));
        let weak = Rc::downgrade(self);

        spawner.spawn_local(async move {
            let value = future.await;
            if let Some(inner) = weak.upgrade() {
                *inner.server_value.borrow_mut() = Rc::new(value);
            }
        })
    }

    fn finish(&self, seq: u64, value: V) {
        if seq <= self.applied.get() {
            tracing::debug!(
                id = ?self.id,
                seq,
                applied = self.applied.get(),
                "discarding superseded selector evaluation"
            );
            return;
        }
        self.applied.set(seq);
        self.apply(value);
    }
}

fn on_change<V: 'static>(weak: Weak<SelectorInner<V>>) -> Rc<dyn Fn()> {
    Rc::new(move || {
        if let Some(inner) = weak.upgrade() {
            inner.recompute();
        }
    })
}

/// A cached value derived from other sources.
///
/// The evaluation function runs once for the server value and once for the
/// live value at construction. Afterwards it re-runs whenever one of the
/// sources it read publishes, and subscribers are only notified when the
/// result differs from the cached value.
///
/// # Examples
///
/// ```rust,no_run
/// use notifiers::prelude::*;
///
/// let a = Notifier::new(1);
/// let b = Notifier::new(2);
/// let sum = Selector::new({
///     let (a, b) = (a.clone(), b.clone());
///     move |get: &Getter| *get.get(&a) + *get.get(&b)
/// });
/// assert_eq!(*sum.value(), 3);
/// ```
pub struct Selector<V> {
    inner: Rc<SelectorInner<V>>,
}

impl<V> Clone for Selector<V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<V> PartialEq for Selector<V> {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl<V> Eq for Selector<V> {}

impl<V> Hash for Selector<V> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

impl<V: PartialEq + 'static> Selector<V> {
    /// Create a selector that notifies when its value changes structurally.
    pub fn new(eval: impl Fn(&Getter) -> V + 'static) -> Self {
        Self::with_comparator(DeepEqual, eval)
    }
}

impl<V: 'static> Selector<V> {
    /// Create a selector with a custom change test.
    pub fn with_comparator(
        comparator: impl Comparator<V> + 'static,
        eval: impl Fn(&Getter) -> V + 'static,
    ) -> Self {
        let eval: SyncEval<V> = Rc::new(eval);
        let inner = Rc::new_cyclic(|weak: &Weak<SelectorInner<V>>| {
            let deps = Dependencies::new(on_change(weak.clone()));
            let server_value = eval(&Getter::server(deps.clone()));
            let value = eval(&Getter::live(deps.clone()));

            SelectorInner {
                id: SourceId::next(),
                value: RefCell::new(Rc::new(value)),
                server_value: RefCell::new(Rc::new(server_value)),
                subject: Subject::new(),
                deps,
                evaluator: Evaluator::Sync(eval),
                comparator: Rc::new(comparator),
                evaluating: Cell::new(false),
                dirty: Cell::new(false),
                issued: Cell::new(0),
                applied: Cell::new(0),
            }
        });
        Self { inner }
    }

    /// Current cached value.
    pub fn value(&self) -> Rc<V> {
        self.inner.value.borrow().clone()
    }

    /// Read the cached value with a closure.
    pub fn with<R>(&self, f: impl FnOnce(&V) -> R) -> R {
        let value = self.value();
        f(&value)
    }

    /// Value computed from the server values of the dependencies.
    pub fn server_value(&self) -> Rc<V> {
        self.inner.server_value.borrow().clone()
    }

    /// Subscribe to changes of the cached value.
    pub fn subscribe(&self, observer: impl Fn(&V) + 'static) -> Unsubscribe {
        self.inner.subject.subscribe(observer)
    }

    /// Number of distinct sources this selector has read.
    pub fn dependency_count(&self) -> usize {
        self.inner.deps.len()
    }

    /// Number of current subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subject.len()
    }
}

impl<V: PartialEq + 'static> Selector<Option<V>> {
    /// Create a selector whose evaluation completes asynchronously.
    ///
    /// Evaluations run on `spawner`. The value is `None` until the first
    /// live evaluation completes. Overlapping evaluations are numbered in
    /// the order they start, and a result is only applied if it is newer
    /// than the last applied one.
    pub fn new_async<F, Fut>(spawner: impl LocalSpawn + 'static, eval: F) -> Result<Self>
    where
        F: Fn(Getter) -> Fut + 'static,
        Fut: Future<Output = V> + 'static,
    {
        let eval: AsyncEval<Option<V>> =
            Rc::new(move |getter: Getter| eval(getter).map(Some).boxed_local());
        let spawner: Rc<dyn LocalSpawn> = Rc::new(spawner);

        let inner = Rc::new_cyclic(|weak: &Weak<SelectorInner<Option<V>>>| SelectorInner {
            id: SourceId::next(),
            value: RefCell::new(Rc::new(None)),
            server_value: RefCell::new(Rc::new(None)),
            subject: Subject::new(),
            deps: Dependencies::new(on_change(weak.clone())),
            evaluator: Evaluator::Async { eval, spawner },
            comparator: Rc::new(DeepEqual),
            evaluating: Cell::new(false),
            dirty: Cell::new(false),
            issued: Cell::new(0),
            applied: Cell::new(0),
        });

        inner.spawn_server()?;
        inner.spawn_live()?;
        Ok(Self { inner })
    }
}

impl<V: 'static> Source for Selector<V> {
    type Value = V;

    fn source_id(&self) -> SourceId {
        self.inner.id
    }

    fn snapshot(&self) -> Rc<V> {
        self.value()
    }

    fn server_snapshot(&self) -> Rc<V> {
        self.server_value()
    }

    fn subscribe(&self, observer: impl Fn(&V) + 'static) -> Unsubscribe {
        Selector::subscribe(self, observer)
    }
}

impl<V: 'static + fmt::Debug> fmt::Debug for Selector<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Selector")
            .field("id", &self.inner.id)
            .field("value", &self.value())
            .field("dependencies", &self.dependency_count())
            .finish()
    }
}

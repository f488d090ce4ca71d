//! State containers.

use crate::compare::deep_compare;
use crate::source::{Source, SourceId};
use crate::subject::{Subject, Unsubscribe};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::{BuildHasher, Hash, Hasher};
use std::rc::Rc;

/// Write-once server baseline.
#[derive(Debug)]
pub enum ServerState<S> {
    /// No server value has been assigned since construction or the last reset.
    Unset,
    /// The first server value assigned.
    Set(Rc<S>),
}

impl<S> Clone for ServerState<S> {
    fn clone(&self) -> Self {
        match self {
            Self::Unset => Self::Unset,
            Self::Set(state) => Self::Set(state.clone()),
        }
    }
}

impl<S> ServerState<S> {
    /// Whether a server value has been assigned.
    pub fn is_set(&self) -> bool {
        matches!(self, Self::Set(_))
    }
}

/// Shallow merge of a partial update into a state value.
///
/// Fields present in the patch replace the corresponding fields wholesale;
/// nested values are not merged recursively.
pub trait Merge {
    /// The partial form of `Self`.
    type Patch;

    /// Apply `patch` on top of `self`.
    fn merge(&mut self, patch: Self::Patch);
}

impl<K: Eq + Hash, V, H: BuildHasher> Merge for HashMap<K, V, H> {
    type Patch = HashMap<K, V, H>;

    fn merge(&mut self, patch: Self::Patch) {
        self.extend(patch);
    }
}

impl<K: Ord, V> Merge for BTreeMap<K, V> {
    type Patch = BTreeMap<K, V>;

    fn merge(&mut self, patch: Self::Patch) {
        self.extend(patch);
    }
}

struct NotifierInner<S> {
    id: SourceId,
    initial: Rc<S>,
    state: RefCell<Rc<S>>,
    server: RefCell<ServerState<S>>,
    subject: Subject<S>,
}

/// Owns one piece of state and notifies subscribers on every write.
///
/// `Notifier` handles are cheap to clone and all clones share the same
/// state. Application stores usually keep the `Notifier` private, expose
/// typed action methods that call the write operations, and hand out
/// [`ReadOnlyNotifier`]s to consumers.
///
/// # Examples
///
/// ```rust,no_run
/// use notifiers::prelude::*;
///
/// #[derive(Clone, Debug, PartialEq)]
/// struct Counter {
///     count: i32,
/// }
///
/// struct CounterStore {
///     notifier: Notifier<Counter>,
/// }
///
/// impl CounterStore {
///     fn increment(&self) {
///         self.notifier.update(|state| state.count += 1);
///     }
///
///     fn state(&self) -> ReadOnlyNotifier<Counter> {
///         self.notifier.read_only()
///     }
/// }
/// ```
pub struct Notifier<S> {
    inner: Rc<NotifierInner<S>>,
}

impl<S> Clone for Notifier<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<S> PartialEq for Notifier<S> {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl<S> Eq for Notifier<S> {}

impl<S> Hash for Notifier<S> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

impl<S: Default + 'static> Default for Notifier<S> {
    fn default() -> Self {
        Self::new(S::default())
    }
}

impl<S: 'static> Notifier<S> {
    /// Create a notifier whose live value and reset target is `initial`.
    pub fn new(initial: S) -> Self {
        let initial = Rc::new(initial);
        Self {
            inner: Rc::new(NotifierInner {
                id: SourceId::next(),
                state: RefCell::new(initial.clone()),
                initial,
                server: RefCell::new(ServerState::Unset),
                subject: Subject::new(),
            }),
        }
    }

    /// Current live value.
    pub fn state(&self) -> Rc<S> {
        self.inner.state.borrow().clone()
    }

    /// Read the live value with a closure.
    pub fn with<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        let state = self.state();
        f(&state)
    }

    /// Server baseline, falling back to the initial value while unset.
    pub fn server_state(&self) -> Rc<S> {
        match &*self.inner.server.borrow() {
            ServerState::Set(state) => state.clone(),
            ServerState::Unset => self.inner.initial.clone(),
        }
    }

    /// Whether a server baseline has been assigned.
    pub fn has_server_state(&self) -> bool {
        self.inner.server.borrow().is_set()
    }

    /// Replace the live value and notify every subscriber.
    pub fn set_state(&self, state: S) {
        self.write(Rc::new(state));
    }

    /// Assign the server baseline if none is set yet.
    ///
    /// On success the value also becomes the live value (with a publish).
    /// Returns false, without publishing, if a baseline was already set.
    pub fn set_server_state(&self, state: S) -> bool {
        let state = Rc::new(state);
        {
            let mut server = self.inner.server.borrow_mut();
            if server.is_set() {
                tracing::debug!(id = ?self.inner.id, "server state already set, ignoring");
                return false;
            }
            *server = ServerState::Set(state.clone());
        }
        self.write(state);
        true
    }

    /// Shallow-merge `patch` onto the live value, then write the result.
    pub fn update_state(&self, patch: S::Patch)
    where
        S: Merge + Clone,
    {
        let mut next = (*self.state()).clone();
        next.merge(patch);
        self.set_state(next);
    }

    /// Write a modified copy of the live value.
    pub fn update(&self, f: impl FnOnce(&mut S))
    where
        S: Clone,
    {
        let mut next = (*self.state()).clone();
        f(&mut next);
        self.set_state(next);
    }

    /// Write `state` only when it differs structurally from the live value.
    ///
    /// Returns true if the value was written.
    pub fn set_state_if_changed(&self, state: S) -> bool
    where
        S: PartialEq,
    {
        if self.with(|current| deep_compare(current, &state)) {
            return false;
        }
        self.set_state(state);
        true
    }

    /// Restore the initial value, clear the server baseline, and publish.
    pub fn reset(&self) {
        tracing::debug!(id = ?self.inner.id, "reset");
        *self.inner.server.borrow_mut() = ServerState::Unset;
        self.write(self.inner.initial.clone());
    }

    /// Subscribe to every write.
    pub fn subscribe(&self, observer: impl Fn(&S) + 'static) -> Unsubscribe {
        self.inner.subject.subscribe(observer)
    }

    /// Number of current subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subject.len()
    }

    /// A handle that can read and subscribe but not write.
    pub fn read_only(&self) -> ReadOnlyNotifier<S> {
        ReadOnlyNotifier {
            inner: self.clone(),
        }
    }

    fn write(&self, state: Rc<S>) {
        *self.inner.state.borrow_mut() = state.clone();
        self.inner.subject.publish(&state);
    }
}

impl<S: 'static> Source for Notifier<S> {
    type Value = S;

    fn source_id(&self) -> SourceId {
        self.inner.id
    }

    fn snapshot(&self) -> Rc<S> {
        self.state()
    }

    fn server_snapshot(&self) -> Rc<S> {
        self.server_state()
    }

    fn subscribe(&self, observer: impl Fn(&S) + 'static) -> Unsubscribe {
        Notifier::subscribe(self, observer)
    }
}

impl<S: 'static + fmt::Debug> fmt::Debug for Notifier<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notifier")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .field("server", &*self.inner.server.borrow())
            .finish()
    }
}

/// A read-only view of a notifier.
///
/// Consumers can read, subscribe and reset, but only the owner of the
/// underlying [`Notifier`] can write.
pub struct ReadOnlyNotifier<S> {
    inner: Notifier<S>,
}

impl<S> Clone for ReadOnlyNotifier<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<S> PartialEq for ReadOnlyNotifier<S> {
    fn eq(&self, other: &Self) -> bool {
        self.inner == other.inner
    }
}

impl<S> Eq for ReadOnlyNotifier<S> {}

impl<S> Hash for ReadOnlyNotifier<S> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.hash(state);
    }
}

impl<S: 'static> ReadOnlyNotifier<S> {
    /// Current live value.
    pub fn state(&self) -> Rc<S> {
        self.inner.state()
    }

    /// Read the live value with a closure.
    pub fn with<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        self.inner.with(f)
    }

    /// Server baseline, falling back to the initial value while unset.
    pub fn server_state(&self) -> Rc<S> {
        self.inner.server_state()
    }

    /// Restore the initial value, clear the server baseline, and publish.
    pub fn reset(&self) {
        self.inner.reset();
    }

    /// Subscribe to every write.
    pub fn subscribe(&self, observer: impl Fn(&S) + 'static) -> Unsubscribe {
        self.inner.subscribe(observer)
    }
}

impl<S: 'static> Source for ReadOnlyNotifier<S> {
    type Value = S;

    fn source_id(&self) -> SourceId {
        self.inner.source_id()
    }

    fn snapshot(&self) -> Rc<S> {
        self.inner.state()
    }

    fn server_snapshot(&self) -> Rc<S> {
        self.inner.server_state()
    }

    fn subscribe(&self, observer: impl Fn(&S) + 'static) -> Unsubscribe {
        self.inner.subscribe(observer)
    }
}

impl<S: 'static + fmt::Debug> fmt::Debug for ReadOnlyNotifier<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadOnlyNotifier")
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use rand::Rng;
    use std::sync::Arc;

    #[derive(Clone, Debug, PartialEq)]
    struct Profile {
        name: String,
        age: u32,
        tags: Vec<String>,
    }

    #[derive(Default)]
    struct ProfilePatch {
        name: Option<String>,
        tags: Option<Vec<String>>,
    }

    impl Merge for Profile {
        type Patch = ProfilePatch;

        fn merge(&mut self, patch: ProfilePatch) {
            if let Some(name) = patch.name {
                self.name = name;
            }
            if let Some(tags) = patch.tags {
                self.tags = tags;
            }
        }
    }

    fn profile() -> Profile {
        Profile {
            name: "ada".into(),
            age: 36,
            tags: vec!["math".into(), "engines".into()],
        }
    }

    fn counting<S: 'static>(notifier: &Notifier<S>) -> Arc<Mutex<usize>> {
        let count = Arc::new(Mutex::new(0));
        let count_clone = count.clone();
        notifier.subscribe(move |_| *count_clone.lock() += 1);
        count
    }

    #[test]
    fn test_write_then_read() {
        let mut rng = rand::thread_rng();
        let notifier = Notifier::new(0i64);
        for _ in 0..100 {
            let value: i64 = rng.gen();
            notifier.set_state(value);
            assert_eq!(*notifier.state(), value);
        }
    }

    #[test]
    fn test_write_publishes_before_returning() {
        let notifier = Notifier::new(1);
        let seen = Rc::new(RefCell::new(Vec::new()));
        {
            let seen = seen.clone();
            notifier.subscribe(move |value| seen.borrow_mut().push(*value));
        }

        notifier.set_state(2);
        assert_eq!(*seen.borrow(), vec![2]);

        // raw containers publish even when nothing changed
        notifier.set_state(2);
        assert_eq!(*seen.borrow(), vec![2, 2]);
    }

    #[test]
    fn test_server_state_is_write_once() {
        let mut rng = rand::thread_rng();
        for _ in 0..50 {
            let first: u32 = rng.gen();
            let second = first.wrapping_add(rng.gen_range(1..1000));
            let notifier = Notifier::new(0u32);
            let count = counting(&notifier);

            assert!(notifier.set_server_state(first));
            assert!(!notifier.set_server_state(second));

            assert_eq!(*notifier.server_state(), first);
            assert_eq!(*notifier.state(), first);
            assert_eq!(*count.lock(), 1);
        }
    }

    #[test]
    fn test_server_state_falls_back_to_initial() {
        let notifier = Notifier::new("initial");
        assert!(!notifier.has_server_state());
        assert_eq!(*notifier.server_state(), "initial");

        notifier.set_state("live");
        assert_eq!(*notifier.server_state(), "initial");
    }

    #[test]
    fn test_reset_restores_initial_and_clears_server() {
        let notifier = Notifier::new(profile());
        let count = counting(&notifier);
        notifier.set_server_state(Profile {
            age: 40,
            ..profile()
        });
        notifier.update(|p| p.age = 41);

        notifier.reset();
        assert_eq!(*notifier.state(), profile());
        assert_eq!(*notifier.server_state(), profile());
        assert!(!notifier.has_server_state());
        let after_first = *count.lock();

        notifier.reset();
        assert_eq!(*notifier.state(), profile());
        assert!(!notifier.has_server_state());
        assert_eq!(*count.lock(), after_first + 1);

        // the baseline can be assigned again after a reset
        assert!(notifier.set_server_state(Profile {
            age: 50,
            ..profile()
        }));
        assert_eq!(notifier.server_state().age, 50);
    }

    #[test]
    fn test_reset_publishes_initial_value() {
        let notifier = Notifier::new(3);
        let last = Rc::new(RefCell::new(None));
        {
            let last = last.clone();
            notifier.subscribe(move |value| *last.borrow_mut() = Some(*value));
        }
        notifier.set_state(9);
        notifier.reset();
        assert_eq!(*last.borrow(), Some(3));
    }

    #[test]
    fn test_update_state_merges_shallowly() {
        let notifier = Notifier::new(profile());
        notifier.update_state(ProfilePatch {
            tags: Some(vec!["poetry".into()]),
            ..Default::default()
        });

        let state = notifier.state();
        assert_eq!(state.name, "ada");
        assert_eq!(state.age, 36);
        assert_eq!(state.tags, vec!["poetry".to_string()]);
    }

    #[test]
    fn test_update_state_on_maps() {
        let notifier = Notifier::new(BTreeMap::from([("a", 1), ("b", 2)]));
        notifier.update_state(BTreeMap::from([("b", 20), ("c", 30)]));
        assert_eq!(
            *notifier.state(),
            BTreeMap::from([("a", 1), ("b", 20), ("c", 30)])
        );
    }

    #[test]
    fn test_update_state_on_hash_maps() {
        let notifier = Notifier::new(HashMap::from([("a", 1)]));
        let before = notifier.state();

        notifier.update_state(HashMap::from([("a", 2), ("b", 3)]));
        assert_eq!(*notifier.state(), HashMap::from([("a", 2), ("b", 3)]));
        assert_eq!(*before, HashMap::from([("a", 1)]));

        notifier.update_state(HashMap::new());
        assert_eq!(*notifier.state(), HashMap::from([("a", 2), ("b", 3)]));
    }

    #[test]
    fn test_set_state_if_changed() {
        let notifier = Notifier::new(profile());
        let count = counting(&notifier);

        assert!(!notifier.set_state_if_changed(profile()));
        assert_eq!(*count.lock(), 0);

        assert!(notifier.set_state_if_changed(Profile {
            name: "grace".into(),
            ..profile()
        }));
        assert_eq!(*count.lock(), 1);
    }

    #[test]
    fn test_subscriber_may_write_again() {
        let notifier = Notifier::new(0);
        {
            let handle = notifier.clone();
            notifier.subscribe(move |value| {
                if *value < 3 {
                    handle.set_state(value + 1);
                }
            });
        }
        notifier.set_state(1);
        assert_eq!(*notifier.state(), 3);
    }

    #[test]
    fn test_read_only_view() {
        let notifier = Notifier::new(5);
        let view = notifier.read_only();
        let count = Rc::new(RefCell::new(0));
        {
            let count = count.clone();
            view.subscribe(move |_| *count.borrow_mut() += 1);
        }

        notifier.set_state(6);
        assert_eq!(*view.state(), 6);
        assert_eq!(view.source_id(), notifier.source_id());

        view.reset();
        assert_eq!(*notifier.state(), 5);
        assert_eq!(*count.borrow(), 2);
    }

    #[test]
    fn test_notifier_identity() {
        let a = Notifier::new(1);
        let b = a.clone();
        let c = Notifier::new(1);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_snapshot_is_stable_until_write() {
        let notifier = Notifier::new(vec![1, 2, 3]);
        assert!(Rc::ptr_eq(&notifier.snapshot(), &notifier.snapshot()));
        let before = notifier.snapshot();
        notifier.set_state(vec![1, 2, 3]);
        assert!(!Rc::ptr_eq(&before, &notifier.snapshot()));
    }
}

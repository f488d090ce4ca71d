//! Keyed side-channel events.

use crate::notifier::Notifier;
use crate::source::{Source, SourceId};
use crate::subject::{Subject, Unsubscribe};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::rc::Rc;

/// Subscribers partitioned by event key.
///
/// Publishing under a key only reaches that key's subscribers.
pub struct EventSubject<K, M> {
    channels: Rc<RefCell<HashMap<K, Subject<M>>>>,
}

impl<K, M> Clone for EventSubject<K, M> {
    fn clone(&self) -> Self {
        Self {
            channels: self.channels.clone(),
        }
    }
}

impl<K, M> Default for EventSubject<K, M> {
    fn default() -> Self {
        Self {
            channels: Rc::new(RefCell::new(HashMap::new())),
        }
    }
}

impl<K: Eq + Hash + Clone + 'static, M: 'static> EventSubject<K, M> {
    /// Create an event subject with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of event keys with at least one subscriber.
    pub fn len(&self) -> usize {
        self.channels.borrow().len()
    }

    /// Whether no event key has subscribers registered.
    pub fn is_empty(&self) -> bool {
        self.channels.borrow().is_empty()
    }

    /// Number of subscribers listening for `event`.
    pub fn subscriber_count(&self, event: &K) -> usize {
        self.channels.borrow().get(event).map_or(0, Subject::len)
    }

    /// Listen for `event`. The returned handle removes the observer from
    /// that event only, and drops the event's channel once it is empty.
    pub fn subscribe(&self, event: K, observer: impl Fn(&M) + 'static) -> Unsubscribe {
        let channel = self
            .channels
            .borrow_mut()
            .entry(event.clone())
            .or_default()
            .clone();
        let inner = channel.subscribe(observer);

        let channels = Rc::downgrade(&self.channels);
        Unsubscribe::new(move || {
            inner.unsubscribe();
            let Some(channels) = channels.upgrade() else {
                return;
            };
            let mut channels = channels.borrow_mut();
            if channels.get(&event).is_some_and(Subject::is_empty) {
                channels.remove(&event);
            }
        })
    }

    /// Deliver `message` to every subscriber of `event`.
    pub fn publish(&self, event: &K, message: &M) {
        let channel = self.channels.borrow().get(event).cloned();
        if let Some(channel) = channel {
            channel.publish(message);
        }
    }
}

impl<K, M> fmt::Debug for EventSubject<K, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSubject")
            .field("events", &self.channels.borrow().len())
            .finish()
    }
}

/// A notifier that also carries discrete, non-state events.
///
/// State changes and events travel on separate channels: emitting an event
/// never publishes state, and writing state never emits an event.
pub struct EventNotifier<S, K, M> {
    notifier: Notifier<S>,
    events: EventSubject<K, M>,
}

impl<S, K, M> Clone for EventNotifier<S, K, M> {
    fn clone(&self) -> Self {
        Self {
            notifier: self.notifier.clone(),
            events: self.events.clone(),
        }
    }
}

impl<S: 'static, K: Eq + Hash + Clone + 'static, M: 'static> EventNotifier<S, K, M> {
    /// Create an event notifier with `initial` state.
    pub fn new(initial: S) -> Self {
        Self {
            notifier: Notifier::new(initial),
            events: EventSubject::new(),
        }
    }

    /// The state container.
    pub fn notifier(&self) -> &Notifier<S> {
        &self.notifier
    }

    /// Listen for `event`.
    pub fn on(&self, event: K, callback: impl Fn(&M) + 'static) -> Unsubscribe {
        self.events.subscribe(event, callback)
    }

    /// Deliver `payload` to the listeners of `event`.
    pub fn emit(&self, event: &K, payload: &M) {
        self.events.publish(event, payload);
    }
}

impl<S: 'static, K, M> Source for EventNotifier<S, K, M> {
    type Value = S;

    fn source_id(&self) -> SourceId {
        self.notifier.source_id()
    }

    fn snapshot(&self) -> Rc<S> {
        self.notifier.state()
    }

    fn server_snapshot(&self) -> Rc<S> {
        self.notifier.server_state()
    }

    fn subscribe(&self, observer: impl Fn(&S) + 'static) -> Unsubscribe {
        self.notifier.subscribe(observer)
    }
}

impl<S: 'static + fmt::Debug, K, M> fmt::Debug for EventNotifier<S, K, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventNotifier")
            .field("notifier", &self.notifier)
            .field("events", &self.events)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum CartEvent {
        ItemAdded,
        ItemRemoved,
    }

    #[test]
    fn test_publish_only_reaches_matching_key() {
        let events: EventSubject<&'static str, u32> = EventSubject::new();
        let added = Rc::new(Cell::new(0));
        let removed = Rc::new(Cell::new(0));

        {
            let added = added.clone();
            events.subscribe("added", move |n| added.set(added.get() + n));
        }
        {
            let removed = removed.clone();
            events.subscribe("removed", move |n| removed.set(removed.get() + n));
        }

        events.publish(&"added", &3);
        events.publish(&"unknown", &100);

        assert_eq!(added.get(), 3);
        assert_eq!(removed.get(), 0);
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn test_unsubscribe_is_scoped_to_key() {
        let events: EventSubject<u8, ()> = EventSubject::new();
        let hits = Rc::new(Cell::new(0));

        let unsubscribe = {
            let hits = hits.clone();
            events.subscribe(1, move |_| hits.set(hits.get() + 1))
        };
        {
            let hits = hits.clone();
            events.subscribe(2, move |_| hits.set(hits.get() + 10));
        }

        unsubscribe.unsubscribe();
        unsubscribe.unsubscribe();
        events.publish(&1, &());
        events.publish(&2, &());

        assert_eq!(hits.get(), 10);
        assert_eq!(events.subscriber_count(&1), 0);
        assert_eq!(events.subscriber_count(&2), 1);
    }

    #[test]
    fn test_empty_channels_are_dropped() {
        let events: EventSubject<u32, ()> = EventSubject::new();

        let handles: Vec<Unsubscribe> = (0..50)
            .map(|key| events.subscribe(key, |_| {}))
            .collect();
        assert_eq!(events.len(), 50);

        for handle in &handles {
            handle.unsubscribe();
        }
        assert_eq!(events.len(), 0);
        assert!(events.is_empty());

        let first = events.subscribe(7, |_| {});
        let _second = events.subscribe(7, |_| {});
        first.unsubscribe();
        assert_eq!(events.len(), 1);
        assert_eq!(events.subscriber_count(&7), 1);

        let hits = Rc::new(Cell::new(0));
        {
            let hits = hits.clone();
            events.subscribe(7, move |_| hits.set(hits.get() + 1));
        }
        events.publish(&7, &());
        assert_eq!(hits.get(), 1);
        assert_eq!(events.subscriber_count(&7), 2);
    }

    #[test]
    fn test_events_and_state_are_independent() {
        let cart: EventNotifier<Vec<String>, CartEvent, String> = EventNotifier::new(Vec::new());
        let state_hits = Rc::new(Cell::new(0));
        let last_added = Rc::new(RefCell::new(String::new()));

        {
            let state_hits = state_hits.clone();
            cart.notifier()
                .subscribe(move |_| state_hits.set(state_hits.get() + 1));
        }
        {
            let last_added = last_added.clone();
            cart.on(CartEvent::ItemAdded, move |item| {
                *last_added.borrow_mut() = item.clone()
            });
        }

        cart.emit(&CartEvent::ItemAdded, &"apple".to_string());
        assert_eq!(state_hits.get(), 0);
        assert_eq!(*last_added.borrow(), "apple");

        cart.notifier().update(|items| items.push("apple".into()));
        cart.emit(&CartEvent::ItemRemoved, &"pear".to_string());
        assert_eq!(state_hits.get(), 1);
        assert_eq!(*last_added.borrow(), "apple");
        assert_eq!(*cart.snapshot(), vec!["apple".to_string()]);
    }
}

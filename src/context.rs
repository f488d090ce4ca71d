//! Integration with GPUI's Context system.
//!
//! Views observe notifiers through a [`Bridge`]; every time the bridge
//! publishes, the owning entity is notified and re-renders.

use crate::bridge::Bridge;
use crate::source::Source;
use futures::channel::mpsc;
use futures::StreamExt;
use gpui::WeakEntity;

/// Extension trait for GPUI Context to observe notifiers.
///
/// # Example
///
/// ```rust,no_run
/// use gpui::*;
/// use notifiers::prelude::*;
///
/// #[derive(Clone, Debug, PartialEq)]
/// struct Cart {
///     items: Vec<String>,
/// }
///
/// struct CartBadge {
///     count: Bridge<usize>,
/// }
///
/// impl CartBadge {
///     fn new(cart: &ReadOnlyNotifier<Cart>, cx: &mut Context<Self>) -> Self {
///         Self {
///             count: cx.observe_notifier_with(cart, |cart: &Cart| cart.items.len()),
///         }
///     }
/// }
/// ```
pub trait NotifierContext {
    /// Observe a whole source and re-render on every change.
    fn observe_notifier<S>(&mut self, source: &S) -> Bridge<S::Value>
    where
        S: Source + Clone + 'static,
        S::Value: PartialEq;

    /// Observe a projection of a source and re-render when it changes.
    fn observe_notifier_with<S, R>(
        &mut self,
        source: &S,
        projection: impl Fn(&S::Value) -> R + 'static,
    ) -> Bridge<R>
    where
        S: Source + Clone + 'static,
        R: PartialEq + 'static;
}

impl<V: 'static> NotifierContext for gpui::Context<'_, V> {
    fn observe_notifier<S>(&mut self, source: &S) -> Bridge<S::Value>
    where
        S: Source + Clone + 'static,
        S::Value: PartialEq,
    {
        let bridge = Bridge::new(source);
        auto_notify(&bridge, self);
        bridge
    }

    fn observe_notifier_with<S, R>(
        &mut self,
        source: &S,
        projection: impl Fn(&S::Value) -> R + 'static,
    ) -> Bridge<R>
    where
        S: Source + Clone + 'static,
        R: PartialEq + 'static,
    {
        let bridge = Bridge::with_projection(source, projection);
        auto_notify(&bridge, self);
        bridge
    }
}

/// Notify the entity behind `cx` whenever `bridge` publishes.
///
/// Bridge callbacks run synchronously inside whatever write caused them, so
/// they only push into a channel. A task spawned on the entity drains it and
/// calls `cx.notify()` on the foreground thread. The subscription is
/// released together with the entity.
pub(crate) fn auto_notify<R, V>(bridge: &Bridge<R>, cx: &mut gpui::Context<V>)
where
    R: 'static,
    V: 'static,
{
    let (tx, mut rx) = mpsc::unbounded::<()>();

    let unsubscribe = bridge.subscribe(move |_| {
        // Ignore errors - if the receiver is dropped, the entity is gone
        let _ = tx.unbounded_send(());
    });

    cx.spawn(
        async move |entity: WeakEntity<V>, cx: &mut gpui::AsyncApp| {
            while let Some(()) = rx.next().await {
                if let Some(entity) = entity.upgrade() {
                    entity
                        .update(cx, |_, cx| {
                            cx.notify();
                        })
                        .ok();
                } else {
                    break;
                }
            }
        },
    )
    .detach();

    cx.on_release(move |_, _| unsubscribe.unsubscribe()).detach();
}

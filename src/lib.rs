//! # Notifiers
//!
//! Observable state containers for UI frameworks that render from external
//! stores.
//!
//! ## Features
//!
//! - **Notifiers**: own one value plus a write-once server baseline for
//!   server rendering and hydration
//! - **Selectors**: derive cached values from notifiers and other selectors,
//!   with dependencies discovered on first read
//! - **Bridges**: expose any source, optionally projected, through a
//!   subscribe/snapshot/server-snapshot contract and only notify when the
//!   projected value changes
//! - **Events**: keyed side-channel notifications next to the state channel
//! - **GPUI integration** (feature `gpui`): views re-render when the
//!   notifiers they observe change
//!
//! ## Example
//!
//! ```rust,no_run
//! use notifiers::prelude::*;
//!
//! #[derive(Clone, Debug, PartialEq)]
//! struct Counter {
//!     count: i32,
//! }
//!
//! let counter = Notifier::new(Counter { count: 0 });
//! let count = observe_with(&counter, |state: &Counter| state.count);
//!
//! count.subscribe(|count| println!("count is now {count}"));
//! counter.set_state(Counter { count: 0 }); // projection unchanged, nothing printed
//! counter.set_state(Counter { count: 1 }); // prints "count is now 1"
//! ```

mod bridge;
mod compare;
#[cfg(feature = "gpui")]
mod context;
mod error;
mod event;
mod notifier;
mod registry;
mod selector;
mod source;
mod subject;

pub use bridge::{
    observe, observe_with, Bridge, ExternalStore, RawSource, RawSourceBuilder, RenderPhase,
};
pub use compare::{deep_compare, Comparator, DeepEqual};
#[cfg(feature = "gpui")]
pub use context::NotifierContext;
pub use error::{Error, Result};
pub use event::{EventNotifier, EventSubject};
pub use notifier::{Merge, Notifier, ReadOnlyNotifier, ServerState};
pub use registry::Registry;
pub use selector::{Getter, Selector};
pub use source::{Source, SourceId};
pub use subject::{Subject, Subscriber, SubscriberId, Unsubscribe};

// Re-export the prelude
pub mod prelude {
    #[cfg(feature = "gpui")]
    pub use crate::NotifierContext;
    pub use crate::{
        observe, observe_with, Bridge, EventNotifier, ExternalStore, Getter, Merge, Notifier,
        ReadOnlyNotifier, Registry, RenderPhase, Selector, Source, Unsubscribe,
    };
}

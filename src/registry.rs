//! An explicit home for shared notifiers.
//!
//! Instead of module-level singletons, applications create one [`Registry`]
//! and pass it to whatever needs shared state. Entries can be keyed by type
//! (one instance per type) or by name, and named projections allow bridges
//! to be assembled from data such as configuration or templates.

use crate::bridge::Bridge;
use crate::error::{Error, Result};
use crate::source::Source;
use std::any::{type_name, Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

#[derive(Default)]
struct RegistryInner {
    globals: HashMap<TypeId, Box<dyn Any>>,
    sources: HashMap<String, Box<dyn Any>>,
    projections: HashMap<String, Box<dyn Any>>,
}

/// Shared context holding notifiers, selectors and projections.
#[derive(Clone, Default)]
pub struct Registry {
    inner: Rc<RefCell<RegistryInner>>,
}

type SharedProjection<I, R> = Rc<dyn Fn(&I) -> R>;

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the single instance of `T`, replacing any previous one.
    pub fn init_global<T: Clone + 'static>(&self, value: T) -> T {
        self.inner
            .borrow_mut()
            .globals
            .insert(TypeId::of::<T>(), Box::new(value.clone()));
        value
    }

    /// The instance of `T`, if one was stored.
    pub fn global<T: Clone + 'static>(&self) -> Option<T> {
        self.inner
            .borrow()
            .globals
            .get(&TypeId::of::<T>())
            .and_then(|value| value.downcast_ref::<T>())
            .cloned()
    }

    /// Store `source` under `name`, replacing any previous entry.
    pub fn register<S: Source + Clone + 'static>(&self, name: impl Into<String>, source: S) {
        let name = name.into();
        tracing::trace!(%name, "source registered");
        self.inner.borrow_mut().sources.insert(name, Box::new(source));
    }

    /// The source stored under `name`.
    ///
    /// Fails with [`Error::InvalidSource`] if nothing is registered under
    /// `name` or the entry is not an `S`.
    pub fn source<S: Source + Clone + 'static>(&self, name: &str) -> Result<S> {
        let inner = self.inner.borrow();
        let entry = inner
            .sources
            .get(name)
            .ok_or_else(|| Error::InvalidSource(format!("no source registered as `{name}`")))?;
        entry.downcast_ref::<S>().cloned().ok_or_else(|| {
            Error::InvalidSource(format!(
                "source `{name}` is not a {}",
                type_name::<S>()
            ))
        })
    }

    /// Store a projection from `I` to `R` under `name`.
    pub fn register_projection<I: 'static, R: 'static>(
        &self,
        name: impl Into<String>,
        projection: impl Fn(&I) -> R + 'static,
    ) {
        let projection: SharedProjection<I, R> = Rc::new(projection);
        self.inner
            .borrow_mut()
            .projections
            .insert(name.into(), Box::new(projection));
    }

    /// Attach a bridge to the source `source` through the projection
    /// `projection`.
    ///
    /// Fails with [`Error::InvalidSource`] for an unknown or mistyped source
    /// and with [`Error::InvalidSelector`] for an unknown projection or one
    /// that does not map `S::Value` to `R`.
    pub fn bridge<S, R>(&self, source: &str, projection: &str) -> Result<Bridge<R>>
    where
        S: Source + Clone + 'static,
        R: PartialEq + 'static,
    {
        let target = self.source::<S>(source)?;
        let projection = self.projection::<S::Value, R>(projection)?;
        Ok(Bridge::with_projection(&target, move |value: &S::Value| {
            projection(value)
        }))
    }

    fn projection<I: 'static, R: 'static>(&self, name: &str) -> Result<SharedProjection<I, R>> {
        let inner = self.inner.borrow();
        let entry = inner.projections.get(name).ok_or_else(|| {
            Error::InvalidSelector(format!("no projection registered as `{name}`"))
        })?;
        entry
            .downcast_ref::<SharedProjection<I, R>>()
            .cloned()
            .ok_or_else(|| {
                Error::InvalidSelector(format!(
                    "projection `{name}` does not map {} to {}",
                    type_name::<I>(),
                    type_name::<R>()
                ))
            })
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        let mut names: Vec<&String> = inner.sources.keys().collect();
        names.sort();
        f.debug_struct("Registry")
            .field("globals", &inner.globals.len())
            .field("sources", &names)
            .field("projections", &inner.projections.len())
            .finish()
    }
}

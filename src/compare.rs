//! Structural equality used to gate notifications.
//!
//! Derived `PartialEq` already compares recursively and field-by-field, and
//! values of different types can never be compared, so it is the natural
//! notion of deep equality here. Comparisons of shared snapshots check
//! pointer identity first.

use std::rc::Rc;

/// Decides whether two values are equal for notification purposes.
pub trait Comparator<T: ?Sized> {
    /// Returns true when `a` and `b` should be treated as the same value.
    fn equals(&self, a: &T, b: &T) -> bool;
}

/// Structural equality via `PartialEq`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeepEqual;

impl<T: PartialEq + ?Sized> Comparator<T> for DeepEqual {
    fn equals(&self, a: &T, b: &T) -> bool {
        deep_compare(a, b)
    }
}

impl<T: ?Sized, F> Comparator<T> for F
where
    F: Fn(&T, &T) -> bool,
{
    fn equals(&self, a: &T, b: &T) -> bool {
        self(a, b)
    }
}

/// Deep structural comparison of two values.
pub fn deep_compare<T: PartialEq + ?Sized>(a: &T, b: &T) -> bool {
    a == b
}

/// Compare two shared values, short-circuiting when they are the same allocation.
pub(crate) fn same_value<T: ?Sized>(
    a: &Rc<T>,
    b: &Rc<T>,
    comparator: &dyn Comparator<T>,
) -> bool {
    Rc::ptr_eq(a, b) || comparator.equals(a, b)
}

/// Type-erased comparator shared by selectors and bridges.
pub(crate) type SharedComparator<T> = Rc<dyn Comparator<T>>;

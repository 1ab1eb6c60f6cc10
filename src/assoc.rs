//! The operation contract every array representation implements.

use std::io;

use crate::dump::{DumpOptions, DumpValue};
use crate::subscript::{Key, OwnedKey, Subscript};

/// Traversal direction.
///
/// The HAT backend yields integer keys in ascending or descending numeric order.
/// Hash-based storage has no key order and walks its table front to back either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Order {
    #[default]
    Ascending,
    Descending,
}

impl Order {
    /// Physical position of the `step`-th visit over `len` slots.
    #[inline]
    pub(crate) fn position(self, step: usize, len: usize) -> usize {
        match self {
            Order::Ascending => step,
            Order::Descending => len - 1 - step,
        }
    }
}

/// Lookup-or-insert, exists, remove, clear, iterate, dump; `Clone` is copy.
///
/// Callers can drive any representation through this trait without knowing which
/// one is active.
pub trait AssocArray<V> {
    type Iter<'a>: Iterator<Item = (Key<'a>, &'a V)>
    where
        Self: 'a,
        V: 'a;

    /// Slot for `sub`, installed with `V::default()` if absent.
    fn lookup(&mut self, sub: Subscript<'_>) -> &mut V
    where
        V: Default;

    /// Slot for `sub` if present. Never allocates.
    fn exists(&self, sub: Subscript<'_>) -> Option<&V>;

    fn exists_mut(&mut self, sub: Subscript<'_>) -> Option<&mut V>;

    /// Removes `sub`; `None` if it was not there.
    fn remove(&mut self, sub: Subscript<'_>) -> Option<V>;

    /// Drops every element and returns to the unallocated state.
    fn clear(&mut self);

    /// Elements across all sub-stores.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Lazy, finite walk. A fresh call starts over.
    fn iter(&self, order: Order) -> Self::Iter<'_>;

    /// One element for delete-while-iterating loops: the caller removes it and asks
    /// again, never assuming where the next call starts.
    fn first_key(&self, order: Order) -> Option<OwnedKey> {
        self.iter(order).next().map(|(k, _)| k.to_owned_key())
    }

    /// Estimated memory footprint in kilobytes.
    fn kilobytes(&self) -> f64;

    /// Read-only diagnostic listing.
    fn dump(&self, out: &mut dyn io::Write, name: &str, opts: &DumpOptions) -> io::Result<()>
    where
        V: DumpValue;
}

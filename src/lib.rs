//! # hat-array
//!
//! Associative arrays for interpreted-language runtimes, tuned for integer subscripts.
//!
//! Small, mostly consecutive integer keys (`a[0]`, `a[1]`, ...) are stored in
//! Hashed Array Trees bucketed by key bit-length, which keeps memory close to a
//! plain vector while tolerating sparse keys. Keys the trees cannot hold cheaply
//! spill to an auxiliary array; non-integer subscripts use a string-keyed table.
//! An array switches representation as elements come and go:
//!
//! ```text
//!   Null --integer--> Cint (HAT) --+-- aux: Int (hash) --+-- aux: Str
//!        --negative-> Int (hash) --+-- aux: Str          |
//!        --string---> Str                                |
//! ```
//!
//! ## Example
//!
//! ```rust
//! use hat_array::{Array, ArrayKind, Order};
//!
//! let mut a: Array<u64> = Array::new();
//! *a.lookup(0) = 10;
//! *a.lookup("1") = 11;
//! *a.lookup("name") = 12;
//!
//! assert_eq!(a.kind(), ArrayKind::Cint);
//! assert_eq!(a.get(1), Some(&11));
//! assert_eq!(a.len(), 3);
//!
//! a.remove(0);
//! a.remove(1);
//! assert_eq!(a.kind(), ArrayKind::Str);
//! assert_eq!(a.first_key(Order::Ascending).unwrap().to_string(), "name");
//! ```

#![deny(unsafe_op_in_unsafe_fn)]

mod assoc;
mod cint;
mod config;
mod dump;
mod hat;
mod int_array;
mod leaf;
mod str_array;
mod subscript;
mod value;
mod xarray;

use std::fmt;
use std::io;

pub use assoc::{AssocArray, Order};
pub use cint::{CintArray, CintIter};
pub use config::{
    ArrayConfig, ConfigError, IntegerBackend, DEFAULT_CHAIN_MAX, DEFAULT_LEAF_EXPONENT,
    MAX_LEAF_EXPONENT, MIN_LEAF_EXPONENT,
};
pub use dump::{DumpOptions, DumpValue};
pub use int_array::{IntArray, IntIter};
pub use str_array::{StrArray, StrIter};
pub use subscript::{classify, Key, KeyClass, OwnedKey, Subscript};
pub use value::{Value, ValueError};
pub use xarray::{XArray, XIter};

// =============================================================================
// Array: representation switching
// =============================================================================

/// Which representation an [`Array`] currently uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayKind {
    /// No elements and no storage.
    Null,
    /// HAT-based integer array.
    Cint,
    /// Bucketed integer hash table.
    Int,
    /// String-keyed table.
    Str,
}

#[derive(Clone)]
enum Repr<V> {
    Null,
    Cint(CintArray<V>),
    Int(IntArray<V>),
    Str(StrArray<V>),
}

macro_rules! dispatch {
    ($repr:expr, $a:ident => $body:expr, null => $null:expr) => {
        match $repr {
            Repr::Null => $null,
            Repr::Cint($a) => $body,
            Repr::Int($a) => $body,
            Repr::Str($a) => $body,
        }
    };
}

/// An associative array that picks its storage from the keys it sees.
///
/// The first key chooses the backend; when the integer part of a backend drains,
/// its auxiliary array takes its place, and an array that loses its last element
/// releases all storage.
#[derive(Clone)]
pub struct Array<V> {
    config: ArrayConfig,
    repr: Repr<V>,
}

impl<V> Array<V> {
    /// An empty array configured from the process environment.
    pub fn new() -> Self {
        Self::with_config(*ArrayConfig::environment())
    }

    pub fn with_config(config: ArrayConfig) -> Self {
        Self {
            config,
            repr: Repr::Null,
        }
    }

    #[inline]
    pub fn config(&self) -> &ArrayConfig {
        &self.config
    }

    pub fn kind(&self) -> ArrayKind {
        match self.repr {
            Repr::Null => ArrayKind::Null,
            Repr::Cint(_) => ArrayKind::Cint,
            Repr::Int(_) => ArrayKind::Int,
            Repr::Str(_) => ArrayKind::Str,
        }
    }

    /// Slot for `key`, installed with `V::default()` if absent.
    pub fn lookup<'k>(&mut self, key: impl Into<Subscript<'k>>) -> &mut V
    where
        V: Default,
    {
        let sub = key.into();
        if let Repr::Null = self.repr {
            self.repr = self.backend_for(sub.classify());
        }
        match &mut self.repr {
            Repr::Cint(a) => a.lookup(sub),
            Repr::Int(a) => a.lookup(sub),
            Repr::Str(a) => a.lookup(sub),
            Repr::Null => unreachable!("backend allocated above"),
        }
    }

    fn backend_for(&self, class: KeyClass) -> Repr<V> {
        let repr = match (class, self.config.integer_backend()) {
            (KeyClass::Integer(_), IntegerBackend::Hat) => {
                Repr::Cint(CintArray::new(&self.config))
            }
            (KeyClass::Opaque, _) => Repr::Str(StrArray::new()),
            _ => Repr::Int(IntArray::new(&self.config)),
        };
        tracing::debug!(?class, "allocating array backend");
        repr
    }

    /// Stores `value` at `key`, returning the previous value if the key existed.
    pub fn insert<'k>(&mut self, key: impl Into<Subscript<'k>>, value: V) -> Option<V>
    where
        V: Default,
    {
        let sub = key.into();
        let existed = self.contains_key(sub);
        let old = std::mem::replace(self.lookup(sub), value);
        existed.then_some(old)
    }

    pub fn get<'k>(&self, key: impl Into<Subscript<'k>>) -> Option<&V> {
        let sub = key.into();
        dispatch!(&self.repr, a => a.exists(sub), null => None)
    }

    pub fn get_mut<'k>(&mut self, key: impl Into<Subscript<'k>>) -> Option<&mut V> {
        let sub = key.into();
        dispatch!(&mut self.repr, a => a.exists_mut(sub), null => None)
    }

    #[inline]
    pub fn contains_key<'k>(&self, key: impl Into<Subscript<'k>>) -> bool {
        self.get(key).is_some()
    }

    pub fn remove<'k>(&mut self, key: impl Into<Subscript<'k>>) -> Option<V> {
        let sub = key.into();
        let value = dispatch!(&mut self.repr, a => a.remove(sub), null => None)?;
        self.settle();
        Some(value)
    }

    /// Swaps in the auxiliary array once the integer part is gone, and drops
    /// storage that no longer holds anything.
    fn settle(&mut self) {
        let next = match &mut self.repr {
            Repr::Cint(a) if a.is_empty() => Some(Repr::Null),
            Repr::Cint(a) => a.take_promotion().map(|x| match x {
                XArray::Int(i) => Repr::Int(i),
                XArray::Str(s) => Repr::Str(s),
            }),
            Repr::Int(a) if a.is_empty() => Some(Repr::Null),
            Repr::Int(a) => a.take_promotion().map(Repr::Str),
            Repr::Str(a) if a.is_empty() => Some(Repr::Null),
            Repr::Str(_) | Repr::Null => None,
        };
        if let Some(next) = next {
            let from = self.kind();
            self.repr = next;
            tracing::debug!(
                ?from,
                to = ?self.kind(),
                len = self.len(),
                "array representation changed"
            );
        }
    }

    /// Drops every element and all storage. Safe to repeat.
    pub fn clear(&mut self) {
        self.repr = Repr::Null;
    }

    pub fn len(&self) -> usize {
        dispatch!(&self.repr, a => a.len(), null => 0)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Elements held by the integer backend proper.
    pub fn integer_len(&self) -> usize {
        match &self.repr {
            Repr::Cint(a) => a.integer_len(),
            Repr::Int(a) => a.integer_len(),
            Repr::Str(_) | Repr::Null => 0,
        }
    }

    /// Leaf slots allocated by the HAT backend (0 for other representations).
    pub fn capacity(&self) -> usize {
        match &self.repr {
            Repr::Cint(a) => a.capacity(),
            _ => 0,
        }
    }

    #[inline]
    pub fn threshold(&self) -> usize {
        self.config.threshold()
    }

    /// Elements in HAT bucket `bucket` (0 for other representations).
    pub fn bucket_len(&self, bucket: usize) -> usize {
        match &self.repr {
            Repr::Cint(a) => a.bucket_len(bucket),
            _ => 0,
        }
    }

    pub fn iter(&self, order: Order) -> Iter<'_, V> {
        let inner = match &self.repr {
            Repr::Null => IterInner::Empty,
            Repr::Cint(a) => IterInner::Cint(a.iter(order)),
            Repr::Int(a) => IterInner::Int(a.iter(order)),
            Repr::Str(a) => IterInner::Str(a.iter(order)),
        };
        Iter { inner }
    }

    pub fn keys(&self, order: Order) -> impl Iterator<Item = Key<'_>> + '_ {
        self.iter(order).map(|(k, _)| k)
    }

    /// One key for delete-while-iterating loops; ask again after each removal.
    pub fn first_key(&self, order: Order) -> Option<OwnedKey> {
        self.iter(order).next().map(|(k, _)| k.to_owned_key())
    }

    pub fn kilobytes(&self) -> f64 {
        dispatch!(&self.repr, a => a.kilobytes(), null => 0.0)
    }

    pub fn dump(&self, out: &mut dyn io::Write, name: &str, opts: &DumpOptions) -> io::Result<()>
    where
        V: DumpValue,
    {
        self.dump_labeled(out, "array", name, opts)
    }

    pub(crate) fn dump_labeled(
        &self,
        out: &mut dyn io::Write,
        label: &str,
        name: &str,
        opts: &DumpOptions,
    ) -> io::Result<()>
    where
        V: DumpValue,
    {
        dump::indent(out, opts.level)?;
        writeln!(out, "{label} `{name}'")?;
        dispatch!(&self.repr, a => a.dump(out, name, opts), null => {
            dump::field(out, opts.level + 1, "array_func", "null_array_func")?;
            dump::field(out, opts.level + 1, "table_size", 0)
        })
    }
}

impl<V> Default for Array<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: fmt::Debug> fmt::Debug for Array<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter(Order::Ascending)).finish()
    }
}

impl<V> AssocArray<V> for Array<V> {
    type Iter<'a>
        = Iter<'a, V>
    where
        V: 'a;

    fn lookup(&mut self, sub: Subscript<'_>) -> &mut V
    where
        V: Default,
    {
        Array::lookup(self, sub)
    }

    fn exists(&self, sub: Subscript<'_>) -> Option<&V> {
        self.get(sub)
    }

    fn exists_mut(&mut self, sub: Subscript<'_>) -> Option<&mut V> {
        self.get_mut(sub)
    }

    fn remove(&mut self, sub: Subscript<'_>) -> Option<V> {
        Array::remove(self, sub)
    }

    fn clear(&mut self) {
        Array::clear(self)
    }

    fn len(&self) -> usize {
        Array::len(self)
    }

    fn iter(&self, order: Order) -> Iter<'_, V> {
        Array::iter(self, order)
    }

    fn kilobytes(&self) -> f64 {
        Array::kilobytes(self)
    }

    fn dump(&self, out: &mut dyn io::Write, name: &str, opts: &DumpOptions) -> io::Result<()>
    where
        V: DumpValue,
    {
        Array::dump(self, out, name, opts)
    }
}

enum IterInner<'a, V> {
    Empty,
    Cint(CintIter<'a, V>),
    Int(IntIter<'a, V>),
    Str(StrIter<'a, V>),
}

/// Element walk over an [`Array`]. Integer keys of the HAT backend come out in
/// the requested order; hash-based storage is walked in table order.
pub struct Iter<'a, V> {
    inner: IterInner<'a, V>,
}

impl<'a, V> Iterator for Iter<'a, V> {
    type Item = (Key<'a>, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.inner {
            IterInner::Empty => None,
            IterInner::Cint(it) => it.next(),
            IterInner::Int(it) => it.next(),
            IterInner::Str(it) => it.next(),
        }
    }
}


#[cfg(test)]
mod proptests;

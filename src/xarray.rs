//! Overflow storage for the HAT backend.
//!
//! Keys the HAT cannot or will not hold land here: negative integers and keys
//! refused by the waste threshold go to a hash table, everything else to the
//! string array. The flavor is fixed by the first key that spills and relaxed to
//! a plain string array once its integer part drains.

use std::io;

use crate::assoc::{AssocArray, Order};
use crate::config::ArrayConfig;
use crate::dump::{DumpOptions, DumpValue};
use crate::int_array::{IntArray, IntIter};
use crate::str_array::{StrArray, StrIter};
use crate::subscript::{Key, KeyClass, Subscript};

#[derive(Clone)]
pub enum XArray<V> {
    Int(IntArray<V>),
    Str(StrArray<V>),
}

impl<V> XArray<V> {
    /// The flavor for a first spilled key of class `class`.
    pub(crate) fn for_class(class: KeyClass, config: &ArrayConfig) -> Self {
        if class.is_integer() {
            XArray::Int(IntArray::new(config))
        } else {
            XArray::Str(StrArray::new())
        }
    }

    /// Integer elements held here.
    pub fn integer_len(&self) -> usize {
        match self {
            XArray::Int(a) => a.integer_len(),
            XArray::Str(_) => 0,
        }
    }

    /// Replaces a hash table without integer elements by its string array.
    pub(crate) fn settle(&mut self) {
        if let XArray::Int(a) = self {
            if a.integer_len() == 0 {
                let strs = a.take_promotion().unwrap_or_default();
                tracing::trace!(len = strs.len(), "overflow array settles to string keys");
                *self = XArray::Str(strs);
            }
        }
    }
}

pub enum XIter<'a, V> {
    Int(IntIter<'a, V>),
    Str(StrIter<'a, V>),
}

impl<'a, V> Iterator for XIter<'a, V> {
    type Item = (Key<'a>, &'a V);

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        match self {
            XIter::Int(it) => it.next(),
            XIter::Str(it) => it.next(),
        }
    }
}

macro_rules! delegate {
    ($self:expr, $a:ident => $body:expr) => {
        match $self {
            XArray::Int($a) => $body,
            XArray::Str($a) => $body,
        }
    };
}

impl<V> AssocArray<V> for XArray<V> {
    type Iter<'a>
        = XIter<'a, V>
    where
        V: 'a;

    fn lookup(&mut self, sub: Subscript<'_>) -> &mut V
    where
        V: Default,
    {
        delegate!(self, a => a.lookup(sub))
    }

    fn exists(&self, sub: Subscript<'_>) -> Option<&V> {
        delegate!(self, a => a.exists(sub))
    }

    fn exists_mut(&mut self, sub: Subscript<'_>) -> Option<&mut V> {
        delegate!(self, a => a.exists_mut(sub))
    }

    fn remove(&mut self, sub: Subscript<'_>) -> Option<V> {
        delegate!(self, a => a.remove(sub))
    }

    fn clear(&mut self) {
        delegate!(self, a => a.clear())
    }

    fn len(&self) -> usize {
        delegate!(self, a => a.len())
    }

    fn iter(&self, order: Order) -> XIter<'_, V> {
        match self {
            XArray::Int(a) => XIter::Int(a.iter(order)),
            XArray::Str(a) => XIter::Str(a.iter(order)),
        }
    }

    fn kilobytes(&self) -> f64 {
        delegate!(self, a => a.kilobytes())
    }

    fn dump(&self, out: &mut dyn io::Write, name: &str, opts: &DumpOptions) -> io::Result<()>
    where
        V: DumpValue,
    {
        delegate!(self, a => a.dump(out, name, opts))
    }
}

//! String-keyed associative array.
//!
//! This is the general-purpose store the integer backends spill into: any
//! subscript is keyed by its textual form, so `5`, `"5"` and a `StrNum` whose
//! text is `"5"` all name the same element.

use std::collections::hash_map;
use std::io;
use std::mem;

use rustc_hash::FxHashMap;

use crate::assoc::{AssocArray, Order};
use crate::dump::{self, DumpOptions, DumpValue};
use crate::subscript::{Key, Subscript};

#[derive(Clone)]
pub struct StrArray<V> {
    map: FxHashMap<Box<str>, V>,
}

impl<V> Default for StrArray<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> StrArray<V> {
    pub fn new() -> Self {
        Self {
            map: FxHashMap::default(),
        }
    }
}

pub struct StrIter<'a, V> {
    inner: hash_map::Iter<'a, Box<str>, V>,
}

impl<'a, V> Iterator for StrIter<'a, V> {
    type Item = (Key<'a>, &'a V);

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(k, v)| (Key::Str(k), v))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<V> AssocArray<V> for StrArray<V> {
    type Iter<'a>
        = StrIter<'a, V>
    where
        V: 'a;

    fn lookup(&mut self, sub: Subscript<'_>) -> &mut V
    where
        V: Default,
    {
        self.map.entry(sub.to_text().into()).or_default()
    }

    fn exists(&self, sub: Subscript<'_>) -> Option<&V> {
        self.map.get(sub.to_text().as_ref())
    }

    fn exists_mut(&mut self, sub: Subscript<'_>) -> Option<&mut V> {
        self.map.get_mut(sub.to_text().as_ref())
    }

    fn remove(&mut self, sub: Subscript<'_>) -> Option<V> {
        self.map.remove(sub.to_text().as_ref())
    }

    fn clear(&mut self) {
        self.map = FxHashMap::default();
    }

    #[inline]
    fn len(&self) -> usize {
        self.map.len()
    }

    fn iter(&self, _order: Order) -> StrIter<'_, V> {
        StrIter {
            inner: self.map.iter(),
        }
    }

    fn kilobytes(&self) -> f64 {
        // hashbrown keeps one control byte per bucket next to each entry.
        let table = self.map.capacity() * (mem::size_of::<(Box<str>, V)>() + 1);
        let keys: usize = self.map.keys().map(|k| k.len()).sum();
        dump::to_kilobytes(table + keys)
    }

    fn dump(&self, out: &mut dyn io::Write, name: &str, opts: &DumpOptions) -> io::Result<()>
    where
        V: DumpValue,
    {
        let level = opts.level + 1;
        dump::field(out, level, "array_func", "str_array_func")?;
        dump::field(out, level, "table_size", self.len())?;
        dump::field(out, level, "memory", format_args!("{:.2} kB (total)", self.kilobytes()))?;
        if opts.elements {
            writeln!(out)?;
            dump::elements(out, name, self.iter(Order::Ascending), &opts.nested())?;
        }
        Ok(())
    }
}

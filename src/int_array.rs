//! Chained hash table for integer subscripts.
//!
//! Buckets hold short chains of two-entry nodes. New entries always go into the
//! chain head; only the head may be partially full, and it is never empty. The
//! table grows through a fixed list of primes once the average chain depth exceeds
//! `chain_max`, and stops growing at the last prime.
//!
//! Negative integers are stored here as well; opaque subscripts go to a private
//! [`StrArray`].

use std::io;
use std::mem;

use crate::assoc::{AssocArray, Order};
use crate::config::ArrayConfig;
use crate::dump::{self, DumpOptions, DumpValue};
use crate::str_array::{StrArray, StrIter};
use crate::subscript::{Key, Subscript};

const CHAIN_WIDTH: usize = 2;

/// Table sizes. Early steps jump by roughly an order of magnitude so rehashing is
/// rare; past 8K the table roughly doubles.
const PRIME_SIZES: [usize; 21] = [
    13, 127, 1021, 8191, 16381, 32749, 65497, 131101, 262147, 524309, 1048583, 2097169, 4194319,
    8388617, 16777259, 33554467, 67108879, 134217757, 268435459, 536870923, 1073741827,
];

/// Longest chain length reported individually in the dump histogram.
const HISTOGRAM_CAP: usize = 31;

/// Final mix of Paul Hsieh's SuperFastHash, reduced to `size`.
#[inline]
pub(crate) fn int_hash(k: i32, size: usize) -> usize {
    let mut h = k as u32;
    h ^= h << 3;
    h = h.wrapping_add(h >> 5);
    h ^= h << 4;
    h = h.wrapping_add(h >> 17);
    h ^= h << 25;
    h = h.wrapping_add(h >> 6);
    h as usize % size
}

/// Next table size after `size`, if any.
#[inline]
fn next_size(size: usize) -> Option<usize> {
    PRIME_SIZES.iter().copied().find(|&s| s > size)
}

type Link<V> = Option<Box<ChainNode<V>>>;

#[derive(Clone)]
struct ChainNode<V> {
    /// Occupied slots form a prefix.
    slots: [Option<(i32, V)>; CHAIN_WIDTH],
    next: Link<V>,
}

impl<V> ChainNode<V> {
    fn with_next(next: Link<V>) -> Self {
        Self {
            slots: [None, None],
            next,
        }
    }

    #[inline]
    fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    #[inline]
    fn is_full(&self) -> bool {
        self.slots[CHAIN_WIDTH - 1].is_some()
    }

    #[inline]
    fn is_empty(&self) -> bool {
        self.slots[0].is_none()
    }

    #[inline]
    fn position(&self, k: i32) -> Option<usize> {
        self.slots
            .iter()
            .position(|s| matches!(s, Some((key, _)) if *key == k))
    }

    fn push(&mut self, k: i32, value: V) -> &mut V {
        debug_assert!(!self.is_full());
        let j = self.len();
        &mut self.slots[j].insert((k, value)).1
    }

    /// Takes `k` out of this node, shifting the second entry down if needed.
    fn take(&mut self, k: i32) -> Option<V> {
        let j = self.position(k)?;
        let (_, value) = self.slots[j].take()?;
        if j == 0 {
            self.slots[0] = self.slots[1].take();
        }
        Some(value)
    }

    /// Removes `k` from a non-head node in the chain at `link`.
    ///
    /// Non-head nodes are full, so a removal leaves one entry behind; the head's
    /// last entry (`donor`) moves in to keep the node full.
    fn remove_below(
        link: &mut Link<V>,
        k: i32,
        donor: &mut [Option<(i32, V)>; CHAIN_WIDTH],
    ) -> Option<V> {
        let node = link.as_mut()?;
        let Some(value) = node.take(k) else {
            return Self::remove_below(&mut node.next, k, donor);
        };
        if node.is_empty() {
            let next = node.next.take();
            *link = next;
        } else {
            node.slots[1] = donor[1].take().or_else(|| donor[0].take());
        }
        Some(value)
    }
}

#[derive(Clone)]
pub struct IntArray<V> {
    buckets: Vec<Link<V>>,
    /// Integer elements; the string array counts its own.
    count: usize,
    maxed: bool,
    chain_max: usize,
    xarray: Option<Box<StrArray<V>>>,
}

impl<V> IntArray<V> {
    pub fn new(config: &ArrayConfig) -> Self {
        Self {
            buckets: Vec::new(),
            count: 0,
            maxed: false,
            chain_max: config.chain_max(),
            xarray: None,
        }
    }

    /// Elements stored in the hash table proper.
    #[inline]
    pub fn integer_len(&self) -> usize {
        self.count
    }

    /// Current number of hash buckets (0 while unallocated).
    #[inline]
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    #[inline]
    pub fn is_maxed(&self) -> bool {
        self.maxed
    }

    pub(crate) fn xarray(&self) -> Option<&StrArray<V>> {
        self.xarray.as_deref()
    }

    /// Hands over the string array once no integer element is left.
    pub(crate) fn take_promotion(&mut self) -> Option<StrArray<V>> {
        if self.count == 0 {
            self.xarray.take().map(|x| *x)
        } else {
            None
        }
    }

    fn find(&self, h: usize, k: i32) -> Option<&V> {
        let mut cur = self.buckets[h].as_deref();
        while let Some(node) = cur {
            if let Some(j) = node.position(k) {
                return node.slots[j].as_ref().map(|(_, v)| v);
            }
            cur = node.next.as_deref();
        }
        None
    }

    fn find_mut(&mut self, h: usize, k: i32) -> Option<&mut V> {
        let mut cur = self.buckets[h].as_deref_mut();
        while let Some(node) = cur {
            if let Some(j) = node.position(k) {
                return node.slots[j].as_mut().map(|(_, v)| v);
            }
            cur = node.next.as_deref_mut();
        }
        None
    }

    /// Installs `k` into the chain head of bucket `h`, adding a new head if the
    /// current one is full.
    fn insert(&mut self, h: usize, k: i32, value: V) -> &mut V {
        let link = &mut self.buckets[h];
        let head = match link.take() {
            Some(node) if !node.is_full() => link.insert(node),
            next => link.insert(Box::new(ChainNode::with_next(next))),
        };
        head.push(k, value)
    }

    fn grow(&mut self) {
        let old_size = self.buckets.len();
        let Some(new_size) = next_size(old_size) else {
            tracing::debug!(size = old_size, "integer hash table maxed out");
            self.maxed = true;
            return;
        };

        let old = mem::replace(&mut self.buckets, (0..new_size).map(|_| None).collect());
        if old_size > 0 {
            tracing::debug!(
                from = old_size,
                to = new_size,
                count = self.count,
                "growing integer hash table"
            );
        }
        for mut chain in old {
            while let Some(mut node) = chain {
                chain = node.next.take();
                for (k, v) in node.slots.into_iter().flatten() {
                    self.insert(int_hash(k, new_size), k, v);
                }
            }
        }
    }

    pub(crate) fn lookup_int(&mut self, k: i32) -> &mut V
    where
        V: Default,
    {
        if self.buckets.is_empty() {
            self.grow();
        }
        let mut h = int_hash(k, self.buckets.len());
        if self.find(h, k).is_some() {
            return self.find_mut(h, k).expect("entry located by find");
        }

        self.count += 1;
        if !self.maxed && self.count / self.buckets.len() > self.chain_max {
            self.grow();
            h = int_hash(k, self.buckets.len());
        }
        self.insert(h, k, V::default())
    }

    pub(crate) fn get_int(&self, k: i32) -> Option<&V> {
        if self.buckets.is_empty() {
            return None;
        }
        self.find(int_hash(k, self.buckets.len()), k)
    }

    pub(crate) fn get_int_mut(&mut self, k: i32) -> Option<&mut V> {
        if self.buckets.is_empty() {
            return None;
        }
        let h = int_hash(k, self.buckets.len());
        self.find_mut(h, k)
    }

    pub(crate) fn remove_int(&mut self, k: i32) -> Option<V> {
        if self.buckets.is_empty() {
            return None;
        }
        let h = int_hash(k, self.buckets.len());
        let link = &mut self.buckets[h];
        let head = link.as_mut()?;
        let value = match head.take(k) {
            Some(v) => v,
            None => {
                let ChainNode { slots, next } = &mut **head;
                ChainNode::remove_below(next, k, slots)?
            }
        };
        if head.is_empty() {
            let next = head.next.take();
            *link = next;
        }

        self.count -= 1;
        if self.count == 0 && self.xarray.is_none() {
            self.buckets = Vec::new();
            self.maxed = false;
        }
        Some(value)
    }

    /// Chain length (in elements) of every bucket.
    fn chain_lengths(&self) -> impl Iterator<Item = usize> + '_ {
        self.buckets.iter().map(|head| {
            let mut n = 0;
            let mut cur = head.as_deref();
            while let Some(node) = cur {
                n += node.len();
                cur = node.next.as_deref();
            }
            n
        })
    }

    fn chain_nodes(&self) -> usize {
        self.buckets
            .iter()
            .map(|head| {
                let mut n = 0;
                let mut cur = head.as_deref();
                while let Some(node) = cur {
                    n += 1;
                    cur = node.next.as_deref();
                }
                n
            })
            .sum()
    }

    /// Checks chain shape and counts.
    #[cfg(test)]
    pub(crate) fn validate(&self) {
        let mut total = 0;
        for head in &self.buckets {
            let mut cur = head.as_deref();
            let mut first = true;
            while let Some(node) = cur {
                assert!(!node.is_empty(), "chain node must not be empty");
                if !first {
                    assert!(node.is_full(), "only the chain head may be partial");
                }
                total += node.len();
                first = false;
                cur = node.next.as_deref();
            }
        }
        assert_eq!(total, self.count);
        if let Some(x) = &self.xarray {
            assert!(!x.is_empty(), "empty string array kept alive");
        } else if self.count == 0 {
            assert!(self.buckets.is_empty(), "empty table kept allocated");
        }
    }
}

// =============================================================================
// Iteration
// =============================================================================

/// Table-order walk: the string array first, then every bucket chain.
pub struct IntIter<'a, V> {
    xarray: Option<StrIter<'a, V>>,
    buckets: std::slice::Iter<'a, Link<V>>,
    node: Option<&'a ChainNode<V>>,
    slot: usize,
}

impl<'a, V> Iterator for IntIter<'a, V> {
    type Item = (Key<'a>, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(x) = self.xarray.as_mut() {
            if let Some(entry) = x.next() {
                return Some(entry);
            }
            self.xarray = None;
        }
        loop {
            if let Some(node) = self.node {
                if let Some(Some((k, v))) = node.slots.get(self.slot) {
                    self.slot += 1;
                    return Some((Key::Int(i64::from(*k)), v));
                }
                self.node = node.next.as_deref();
                self.slot = 0;
                continue;
            }
            self.node = self.buckets.next()?.as_deref();
            self.slot = 0;
        }
    }
}

impl<V> AssocArray<V> for IntArray<V> {
    type Iter<'a>
        = IntIter<'a, V>
    where
        V: 'a;

    fn lookup(&mut self, sub: Subscript<'_>) -> &mut V
    where
        V: Default,
    {
        match sub.classify().as_i32() {
            Some(k) => self.lookup_int(k),
            None => self.xarray.get_or_insert_with(Default::default).lookup(sub),
        }
    }

    fn exists(&self, sub: Subscript<'_>) -> Option<&V> {
        match sub.classify().as_i32() {
            Some(k) => self.get_int(k),
            None => self.xarray.as_ref()?.exists(sub),
        }
    }

    fn exists_mut(&mut self, sub: Subscript<'_>) -> Option<&mut V> {
        match sub.classify().as_i32() {
            Some(k) => self.get_int_mut(k),
            None => self.xarray.as_mut()?.exists_mut(sub),
        }
    }

    fn remove(&mut self, sub: Subscript<'_>) -> Option<V> {
        match sub.classify().as_i32() {
            Some(k) => self.remove_int(k),
            None => {
                let x = self.xarray.as_mut()?;
                let value = x.remove(sub)?;
                if x.is_empty() {
                    self.xarray = None;
                    if self.count == 0 {
                        self.buckets = Vec::new();
                        self.maxed = false;
                    }
                }
                Some(value)
            }
        }
    }

    fn clear(&mut self) {
        self.buckets = Vec::new();
        self.count = 0;
        self.maxed = false;
        self.xarray = None;
    }

    #[inline]
    fn len(&self) -> usize {
        self.count + self.xarray.as_ref().map_or(0, |x| x.len())
    }

    fn iter(&self, order: Order) -> IntIter<'_, V> {
        IntIter {
            xarray: self.xarray.as_ref().map(|x| x.iter(order)),
            buckets: self.buckets.iter(),
            node: None,
            slot: 0,
        }
    }

    fn kilobytes(&self) -> f64 {
        let bytes = self.chain_nodes() * mem::size_of::<ChainNode<V>>()
            + self.buckets.len() * mem::size_of::<Link<V>>();
        dump::to_kilobytes(bytes) + self.xarray.as_ref().map_or(0.0, |x| x.kilobytes())
    }

    fn dump(&self, out: &mut dyn io::Write, name: &str, opts: &DumpOptions) -> io::Result<()>
    where
        V: DumpValue,
    {
        let level = opts.level + 1;
        let xsize = self.xarray.as_ref().map_or(0, |x| x.len());
        dump::field(out, level, "array_func", "int_array_func")?;
        dump::field(out, level, "INT_CHAIN_MAX", self.chain_max)?;
        dump::field(out, level, "array_size", format_args!("{} (int)", self.buckets.len()))?;
        dump::field(
            out,
            level,
            "table_size",
            format_args!("{} (total), {} (int), {} (str)", self.len(), self.count, xsize),
        )?;
        let avg = if self.buckets.is_empty() {
            0.0
        } else {
            self.count as f64 / self.buckets.len() as f64
        };
        dump::field(out, level, "Avg # of items per chain (int)", format_args!("{avg:.2}"))?;
        dump::field(out, level, "memory", format_args!("{:.2} kB (total)", self.kilobytes()))?;

        let mut histogram = [0usize; HISTOGRAM_CAP + 1];
        for n in self.chain_lengths() {
            histogram[n.min(HISTOGRAM_CAP)] += 1;
        }
        dump::indent(out, level)?;
        writeln!(out, "Hash distribution:")?;
        for (n, &buckets) in histogram.iter().enumerate().filter(|&(_, &b)| b > 0) {
            dump::indent(out, level + 1)?;
            if n == HISTOGRAM_CAP {
                writeln!(out, "[>={HISTOGRAM_CAP}]:{buckets}")?;
            } else {
                writeln!(out, "[{n}]:{buckets}")?;
            }
        }

        if opts.elements {
            writeln!(out)?;
            let ints = IntIter {
                xarray: None,
                buckets: self.buckets.iter(),
                node: None,
                slot: 0,
            };
            dump::elements(out, name, ints, &opts.nested())?;
        }
        if let Some(x) = &self.xarray {
            writeln!(out)?;
            x.dump(out, name, opts)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn table() -> IntArray<i64> {
        IntArray::new(&ArrayConfig::default())
    }

    #[test]
    fn hash_is_reduced() {
        for k in [-5, 0, 1, 12345, i32::MAX, i32::MIN] {
            assert!(int_hash(k, 13) < 13);
        }
        assert_eq!(int_hash(0, 13), 0);
    }

    #[test]
    fn lookup_insert_and_find() {
        let mut t = table();
        for k in -50..50 {
            *t.lookup(Subscript::from(k)) = i64::from(k) * 2;
        }
        assert_eq!(t.len(), 100);
        for k in -50..50 {
            assert_eq!(t.exists(Subscript::from(k)), Some(&(i64::from(k) * 2)));
        }
        assert_eq!(t.exists(Subscript::from(50)), None);
        t.validate();
    }

    #[test]
    fn grows_through_primes() {
        let mut t = table();
        t.lookup(Subscript::from(1));
        assert_eq!(t.bucket_count(), 13);
        // Growth triggers once count / 13 > 2, i.e. on the 39th element.
        for k in 2..=38 {
            t.lookup(Subscript::from(k));
        }
        assert_eq!(t.bucket_count(), 13);
        t.lookup(Subscript::from(39));
        assert_eq!(t.bucket_count(), 127);
        for k in 1..=39 {
            assert!(t.exists(Subscript::from(k)).is_some(), "lost {k} in rehash");
        }
        t.validate();
    }

    #[test]
    fn sizes_stop_at_last_prime() {
        assert_eq!(next_size(0), Some(13));
        assert_eq!(next_size(13), Some(127));
        assert_eq!(next_size(536870923), Some(1073741827));
        assert_eq!(next_size(1073741827), None);
    }

    #[test]
    fn head_is_never_hollow() {
        // Keys colliding in bucket 0 of a 13-bucket table.
        let keys: Vec<i32> = (0..10_000).filter(|&k| int_hash(k, 13) == 0).take(5).collect();
        assert_eq!(keys.len(), 5);

        let mut t = table();
        for &k in &keys {
            *t.lookup(Subscript::from(k)) = i64::from(k);
        }
        assert_eq!(t.bucket_count(), 13);
        t.validate();

        // Remove from the tail node: the head donates its last entry.
        assert_eq!(t.remove(Subscript::from(keys[0])), Some(i64::from(keys[0])));
        t.validate();
        // Remove from the head until it empties and the next node takes over.
        assert_eq!(t.remove(Subscript::from(keys[4])), Some(i64::from(keys[4])));
        t.validate();
        for &k in &keys[1..4] {
            assert_eq!(t.exists(Subscript::from(k)), Some(&i64::from(k)));
        }
        for &k in &keys[1..4] {
            assert!(t.remove(Subscript::from(k)).is_some());
            t.validate();
        }
        assert!(t.is_empty());
        assert_eq!(t.bucket_count(), 0);
    }

    #[test]
    fn opaque_keys_use_string_array() {
        let mut t = table();
        *t.lookup(Subscript::from(3)) = 3;
        *t.lookup(Subscript::from("x")) = 9;
        *t.lookup(Subscript::from("03")) = 7;
        assert_eq!(t.len(), 3);
        assert_eq!(t.integer_len(), 1);
        assert_eq!(t.xarray().map(|x| x.len()), Some(2));
        assert_eq!(t.exists(Subscript::from("3")), Some(&3));
        assert_eq!(t.exists(Subscript::from("03")), Some(&7));

        assert_eq!(t.take_promotion().map(|x| x.len()), None);
        assert_eq!(t.remove(Subscript::from(3)), Some(3));
        let promoted = t.take_promotion().expect("string array should be promoted");
        assert_eq!(promoted.len(), 2);
        assert_eq!(promoted.exists(Subscript::from("x")), Some(&9));
    }

    #[test]
    fn iter_visits_everything() {
        let mut t = table();
        for k in 0..100 {
            *t.lookup(Subscript::from(k)) = i64::from(k);
        }
        t.lookup(Subscript::from("s"));
        let mut keys: Vec<String> = t.iter(Order::Ascending).map(|(k, _)| k.to_string()).collect();
        assert_eq!(keys[0], "s");
        keys.sort();
        assert_eq!(keys.len(), 101);
        assert_eq!(t.first_key(Order::Ascending).map(|k| k.to_string()), Some("s".to_string()));
    }

    #[test]
    fn clone_is_deep() {
        let mut t = table();
        for k in 0..40 {
            *t.lookup(Subscript::from(k)) = i64::from(k);
        }
        let mut c = t.clone();
        *c.lookup(Subscript::from(0)) = 100;
        c.remove(Subscript::from(1));
        assert_eq!(t.exists(Subscript::from(0)), Some(&0));
        assert_eq!(t.exists(Subscript::from(1)), Some(&1));
        assert_eq!(c.len(), 39);
        c.validate();
    }

    #[test]
    fn dump_reports_distribution() {
        let mut t = table();
        for k in 0..5 {
            *t.lookup(Subscript::from(k)) = i64::from(k);
        }
        let mut out = Vec::new();
        t.dump(&mut out, "a", &DumpOptions::full()).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("array_func: int_array_func"));
        assert!(text.contains("table_size: 5 (total), 5 (int), 0 (str)"));
        assert!(text.contains("Hash distribution:"));
        assert!(text.contains("a[3] = 3"));
    }
}

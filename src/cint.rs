//! Integer-keyed tree array: HATs bucketed by key bit-length.
//!
//! Keys below `2^NHAT` share bucket `NHAT`; a larger key `k` lives in bucket
//! `1 + floor(log2 k)`, whose HAT covers `[2^(b-1), 2^b)`:
//!
//! ```text
//!   bucket NHAT  [0, 2^NHAT)
//!   bucket NHAT+1 [2^NHAT, 2^(NHAT+1))
//!   ...
//!   bucket 31    [2^30, 2^31)
//! ```
//!
//! Each insert first estimates how many leaf slots the tree would own afterwards.
//! If the unused slots would exceed the threshold, the key goes to the auxiliary
//! array instead, as do negative and non-integer subscripts.

use std::io;
use std::mem;

use crate::assoc::{AssocArray, Order};
use crate::config::ArrayConfig;
use crate::dump::{self, DumpOptions, DumpValue};
use crate::hat::{HatIter, HatNode};
use crate::subscript::{Key, KeyClass, Subscript};
use crate::xarray::{XArray, XIter};

/// Top-level buckets: one per possible bit-length of a 32-bit key.
const TOP_SIZE: usize = 32;

/// Bucket holding `k`.
#[inline]
pub(crate) fn bucket_of(k: u32, nhat: u32) -> usize {
    if k < (1 << nhat) {
        nhat as usize
    } else {
        (u32::BITS - k.leading_zeros()) as usize
    }
}

/// Upper bound on the leaf that an insert into a HAT covering `2^m` keys allocates.
///
/// This is an estimate: it halves the exponent until it drops below `nhat`, which
/// is not always the leaf size the tree ends up allocating.
#[inline]
pub(crate) fn leaf_estimate(m: u32, nhat: u32) -> usize {
    let mut li = m.max(nhat);
    while li >= nhat {
        li = (li + 1) / 2;
    }
    1usize << li
}

#[derive(Clone)]
pub struct CintArray<V> {
    config: ArrayConfig,
    /// `TOP_SIZE` slots once allocated; slots below `nhat` stay empty.
    top: Vec<Option<HatNode<V>>>,
    /// Elements in the trees.
    count: usize,
    /// Sum of allocated leaf sizes.
    capacity: usize,
    xarray: Option<Box<XArray<V>>>,
}

impl<V> CintArray<V> {
    pub fn new(config: &ArrayConfig) -> Self {
        Self {
            config: *config,
            top: Vec::new(),
            count: 0,
            capacity: 0,
            xarray: None,
        }
    }

    #[inline]
    fn nhat(&self) -> u32 {
        self.config.leaf_exponent()
    }

    /// Elements stored in the trees, excluding the auxiliary array.
    #[inline]
    pub fn integer_len(&self) -> usize {
        self.count
    }

    /// Leaf slots currently allocated.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn threshold(&self) -> usize {
        self.config.threshold()
    }

    /// Elements in the HAT of `bucket`.
    pub fn bucket_len(&self, bucket: usize) -> usize {
        self.top
            .get(bucket)
            .and_then(Option::as_ref)
            .map_or(0, HatNode::len)
    }

    pub fn xarray(&self) -> Option<&XArray<V>> {
        self.xarray.as_deref()
    }

    /// Whether installing a new key into `bucket` keeps the unused slots within
    /// the threshold.
    fn within_threshold(&self, bucket: usize) -> bool {
        let m = bucket as u32 - 1;
        let estimate = self.capacity + leaf_estimate(m, self.nhat());
        debug_assert!(estimate >= self.count);
        estimate - self.count <= self.threshold()
    }

    fn find(&self, k: u32) -> Option<&V> {
        let bucket = bucket_of(k, self.nhat());
        self.top.get(bucket)?.as_ref()?.get(k)
    }

    fn find_mut(&mut self, k: u32) -> Option<&mut V> {
        let bucket = bucket_of(k, self.nhat());
        self.top.get_mut(bucket)?.as_mut()?.get_mut(k)
    }

    fn tree_lookup(&mut self, k: u32, bucket: usize) -> &mut V
    where
        V: Default,
    {
        let nhat = self.nhat();
        if self.top.is_empty() {
            self.capacity = 0;
            self.top = (0..TOP_SIZE).map(|_| None).collect();
        }
        let root = self.top[bucket].get_or_insert_with(|| {
            let m = bucket as u32 - 1;
            if m < nhat {
                HatNode::new(nhat, 0)
            } else {
                HatNode::new(m, 1 << m)
            }
        });
        let (slot, inserted) = root.lookup(k, nhat, &mut self.capacity);
        debug_assert!(inserted);
        self.count += 1;
        slot
    }

    fn xinstall(&mut self, class: KeyClass, sub: Subscript<'_>) -> &mut V
    where
        V: Default,
    {
        let config = self.config;
        let x = self.xarray.get_or_insert_with(|| {
            tracing::trace!(?class, "creating auxiliary array");
            Box::new(XArray::for_class(class, &config))
        });
        x.lookup(sub)
    }

    fn remove_int(&mut self, k: u32) -> Option<V> {
        let bucket = bucket_of(k, self.nhat());
        let root = self.top.get_mut(bucket)?.as_mut()?;
        let value = root.remove(k, &mut self.capacity)?;
        if root.is_empty() {
            self.top[bucket] = None;
        }
        self.count -= 1;
        if self.count == 0 && self.xarray.is_none() {
            self.reset();
        }
        Some(value)
    }

    fn xremove(&mut self, sub: Subscript<'_>) -> Option<V> {
        let x = self.xarray.as_mut()?;
        let value = x.remove(sub)?;
        if x.is_empty() {
            self.xarray = None;
            if self.count == 0 {
                self.reset();
            }
        } else {
            x.settle();
        }
        Some(value)
    }

    fn reset(&mut self) {
        debug_assert_eq!(self.count, 0);
        self.top = Vec::new();
        self.capacity = 0;
    }

    /// Hands over the auxiliary array once the trees are empty.
    pub(crate) fn take_promotion(&mut self) -> Option<XArray<V>> {
        if self.count > 0 {
            return None;
        }
        self.reset();
        self.xarray.take().map(|x| *x)
    }

    /// Checks tree shape, counts and the capacity estimate.
    #[cfg(test)]
    pub(crate) fn validate(&self) {
        let nhat = self.nhat();
        let mut count = 0;
        let mut capacity = 0;
        for (bucket, root) in self.roots() {
            assert!(bucket >= nhat as usize, "bucket {bucket} below NHAT");
            assert!(!root.is_empty(), "empty bucket {bucket} kept alive");
            capacity += root.validate(nhat);
            count += root.len();
            for (k, _) in root.iter(Order::Ascending) {
                assert_eq!(bucket_of(k, nhat), bucket, "key {k} in wrong bucket");
            }
        }
        assert_eq!(count, self.count);
        assert_eq!(capacity, self.capacity, "capacity must equal allocated leaf slots");
        if let Some(x) = self.xarray.as_deref() {
            assert!(!x.is_empty(), "empty auxiliary array kept alive");
            if let XArray::Int(a) = x {
                assert!(a.integer_len() > 0, "integer auxiliary array without integers");
                a.validate();
            }
        } else if self.count == 0 {
            assert!(self.top.is_empty(), "empty array kept allocated");
        }
    }

    fn roots(&self) -> impl Iterator<Item = (usize, &HatNode<V>)> + '_ {
        self.top
            .iter()
            .enumerate()
            .filter_map(|(b, root)| root.as_ref().map(|r| (b, r)))
    }
}

// =============================================================================
// Iteration
// =============================================================================

/// Auxiliary array first, then every bucket in the requested order.
pub struct CintIter<'a, V> {
    xarray: Option<XIter<'a, V>>,
    top: &'a [Option<HatNode<V>>],
    first: usize,
    step: usize,
    order: Order,
    current: Option<HatIter<'a, V>>,
}

impl<'a, V> CintIter<'a, V> {
    fn next_tree(&mut self) -> Option<HatIter<'a, V>> {
        let top = self.top;
        let len = top.len().saturating_sub(self.first);
        while self.step < len {
            let pos = self.first + self.order.position(self.step, len);
            self.step += 1;
            if let Some(root) = &top[pos] {
                return Some(root.iter(self.order));
            }
        }
        None
    }
}

impl<'a, V> Iterator for CintIter<'a, V> {
    type Item = (Key<'a>, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(x) = self.xarray.as_mut() {
            if let Some(entry) = x.next() {
                return Some(entry);
            }
            self.xarray = None;
        }
        loop {
            if let Some(tree) = self.current.as_mut() {
                if let Some((k, v)) = tree.next() {
                    return Some((Key::Int(i64::from(k)), v));
                }
            }
            self.current = Some(self.next_tree()?);
        }
    }
}

impl<V> AssocArray<V> for CintArray<V> {
    type Iter<'a>
        = CintIter<'a, V>
    where
        V: 'a;

    fn lookup(&mut self, sub: Subscript<'_>) -> &mut V
    where
        V: Default,
    {
        let class = sub.classify();
        let bucket = match class {
            KeyClass::Integer(k) => {
                if self.find(k).is_some() {
                    return self.find_mut(k).expect("key located by find");
                }
                Some(bucket_of(k, self.nhat()))
            }
            _ => None,
        };
        if self.xarray.as_ref().is_some_and(|x| x.exists(sub).is_some()) {
            return self
                .xarray
                .as_mut()
                .and_then(|x| x.exists_mut(sub))
                .expect("key located in auxiliary array");
        }

        match (class, bucket) {
            (KeyClass::Integer(k), Some(b)) if self.within_threshold(b) => self.tree_lookup(k, b),
            (KeyClass::Integer(k), _) => {
                tracing::trace!(
                    key = k,
                    capacity = self.capacity,
                    count = self.count,
                    "waste threshold reached, spilling to auxiliary array"
                );
                self.xinstall(class, sub)
            }
            _ => self.xinstall(class, sub),
        }
    }

    fn exists(&self, sub: Subscript<'_>) -> Option<&V> {
        if let KeyClass::Integer(k) = sub.classify() {
            if let Some(v) = self.find(k) {
                return Some(v);
            }
        }
        self.xarray.as_ref()?.exists(sub)
    }

    fn exists_mut(&mut self, sub: Subscript<'_>) -> Option<&mut V> {
        if let KeyClass::Integer(k) = sub.classify() {
            if self.find(k).is_some() {
                return self.find_mut(k);
            }
        }
        self.xarray.as_mut()?.exists_mut(sub)
    }

    fn remove(&mut self, sub: Subscript<'_>) -> Option<V> {
        if let KeyClass::Integer(k) = sub.classify() {
            if let Some(value) = self.remove_int(k) {
                return Some(value);
            }
        }
        self.xremove(sub)
    }

    fn clear(&mut self) {
        self.top = Vec::new();
        self.count = 0;
        self.capacity = 0;
        self.xarray = None;
    }

    #[inline]
    fn len(&self) -> usize {
        self.count + self.xarray.as_ref().map_or(0, |x| x.len())
    }

    fn iter(&self, order: Order) -> CintIter<'_, V> {
        CintIter {
            xarray: self.xarray.as_ref().map(|x| x.iter(order)),
            top: &self.top,
            first: self.nhat() as usize,
            step: 0,
            order,
            current: None,
        }
    }

    fn kilobytes(&self) -> f64 {
        let mut bytes = self.top.len() * mem::size_of::<Option<HatNode<V>>>();
        for (_, root) in self.roots() {
            bytes += root.overhead_bytes();
        }
        bytes += self.capacity * mem::size_of::<Option<V>>();
        dump::to_kilobytes(bytes) + self.xarray.as_ref().map_or(0.0, |x| x.kilobytes())
    }

    fn dump(&self, out: &mut dyn io::Write, name: &str, opts: &DumpOptions) -> io::Result<()>
    where
        V: DumpValue,
    {
        let level = opts.level + 1;
        let xsize = self.xarray.as_ref().map_or(0, |x| x.len());
        dump::field(out, level, "array_func", "cint_array_func")?;
        dump::field(out, level, "NHAT", self.nhat())?;
        dump::field(out, level, "THRESHOLD", self.threshold())?;
        dump::field(
            out,
            level,
            "table_size",
            format_args!("{} (total), {} (cint), {} (int + str)", self.len(), self.count, xsize),
        )?;
        dump::field(out, level, "array_capacity", self.capacity)?;
        let load = if self.capacity == 0 {
            0.0
        } else {
            self.count as f64 / self.capacity as f64
        };
        dump::field(out, level, "Load Factor", format_args!("{load:.2}"))?;
        dump::field(out, level, "memory", format_args!("{:.2} kB (total)", self.kilobytes()))?;

        if opts.elements {
            let nested = opts.nested();
            for (bucket, root) in self.roots() {
                writeln!(out)?;
                dump::indent(out, level)?;
                writeln!(
                    out,
                    "bucket {bucket}: base {}, array_size {}{}, {} elements",
                    root.base(),
                    root.array_size(),
                    if root.is_half() { " (half)" } else { "" },
                    root.len()
                )?;
                let entries = root
                    .iter(Order::Ascending)
                    .map(|(k, v)| (Key::Int(i64::from(k)), v));
                dump::elements(out, name, entries, &nested)?;
            }
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

    fn cint() -> CintArray<i64> {
        CintArray::new(&ArrayConfig::default())
    }

    #[test]
    fn buckets_by_bit_length() {
        assert_eq!(bucket_of(0, 10), 10);
        assert_eq!(bucket_of(1023, 10), 10);
        assert_eq!(bucket_of(1024, 10), 11);
        assert_eq!(bucket_of(2047, 10), 11);
        assert_eq!(bucket_of(1_000_000, 10), 20);
        assert_eq!(bucket_of(i32::MAX as u32, 10), 31);
        assert_eq!(bucket_of(3, 2), 2);
        assert_eq!(bucket_of(4, 2), 3);
    }

    #[test]
    fn estimates_halve_below_nhat() {
        assert_eq!(leaf_estimate(9, 10), 32);
        assert_eq!(leaf_estimate(10, 10), 32);
        assert_eq!(leaf_estimate(19, 10), 32);
        assert_eq!(leaf_estimate(20, 10), 32);
        assert_eq!(leaf_estimate(30, 10), 256);
    }

    #[test]
    fn sequential_keys_fill_low_bucket() {
        let mut a = cint();
        for k in 0..1024u32 {
            *a.lookup(Subscript::from(k)) = i64::from(k);
        }
        assert_eq!(a.len(), 1024);
        assert_eq!(a.integer_len(), 1024);
        assert!(a.xarray().is_none());
        assert_eq!(a.capacity(), 1024);
        assert_eq!(a.bucket_len(10), 1024);
        for k in 0..1024u32 {
            assert_eq!(a.exists(Subscript::from(k)), Some(&i64::from(k)));
        }
    }

    #[test]
    fn number_and_text_share_a_slot() {
        let mut a = cint();
        *a.lookup(Subscript::from(5)) = 1;
        *a.lookup(Subscript::from("5")) += 1;
        assert_eq!(a.len(), 1);
        assert_eq!(a.exists(Subscript::from(5)), Some(&2));
        assert!(a.xarray().is_none());
    }

    #[test]
    fn negative_keys_go_to_auxiliary_array() {
        let mut a = cint();
        *a.lookup(Subscript::from(0)) = 0;
        *a.lookup(Subscript::from(-1)) = 7;
        assert_eq!(a.integer_len(), 1);
        assert_eq!(a.len(), 2);
        let x = a.xarray().expect("auxiliary array");
        assert!(matches!(x, XArray::Int(_)));
        assert_eq!(x.exists(Subscript::from(-1)), Some(&7));
        assert_eq!(a.exists(Subscript::from(-1)), Some(&7));

        assert_eq!(a.remove(Subscript::from(-1)), Some(7));
        assert!(a.xarray().is_none());
        assert_eq!(a.exists(Subscript::from(-1)), None);
    }

    #[test]
    fn sparse_buckets_are_independent() {
        let mut a = cint();
        *a.lookup(Subscript::from(1)) = 1;
        *a.lookup(Subscript::from(1_000_000)) = 2;
        assert_eq!(a.bucket_len(10), 1);
        assert_eq!(a.bucket_len(20), 1);
        assert_eq!(a.roots().count(), 2);

        assert_eq!(a.remove(Subscript::from(1)), Some(1));
        assert_eq!(a.bucket_len(10), 0);
        assert_eq!(a.bucket_len(20), 1);
        assert_eq!(a.exists(Subscript::from(1_000_000)), Some(&2));
    }

    #[test]
    fn threshold_spills_sparse_keys() {
        let mut a = cint();
        // Every key in its own 32-slot leaf: after the threshold (2048) is used
        // up, further keys spill.
        let keys: Vec<u32> = (0..200).map(|i| 1_000_000 + i * 4096).collect();
        for &k in &keys {
            *a.lookup(Subscript::from(k)) = i64::from(k);
        }
        assert_eq!(a.len(), keys.len());
        assert!(a.integer_len() < keys.len());
        let x = a.xarray().expect("spilled keys");
        assert!(matches!(x, XArray::Int(_)));
        assert_eq!(x.len() + a.integer_len(), keys.len());
        assert!(a.capacity() - a.integer_len() <= a.threshold());
        for &k in &keys {
            assert_eq!(a.exists(Subscript::from(k)), Some(&i64::from(k)));
        }
    }

    #[test]
    fn removal_frees_trees_and_resets() {
        let mut a = cint();
        // Leaves of 32, 32 and 64 slots.
        for k in [3u32, 2000, 5000] {
            a.lookup(Subscript::from(k));
        }
        assert_eq!(a.capacity(), 128);
        a.remove(Subscript::from(2000));
        assert_eq!(a.capacity(), 96);
        assert_eq!(a.remove(Subscript::from(2000)), None);
        a.remove(Subscript::from(3));
        a.remove(Subscript::from(5000));
        assert!(a.is_empty());
        assert_eq!(a.capacity(), 0);
        assert!(a.top.is_empty());
    }

    #[test]
    fn auxiliary_integers_settle_to_strings() {
        let mut a = cint();
        a.lookup(Subscript::from(1));
        *a.lookup(Subscript::from(-5)) = 5;
        *a.lookup(Subscript::from("name")) = 9;
        assert!(matches!(a.xarray(), Some(XArray::Int(_))));
        a.remove(Subscript::from(-5));
        assert!(matches!(a.xarray(), Some(XArray::Str(_))));
        assert_eq!(a.exists(Subscript::from("name")), Some(&9));

        a.remove(Subscript::from(1));
        let x = a.take_promotion().expect("only auxiliary elements remain");
        assert_eq!(x.len(), 1);
    }

    #[test]
    fn iteration_orders() {
        let mut a = cint();
        let keys = [0u32, 5, 1023, 1024, 5000, 1 << 30];
        for k in keys {
            *a.lookup(Subscript::from(k)) = i64::from(k);
        }
        a.lookup(Subscript::from("z"));

        let asc: Vec<String> = a.iter(Order::Ascending).map(|(k, _)| k.to_string()).collect();
        assert_eq!(asc, ["z", "0", "5", "1023", "1024", "5000", "1073741824"]);
        let desc: Vec<String> = a.iter(Order::Descending).map(|(k, _)| k.to_string()).collect();
        assert_eq!(desc, ["z", "1073741824", "5000", "1024", "1023", "5", "0"]);
        assert_eq!(
            a.first_key(Order::Descending).map(|k| k.to_string()),
            Some("z".to_string())
        );
    }

    #[test]
    fn clone_is_independent() {
        let mut a = cint();
        for k in 0..100u32 {
            *a.lookup(Subscript::from(k)) = i64::from(k);
        }
        a.lookup(Subscript::from(-1));
        let mut b = a.clone();
        *b.lookup(Subscript::from(7)) = -7;
        b.remove(Subscript::from(-1));
        b.clear();
        b.clear();
        assert!(b.is_empty());
        assert_eq!(a.len(), 101);
        assert_eq!(a.exists(Subscript::from(7)), Some(&7));
    }

    #[test]
    fn dump_header() {
        let mut a = cint();
        for k in 0..4u32 {
            *a.lookup(Subscript::from(k)) = i64::from(k);
        }
        let mut out = Vec::new();
        a.dump(&mut out, "arr", &DumpOptions::full()).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("    array_func: cint_array_func\n"));
        assert!(text.contains("    NHAT: 10\n"));
        assert!(text.contains("    THRESHOLD: 2048\n"));
        assert!(text.contains("    table_size: 4 (total), 4 (cint), 0 (int + str)\n"));
        assert!(text.contains("    array_capacity: 32\n"));
        assert!(text.contains("arr[2] = 2"));
    }
}

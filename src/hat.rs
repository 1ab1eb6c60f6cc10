//! Hashed Array Trees.
//!
//! A HAT has a top-level array of `2^n` children, each covering `2^n` consecutive
//! keys, so a full HAT holds `2^(2n)` elements and element `i` lives at
//! `[i >> n][i & (2^n - 1)]`. A HAT asked to cover `2^m` keys uses `n = ceil(m / 2)`;
//! when `m` is odd only the lower half of the top-level array is needed (a
//! "half HAT"). Children wider than `2^NHAT` are HATs themselves, so the depth grows
//! as `O(log log n)`:
//!
//! ```text
//!   m = 31, NHAT = 10
//!   HAT  n = 16 (half: 2^15 children)  -> each child covers 2^16 keys
//!     HAT  n = 8 (full: 2^8 children)  -> each child covers 2^8 keys
//!       leaf [2^8 slots]
//! ```
//!
//! Nodes and leaves are freed as soon as they become empty.

use crate::assoc::Order;
use crate::leaf::LeafArray;

/// A child slot of a [`HatNode`].
#[derive(Clone)]
pub(crate) enum Child<V> {
    Tree(Box<HatNode<V>>),
    Leaf(LeafArray<V>),
}

impl<V> Child<V> {
    #[inline]
    fn is_empty(&self) -> bool {
        match self {
            Child::Tree(t) => t.is_empty(),
            Child::Leaf(l) => l.is_empty(),
        }
    }
}

#[derive(Clone)]
pub(crate) struct HatNode<V> {
    base: u32,
    /// Each child covers `1 << shift` keys; the full top-level array has as many slots.
    shift: u32,
    half: bool,
    /// Elements stored anywhere below this node.
    count: usize,
    children: Box<[Option<Child<V>>]>,
}

impl<V> HatNode<V> {
    /// A HAT covering `2^m` keys starting at `base`.
    pub(crate) fn new(m: u32, base: u32) -> Self {
        let shift = m.div_ceil(2);
        let half = shift > m / 2;
        let size = 1usize << shift;
        let allocated = if half { size / 2 } else { size };
        Self {
            base,
            shift,
            half,
            count: 0,
            children: (0..allocated).map(|_| None).collect(),
        }
    }

    #[inline]
    pub(crate) fn base(&self) -> u32 {
        self.base
    }

    /// Width of the full top-level array, and of each child's key range.
    #[inline]
    pub(crate) fn array_size(&self) -> usize {
        1usize << self.shift
    }

    #[inline]
    pub(crate) fn is_half(&self) -> bool {
        self.half
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.count
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.count == 0
    }

    #[inline]
    fn index_of(&self, k: u32) -> usize {
        debug_assert!(k >= self.base, "key {k} below HAT base {}", self.base);
        let i = ((k - self.base) >> self.shift) as usize;
        debug_assert!(i < self.children.len(), "key {k} beyond HAT");
        i
    }

    /// Slot for `k`, materializing nodes and leaves along the way.
    ///
    /// Newly allocated leaf slots are added to `capacity`. Returns whether the
    /// element was newly installed.
    pub(crate) fn lookup(&mut self, k: u32, nhat: u32, capacity: &mut usize) -> (&mut V, bool)
    where
        V: Default,
    {
        let i = self.index_of(k);
        let shift = self.shift;
        let child_base = self.base + ((i as u32) << shift);

        let child = self.children[i].get_or_insert_with(|| {
            if shift > nhat {
                Child::Tree(Box::new(HatNode::new(shift, child_base)))
            } else {
                *capacity += 1usize << shift;
                Child::Leaf(LeafArray::new(child_base, 1usize << shift))
            }
        });

        let (slot, inserted) = match child {
            Child::Tree(t) => t.lookup(k, nhat, capacity),
            Child::Leaf(l) => l.lookup(k),
        };
        if inserted {
            self.count += 1;
        }
        (slot, inserted)
    }

    pub(crate) fn get(&self, k: u32) -> Option<&V> {
        match self.children[self.index_of(k)].as_ref()? {
            Child::Tree(t) => t.get(k),
            Child::Leaf(l) => l.get(k),
        }
    }

    pub(crate) fn get_mut(&mut self, k: u32) -> Option<&mut V> {
        let i = self.index_of(k);
        match self.children[i].as_mut()? {
            Child::Tree(t) => t.get_mut(k),
            Child::Leaf(l) => l.get_mut(k),
        }
    }

    /// Removes `k`, freeing every node and leaf that empties on the way back up.
    pub(crate) fn remove(&mut self, k: u32, capacity: &mut usize) -> Option<V> {
        let i = self.index_of(k);
        let child = self.children[i].as_mut()?;
        let value = match child {
            Child::Tree(t) => t.remove(k, capacity)?,
            Child::Leaf(l) => l.remove(k, capacity)?,
        };
        if child.is_empty() {
            self.children[i] = None;
        }
        self.count -= 1;
        Some(value)
    }

    /// Allocated children, in slot order.
    pub(crate) fn children(&self) -> impl Iterator<Item = &Child<V>> + '_ {
        self.children.iter().flatten()
    }

    /// Bytes of bookkeeping below this node: child tables and child headers.
    /// Leaf slot storage is accounted separately through the capacity estimate.
    pub(crate) fn overhead_bytes(&self) -> usize {
        let mut bytes = self.children.len() * std::mem::size_of::<Option<Child<V>>>();
        for child in self.children() {
            if let Child::Tree(t) = child {
                bytes += std::mem::size_of::<HatNode<V>>() + t.overhead_bytes();
            }
        }
        bytes
    }

    /// Checks counts and allocation below this node; returns the leaf slots it owns.
    #[cfg(test)]
    pub(crate) fn validate(&self, nhat: u32) -> usize {
        let mut count = 0;
        let mut capacity = 0;
        for (i, child) in self.children.iter().enumerate() {
            let base = self.base + ((i as u32) << self.shift);
            match child {
                None => {}
                Some(Child::Tree(t)) => {
                    assert!(self.shift > nhat, "subtree where a leaf belongs");
                    assert!(!t.is_empty(), "empty subtree kept alive");
                    assert_eq!(t.base(), base);
                    capacity += t.validate(nhat);
                    count += t.len();
                }
                Some(Child::Leaf(l)) => {
                    assert!(self.shift <= nhat, "leaf where a subtree belongs");
                    assert!(!l.is_empty(), "empty leaf kept alive");
                    assert_eq!(l.base(), base);
                    assert_eq!(l.size(), self.array_size());
                    assert_eq!(l.occupied(), l.len());
                    capacity += l.size();
                    count += l.len();
                }
            }
        }
        assert_eq!(count, self.count, "node count must match its children");
        capacity
    }

    pub(crate) fn iter(&self, order: Order) -> HatIter<'_, V> {
        HatIter {
            stack: vec![Cursor::Node {
                node: self,
                step: 0,
            }],
            order,
        }
    }
}

// =============================================================================
// Iteration
// =============================================================================

enum Cursor<'a, V> {
    Node { node: &'a HatNode<V>, step: usize },
    Leaf { leaf: &'a LeafArray<V>, step: usize },
}

/// Lazy walk over a HAT in key order (slots are contiguous and disjoint, so
/// physical order is key order).
pub(crate) struct HatIter<'a, V> {
    stack: Vec<Cursor<'a, V>>,
    order: Order,
}

impl<'a, V> Iterator for HatIter<'a, V> {
    type Item = (u32, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let order = self.order;
        loop {
            let top = self.stack.last_mut()?;
            match top {
                Cursor::Leaf { leaf, step } => {
                    let leaf: &'a LeafArray<V> = *leaf;
                    let size = leaf.size();
                    while *step < size {
                        let pos = order.position(*step, size);
                        *step += 1;
                        if let Some(entry) = leaf.entry_at(pos) {
                            return Some(entry);
                        }
                    }
                    self.stack.pop();
                }
                Cursor::Node { node, step } => {
                    let node: &'a HatNode<V> = *node;
                    let len = node.children.len();
                    let mut pushed = None;
                    while *step < len {
                        let pos = order.position(*step, len);
                        *step += 1;
                        if let Some(child) = node.children[pos].as_ref() {
                            pushed = Some(match child {
                                Child::Tree(t) => Cursor::Node { node: t, step: 0 },
                                Child::Leaf(l) => Cursor::Leaf { leaf: l, step: 0 },
                            });
                            break;
                        }
                    }
                    match pushed {
                        Some(cursor) => self.stack.push(cursor),
                        None => {
                            self.stack.pop();
                        }
                    }
                }
            }
        }
    }
}

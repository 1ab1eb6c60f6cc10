//! Leaf arrays: flat slot blocks at the bottom of a HAT.

/// A contiguous block of `size` slots covering keys `base..base + size`.
///
/// A leaf is only ever alive while it holds at least one element; the owning
/// [`HatNode`](crate::hat::HatNode) drops it once `len()` reaches zero.
#[derive(Clone)]
pub(crate) struct LeafArray<V> {
    base: u32,
    count: usize,
    slots: Box<[Option<V>]>,
}

impl<V> LeafArray<V> {
    pub(crate) fn new(base: u32, size: usize) -> Self {
        debug_assert!(size.is_power_of_two());
        Self {
            base,
            count: 0,
            slots: (0..size).map(|_| None).collect(),
        }
    }

    #[cfg(test)]
    pub(crate) fn base(&self) -> u32 {
        self.base
    }

    /// Number of slots, occupied or not.
    #[inline]
    pub(crate) fn size(&self) -> usize {
        self.slots.len()
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
    fn offset(&self, k: u32) -> usize {
        debug_assert!(k >= self.base, "key {k} below leaf base {}", self.base);
        let off = (k - self.base) as usize;
        debug_assert!(off < self.slots.len(), "key {k} beyond leaf");
        off
    }

    /// Slot for `k`, installing a default value if empty. Returns whether it was new.
    pub(crate) fn lookup(&mut self, k: u32) -> (&mut V, bool)
    where
        V: Default,
    {
        let off = self.offset(k);
        let slot = &mut self.slots[off];
        let inserted = slot.is_none();
        if inserted {
            self.count += 1;
        }
        (slot.get_or_insert_with(V::default), inserted)
    }

    #[inline]
    pub(crate) fn get(&self, k: u32) -> Option<&V> {
        self.slots[self.offset(k)].as_ref()
    }

    #[inline]
    pub(crate) fn get_mut(&mut self, k: u32) -> Option<&mut V> {
        let off = self.offset(k);
        self.slots[off].as_mut()
    }

    /// Clears the slot for `k`. When the leaf empties, its slots are released from
    /// `capacity`.
    pub(crate) fn remove(&mut self, k: u32, capacity: &mut usize) -> Option<V> {
        let off = self.offset(k);
        let value = self.slots[off].take()?;
        self.count -= 1;
        if self.count == 0 {
            *capacity -= self.size();
        }
        Some(value)
    }

    /// Occupied slot at physical position `pos`, with its key.
    #[inline]
    pub(crate) fn entry_at(&self, pos: usize) -> Option<(u32, &V)> {
        self.slots[pos]
            .as_ref()
            .map(|v| (self.base + pos as u32, v))
    }

    /// Occupied slots, counted the slow way.
    #[cfg(test)]
    pub(crate) fn occupied(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }
}

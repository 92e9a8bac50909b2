//! Generational-handle slot containers.
//!
//! [`Pool`] owns its slots and hands out handles on `alloc`. [`PoolMirror`]
//! never allocates a handle itself — it is indexed by handles minted
//! elsewhere (the host hands peer handles to the hole puncher, which mirrors
//! them into its own pending-punch table). Both resolve a stale handle to
//! `None` rather than dangling or panicking, so callbacks can safely outlive
//! the entry they were registered against.

use codec::Handle;
use std::mem;

enum Slot<T> {
    Occupied(T),
    Free { next: Option<usize> },
}

struct Entry<T> {
    nonce: u32,
    slot: Slot<T>,
}

/// An owning, generational-index allocator.
///
/// Maintains a dense vector of slots threaded through an intrusive free
/// list (`free_head` is the index of the first free slot, and each free
/// slot stores the index of the next one). The nonce counter starts at 1
/// and only ever increases, so a reused slot always gets a handle that
/// compares unequal to every handle issued for it previously.
pub struct Pool<T> {
    entries: Vec<Entry<T>>,
    free_head: Option<usize>,
    next_nonce: u32,
    count: usize,
}

impl<T> Default for Pool<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            free_head: None,
            next_nonce: 1,
            count: 0,
        }
    }
}

impl<T> Pool<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (allocated, not yet deallocated) slots.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Allocates a new slot for `value` and returns its handle.
    ///
    /// # Test
    ///
    /// ```
    /// use rally_node_engine::pool::Pool;
    ///
    /// let mut pool: Pool<&str> = Pool::new();
    /// let h1 = pool.alloc("alice");
    /// let h2 = pool.alloc("bob");
    ///
    /// assert_ne!(h1, h2);
    /// assert_eq!(pool.get(h1), Some(&"alice"));
    /// assert_eq!(pool.count(), 2);
    /// ```
    pub fn alloc(&mut self, value: T) -> Handle {
        let nonce = self.next_nonce;
        self.next_nonce += 1;

        let index = if let Some(idx) = self.free_head {
            let next = match self.entries[idx].slot {
                Slot::Free { next } => next,
                Slot::Occupied(_) => unreachable!("free list pointed at an occupied slot"),
            };
            self.free_head = next;
            self.entries[idx] = Entry {
                nonce,
                slot: Slot::Occupied(value),
            };
            idx
        } else {
            self.entries.push(Entry {
                nonce,
                slot: Slot::Occupied(value),
            });
            self.entries.len() - 1
        };

        self.count += 1;
        Handle {
            index: index as u32,
            nonce,
        }
    }

    /// Destroys the slot at `h`, returning its value. A no-op (returns
    /// `None`) if `h` is invalid, out of range, or stale.
    ///
    /// # Test
    ///
    /// ```
    /// use rally_node_engine::pool::Pool;
    ///
    /// let mut pool: Pool<&str> = Pool::new();
    /// let h = pool.alloc("alice");
    ///
    /// assert_eq!(pool.dealloc(h), Some("alice"));
    /// assert_eq!(pool.get(h), None);
    /// assert_eq!(pool.dealloc(h), None);
    ///
    /// let h2 = pool.alloc("bob");
    /// assert_ne!(h, h2);
    /// ```
    pub fn dealloc(&mut self, h: Handle) -> Option<T> {
        if !h.is_valid() {
            return None;
        }

        let idx = h.index as usize;
        let entry = self.entries.get_mut(idx)?;
        if entry.nonce != h.nonce {
            return None;
        }

        let old = mem::replace(
            &mut entry.slot,
            Slot::Free {
                next: self.free_head,
            },
        );
        entry.nonce = 0;
        self.free_head = Some(idx);
        self.count -= 1;

        match old {
            Slot::Occupied(value) => Some(value),
            Slot::Free { .. } => None,
        }
    }

    pub fn get(&self, h: Handle) -> Option<&T> {
        if !h.is_valid() {
            return None;
        }

        let entry = self.entries.get(h.index as usize)?;
        if entry.nonce != h.nonce {
            return None;
        }

        match &entry.slot {
            Slot::Occupied(value) => Some(value),
            Slot::Free { .. } => None,
        }
    }

    pub fn get_mut(&mut self, h: Handle) -> Option<&mut T> {
        if !h.is_valid() {
            return None;
        }

        let entry = self.entries.get_mut(h.index as usize)?;
        if entry.nonce != h.nonce {
            return None;
        }

        match &mut entry.slot {
            Slot::Occupied(value) => Some(value),
            Slot::Free { .. } => None,
        }
    }

    /// Resolves `h`, panicking if it is stale or invalid.
    pub fn at(&self, h: Handle) -> &T {
        self.get(h).expect("stale or invalid handle")
    }

    /// Iterates every live slot in dense order.
    pub fn iter(&self) -> impl Iterator<Item = (Handle, &T)> {
        self.entries.iter().enumerate().filter_map(|(idx, entry)| {
            if entry.nonce == 0 {
                return None;
            }
            match &entry.slot {
                Slot::Occupied(value) => Some((
                    Handle {
                        index: idx as u32,
                        nonce: entry.nonce,
                    },
                    value,
                )),
                Slot::Free { .. } => None,
            }
        })
    }
}

/// A sparse, handle-addressed container for entries whose handle was
/// allocated by someone else.
///
/// Used when the hole puncher needs to key a pending-punch entry by the
/// same [`Handle`] the host allocated for the owning peer: the puncher
/// never mints its own handles, it only mirrors ones it's handed.
pub struct PoolMirror<T> {
    entries: Vec<Option<(u32, T)>>,
    count: usize,
}

impl<T> Default for PoolMirror<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            count: 0,
        }
    }
}

impl<T> PoolMirror<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Constructs `value` at the slot named by `h`, growing storage if
    /// needed. Overwrites (without affecting `count` twice) whatever was
    /// already at that index.
    ///
    /// # Test
    ///
    /// ```
    /// use codec::Handle;
    /// use rally_node_engine::pool::PoolMirror;
    ///
    /// let mut mirror: PoolMirror<&str> = PoolMirror::new();
    /// let h = Handle { index: 3, nonce: 9 };
    /// mirror.make(h, "alice");
    ///
    /// assert_eq!(mirror.get(h), Some(&"alice"));
    /// assert_eq!(mirror.count(), 1);
    /// ```
    pub fn make(&mut self, h: Handle, value: T) {
        let idx = h.index as usize;
        if idx >= self.entries.len() {
            self.entries.resize_with(idx + 1, || None);
        }

        if self.entries[idx].is_none() {
            self.count += 1;
        }

        self.entries[idx] = Some((h.nonce, value));
    }

    /// Clears the slot at `h`, returning its value. No-op if `h` is out of
    /// range, invalid, or its nonce no longer matches what's stored.
    pub fn destroy(&mut self, h: Handle) -> Option<T> {
        if !h.is_valid() {
            return None;
        }

        let idx = h.index as usize;
        let slot = self.entries.get_mut(idx)?;
        match slot {
            Some((nonce, _)) if *nonce == h.nonce => {
                let (_, value) = slot.take().unwrap();
                self.count -= 1;
                Some(value)
            }
            _ => None,
        }
    }

    pub fn get(&self, h: Handle) -> Option<&T> {
        if !h.is_valid() {
            return None;
        }

        match self.entries.get(h.index as usize)? {
            Some((nonce, value)) if *nonce == h.nonce => Some(value),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, h: Handle) -> Option<&mut T> {
        if !h.is_valid() {
            return None;
        }

        match self.entries.get_mut(h.index as usize)? {
            Some((nonce, value)) if *nonce == h.nonce => Some(value),
            _ => None,
        }
    }

    pub fn at(&self, h: Handle) -> &T {
        self.get(h).expect("stale or invalid handle")
    }

    pub fn iter(&self) -> impl Iterator<Item = (Handle, &T)> {
        self.entries.iter().enumerate().filter_map(|(idx, slot)| {
            slot.as_ref().map(|(nonce, value)| {
                (
                    Handle {
                        index: idx as u32,
                        nonce: *nonce,
                    },
                    value,
                )
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dealloc_of_unknown_handle_is_a_no_op() {
        let mut pool: Pool<u32> = Pool::new();
        let h = pool.alloc(1);
        let bogus = Handle {
            index: 99,
            nonce: 1,
        };

        assert_eq!(pool.dealloc(bogus), None);
        assert_eq!(pool.count(), 1);
        assert_eq!(pool.get(h), Some(&1));
    }

    #[test]
    fn reused_slot_gets_a_strictly_greater_nonce() {
        let mut pool: Pool<u32> = Pool::new();
        let h1 = pool.alloc(1);
        pool.dealloc(h1);
        let h2 = pool.alloc(2);

        assert_eq!(h1.index, h2.index);
        assert!(h2.nonce > h1.nonce);
        assert_ne!(h1, h2);
    }

    #[test]
    fn iteration_skips_freed_slots() {
        let mut pool: Pool<u32> = Pool::new();
        let h1 = pool.alloc(1);
        let _h2 = pool.alloc(2);
        let _h3 = pool.alloc(3);
        pool.dealloc(h1);

        let values: Vec<u32> = pool.iter().map(|(_, v)| *v).collect();
        assert_eq!(values, vec![2, 3]);
    }

    #[test]
    fn pool_mirror_resolves_stale_handles_to_none() {
        let mut mirror: PoolMirror<u32> = PoolMirror::new();
        let h = Handle {
            index: 2,
            nonce: 5,
        };
        mirror.make(h, 10);

        let stale = Handle {
            index: 2,
            nonce: 6,
        };
        assert_eq!(mirror.get(stale), None);
        assert_eq!(mirror.get(h), Some(&10));

        assert_eq!(mirror.destroy(h), Some(10));
        assert_eq!(mirror.get(h), None);
        assert_eq!(mirror.count(), 0);
    }
}

//! The Registry (spec.md §4.2): four independent keyed containers, one per
//! `Kind`, each supporting membership test, insert-if-absent, lookup,
//! remove (defer, don't free), and iteration (teardown only).
//!
//! Storage discipline: "a set of slots grown in fixed chunks (5 at a time)
//! with free slots reused" (spec.md §4.2). `Slab<T>` implements exactly
//! that. Slot indices are stable for the life of an entry — the Vec may
//! reallocate its backing array as it grows, but `Option<T>` elements move
//! with it by value, so only `&T`/`&mut T` borrows (never raw addresses)
//! are carried across a `wait()` call. The dispatcher recovers a record via
//! its `(Kind, u32)` slot index packed into the OS-level event datum,
//! giving O(1) recovery without the raw-pointer aliasing the original's
//! "opaque pointer" idiom would require in Rust (see DESIGN.md).

use std::collections::HashMap;

/// Number of new slots allocated when a `Slab` runs out of room.
const SLAB_GROWTH_CHUNK: usize = 5;

pub(crate) struct Slab<T> {
    slots: Vec<Option<T>>,
    free: Vec<u32>,
}

impl<T> Slab<T> {
    pub fn new() -> Self {
        Slab {
            slots: Vec::new(),
            free: Vec::new(),
        }
    }

    pub fn insert(&mut self, value: T) -> u32 {
        if let Some(idx) = self.free.pop() {
            self.slots[idx as usize] = Some(value);
            return idx;
        }

        if self.slots.len() == self.slots.capacity() {
            self.slots.reserve(SLAB_GROWTH_CHUNK);
        }
        let idx = self.slots.len() as u32;
        self.slots.push(Some(value));
        idx
    }

    pub fn get(&self, idx: u32) -> Option<&T> {
        self.slots.get(idx as usize).and_then(|s| s.as_ref())
    }

    pub fn get_mut(&mut self, idx: u32) -> Option<&mut T> {
        self.slots.get_mut(idx as usize).and_then(|s| s.as_mut())
    }

    /// Frees the slot, returning the value that was there. Only called
    /// from the deferred-free drain, never immediately on `remove_*`.
    pub fn free(&mut self, idx: u32) -> Option<T> {
        let value = self.slots.get_mut(idx as usize).and_then(|s| s.take());
        if value.is_some() {
            self.free.push(idx);
        }
        value
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|v| (i as u32, v)))
    }

    pub fn iter_indices(&self) -> impl Iterator<Item = u32> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.is_some().then_some(i as u32))
    }
}

/// One kind's container: a `Slab` of records plus the id -> slot-index map
/// that gives callers stable 16-bit identifiers while the slab reuses
/// freed slots internally.
pub(crate) struct KindRegistry<T> {
    slab: Slab<T>,
    index_of_id: HashMap<u16, u32>,
}

impl<T> KindRegistry<T> {
    pub fn new() -> Self {
        KindRegistry {
            slab: Slab::new(),
            index_of_id: HashMap::new(),
        }
    }

    pub fn contains(&self, id: u16) -> bool {
        self.index_of_id.contains_key(&id)
    }

    pub fn index_of(&self, id: u16) -> Option<u32> {
        self.index_of_id.get(&id).copied()
    }

    /// Inserts `value` under `id`. Returns `None` without touching state if
    /// `id` is already registered (duplicate-rejection, spec.md §3/§8).
    pub fn insert(&mut self, id: u16, value: T) -> Option<u32> {
        if self.index_of_id.contains_key(&id) {
            return None;
        }
        let idx = self.slab.insert(value);
        self.index_of_id.insert(id, idx);
        Some(idx)
    }

    pub fn get_by_id(&self, id: u16) -> Option<&T> {
        self.index_of(id).and_then(|idx| self.slab.get(idx))
    }

    pub fn get_by_id_mut(&mut self, id: u16) -> Option<&mut T> {
        let idx = self.index_of(id)?;
        self.slab.get_mut(idx)
    }

    pub fn get_mut(&mut self, idx: u32) -> Option<&mut T> {
        self.slab.get_mut(idx)
    }

    pub fn get(&self, idx: u32) -> Option<&T> {
        self.slab.get(idx)
    }

    /// Removes the id -> index mapping immediately (so `has_X` reflects
    /// the removal right away, per spec.md §8's membership property) but
    /// leaves the slab slot in place; the caller is responsible for
    /// queuing `(kind, idx)` onto the deferred-free list.
    pub fn forget_id(&mut self, id: u16) -> Option<u32> {
        self.index_of_id.remove(&id)
    }

    pub fn free_slot(&mut self, idx: u32) -> Option<T> {
        self.slab.free(idx)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &T)> {
        self.slab.iter()
    }

    pub fn iter_indices(&self) -> impl Iterator<Item = u32> + '_ {
        self.slab.iter_indices()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slab_reuses_freed_slots() {
        let mut slab = Slab::new();
        let a = slab.insert("a");
        let b = slab.insert("b");
        assert_eq!(slab.free(a), Some("a"));
        let c = slab.insert("c");
        assert_eq!(c, a, "freed slot should be reused before growing");
        assert_eq!(slab.get(b), Some(&"b"));
    }

    #[test]
    fn kind_registry_rejects_duplicate_ids() {
        let mut reg: KindRegistry<i32> = KindRegistry::new();
        assert!(reg.insert(1, 10).is_some());
        assert!(reg.insert(1, 20).is_none(), "second insert must be rejected");
        assert_eq!(reg.get_by_id(1), Some(&10));
    }

    #[test]
    fn forget_id_hides_membership_before_free() {
        let mut reg: KindRegistry<i32> = KindRegistry::new();
        reg.insert(1, 10);
        let idx = reg.forget_id(1).unwrap();
        assert!(!reg.contains(1));
        assert_eq!(reg.get(idx), Some(&10), "slot is still alive until drained");
        assert_eq!(reg.free_slot(idx), Some(10));
    }
}

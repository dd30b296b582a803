//! Multi-part heap: variable-length, contiguous-per-entity subcomponents
//! (§4.5), e.g. a tank's wheels.
//!
//! Grounded on `ecsdb::storage::sparse`'s swap-remove idiom, generalized from
//! one component per slot to N-per-slot via an indirection table.

/// Per-entity indirection entry: where this slot's parts live, how many are
/// live, and the backing allocation's capacity.
#[derive(Debug, Clone)]
struct PartSlot<T> {
    parts: Vec<T>,
}

impl<T> Default for PartSlot<T> {
    fn default() -> Self {
        Self { parts: Vec::new() }
    }
}

/// Growth policy: `max(4, 2×cap)`, matching §4.5.
fn grown_capacity(current: usize) -> usize {
    (current * 2).max(4)
}

/// A multi-part table for one registered multi-part component type.
///
/// Parts for a single entity are contiguous (`Vec<T>` per slot). Removal is
/// swap-with-last: index stability across removes is not guaranteed. Growth
/// reallocates; old allocations are simply dropped by `Vec`'s own realloc
/// (the spec's "old allocations leak until rebuild" describes a manual C++
/// arena discipline the reference engine does not need here, since Rust's
/// allocator already reclaims the old buffer on `Vec` growth — the spec's
/// intent, no observable reuse before `destroy`/`clear`, is preserved).
pub struct MultiPartHeap<T> {
    slots: Vec<PartSlot<T>>,
}

impl<T> Default for MultiPartHeap<T> {
    fn default() -> Self {
        Self { slots: Vec::new() }
    }
}

impl<T> MultiPartHeap<T> {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_slot(&mut self, slot: u32) {
        let slot = slot as usize;
        if slot >= self.slots.len() {
            self.slots.resize_with(slot + 1, PartSlot::default);
        }
    }

    pub fn get(&self, slot: u32) -> &[T] {
        self.slots
            .get(slot as usize)
            .map(|s| s.parts.as_slice())
            .unwrap_or(&[])
    }

    pub fn add(&mut self, slot: u32, value: T) {
        self.ensure_slot(slot);
        let parts = &mut self.slots[slot as usize].parts;
        if parts.len() == parts.capacity() {
            parts.reserve_exact(grown_capacity(parts.capacity()) - parts.len());
        }
        parts.push(value);
    }

    /// Removes part `i` from `slot` via swap-with-last. Caller must not rely
    /// on index stability across this call (§4.5 tie-break).
    pub fn remove(&mut self, slot: u32, i: usize) -> Option<T> {
        let parts = &mut self.slots.get_mut(slot as usize)?.parts;
        if i >= parts.len() {
            return None;
        }
        Some(parts.swap_remove(i))
    }

    pub fn clear(&mut self, slot: u32) {
        if let Some(s) = self.slots.get_mut(slot as usize) {
            s.parts.clear();
            s.parts.shrink_to_fit();
        }
    }

    pub fn capacity_of(&self, slot: u32) -> usize {
        self.slots
            .get(slot as usize)
            .map(|s| s.parts.capacity())
            .unwrap_or(0)
    }

    /// Resets every slot, reclaiming all capacities (used by
    /// `Repository::clear`, §8 B4).
    pub fn clear_all(&mut self) {
        self.slots.clear();
        self.slots.shrink_to_fit();
    }
}

//! Entity index: generational slot headers, free list, liveness (§4.4).
//!
//! Grounded on `ecsdb::entity::registry::EntityRegistry` (freelist-first
//! allocation, version bump on delete) restructured from a `HashMap`-indexed
//! `(EntityId, EntityVersion)` pair into the spec's packed slot-indexed
//! `(index: u32, generation: u16)` handle with inline 256-bit masks, and
//! `ecsdb::entity::archetype::ArchetypeMask` widened into [`Mask256`].
//!
//! The header table is itself a [`ChunkTable`], addressed at the spec's
//! pseudo component-type id `-1` wherever the snapshot codec needs to treat
//! it like any other byte-packed table.

use crate::chunk_table::{ByteComponent, ChunkTable};
use crate::mask::Mask256;
use std::collections::VecDeque;

/// Pseudo component-type id used to address the entity index's header table
/// inside the snapshot codec's chunk block (§4.4, §4.12).
pub const HEADER_PSEUDO_TYPE_ID: i32 = -1;

pub const FLAG_IS_ACTIVE: u16 = 1 << 0;

/// A value-type reference to an entity: `(index, generation)` (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct EntityHandle {
    pub index: u32,
    pub generation: u16,
}

impl EntityHandle {
    /// The default handle is never alive: generation 0 is reserved.
    pub fn is_default(&self) -> bool {
        self.generation == 0
    }
}

/// One 96-byte, 32-byte-aligned entity header (§3).
#[repr(C, align(32))]
#[derive(Debug, Clone, Copy)]
pub struct Header {
    pub component_mask: Mask256,
    pub authority_mask: Mask256,
    pub generation: u16,
    pub flags: u16,
    pub dis_type: u64,
    pub last_change_tick: u32,
    _padding: [u8; 16],
}

impl Default for Header {
    fn default() -> Self {
        Self {
            component_mask: Mask256::EMPTY,
            authority_mask: Mask256::EMPTY,
            generation: 0,
            flags: 0,
            dis_type: 0,
            last_change_tick: 0,
            _padding: [0; 16],
        }
    }
}

// Safety: `Header` is `repr(C)`, contains no references, and is valid when
// all-zero (generation 0 / inactive / empty masks is exactly the spec's
// "never created" slot state).
unsafe impl ByteComponent for Header {}

impl Header {
    #[inline]
    pub fn is_active(&self) -> bool {
        self.flags & FLAG_IS_ACTIVE != 0
    }
}

const _: () = assert!(std::mem::size_of::<Header>() == 96);

/// The per-process entity index: generational headers, free list, and the
/// high-water mark of slots ever issued.
pub struct EntityIndex {
    headers: ChunkTable<Header>,
    free_list: VecDeque<u32>,
    max_issued: u32,
    active_count: u32,
    /// `(index, generation)` pairs destroyed since the last tick/frame,
    /// drained by the Flight Recorder / Repository (§3 "Lifecycles").
    destruction_log: Vec<(u32, u16)>,
}

impl EntityIndex {
    pub fn new(max_entities: usize) -> crate::error::Result<Self> {
        Ok(Self {
            headers: ChunkTable::new(max_entities)?,
            free_list: VecDeque::new(),
            max_issued: 0,
            active_count: 0,
            destruction_log: Vec::new(),
        })
    }

    pub fn chunk_capacity(&self) -> usize {
        self.headers.chunk_capacity()
    }

    pub fn total_chunks(&self) -> usize {
        self.headers.total_chunks()
    }

    pub fn max_issued(&self) -> u32 {
        self.max_issued
    }

    pub fn active_count(&self) -> u32 {
        self.active_count
    }

    pub fn header(&self, slot: u32) -> Header {
        self.headers.read(slot)
    }

    /// Creates a new entity. Prefers the free list over bumping `max_issued`
    /// (lowest allocation latency, better chunk packing; §4.4 tie-break).
    pub fn create(&mut self, global_version: u32) -> EntityHandle {
        let index = if let Some(slot) = self.free_list.pop_front() {
            slot
        } else {
            let slot = self.max_issued;
            self.max_issued += 1;
            slot
        };

        let prev_gen = self.headers.read(index).generation;
        let mut next_gen = prev_gen.wrapping_add(1);
        if next_gen == 0 {
            next_gen = 1; // generation wraps skipping 0
        }

        self.headers
            .write(
                index,
                Header {
                    component_mask: Mask256::EMPTY,
                    authority_mask: Mask256::EMPTY,
                    generation: next_gen,
                    flags: FLAG_IS_ACTIVE,
                    dis_type: 0,
                    last_change_tick: global_version,
                    _padding: [0; 16],
                },
                global_version,
            )
            .expect("header chunk within bounds");
        self.active_count += 1;

        EntityHandle {
            index,
            generation: next_gen,
        }
    }

    pub fn is_alive(&self, h: EntityHandle) -> bool {
        if h.is_default() || h.index >= self.max_issued {
            return false;
        }
        let header = self.headers.read(h.index);
        header.generation == h.generation && header.is_active()
    }

    /// Destroys `h`. No-op (returns `false`) if `h` is already stale.
    pub fn destroy(&mut self, h: EntityHandle, global_version: u32) -> bool {
        if !self.is_alive(h) {
            return false;
        }
        let mut next_gen = h.generation.wrapping_add(1);
        if next_gen == 0 {
            next_gen = 1;
        }
        self.headers
            .write(
                h.index,
                Header {
                    component_mask: Mask256::EMPTY,
                    authority_mask: Mask256::EMPTY,
                    generation: next_gen,
                    flags: 0,
                    dis_type: 0,
                    last_change_tick: global_version,
                    _padding: [0; 16],
                },
                global_version,
            )
            .expect("header chunk within bounds");
        self.free_list.push_back(h.index);
        self.active_count -= 1;
        self.destruction_log.push((h.index, h.generation));
        true
    }

    /// Mutates the header for `slot` in place, bumping its chunk's version.
    pub fn with_header_mut<R>(
        &self,
        slot: u32,
        global_version: u32,
        f: impl FnOnce(&mut Header) -> R,
    ) -> R {
        self.headers
            .with_mut(slot, global_version, f)
            .expect("header chunk within bounds")
    }

    /// Drains the destruction log (consumed once per frame by the recorder).
    pub fn drain_destruction_log(&mut self) -> Vec<(u32, u16)> {
        std::mem::take(&mut self.destruction_log)
    }

    pub fn peek_destruction_log(&self) -> &[(u32, u16)] {
        &self.destruction_log
    }

    /// Sets liveness bits for every slot in chunk `c` (§4.4).
    pub fn chunk_liveness(&self, c: usize, out_bits: &mut Vec<bool>) {
        out_bits.clear();
        let cap = self.headers.chunk_capacity();
        for i in 0..cap {
            let slot = (c * cap + i) as u32;
            out_bits.push(slot < self.max_issued && self.headers.read(slot).is_active());
        }
    }

    pub fn chunk_version(&self, c: usize) -> u32 {
        self.headers.chunk_version(c)
    }

    pub fn total_header_chunks(&self) -> usize {
        self.headers.total_chunks()
    }

    /// Whether header chunk `c` was ever committed. An uncommitted chunk
    /// holds no allocated slots and can be skipped outright by the query
    /// engine's chunk-skip fast path (§4.8).
    pub fn is_chunk_committed(&self, c: usize) -> bool {
        self.headers.is_chunk_committed(c)
    }

    pub fn sanitize_header_chunk(&self, c: usize, liveness: &[bool], out: &mut Vec<u8>) {
        self.headers.sanitize_chunk_into_buffer(c, liveness, out);
    }

    pub fn set_raw_header_chunk(&self, c: usize, bytes: &[u8]) -> crate::error::Result<()> {
        self.headers.set_raw_chunk_bytes(c, bytes)
    }

    /// Used during keyframe apply: force a slot's generation without
    /// touching the free list (§4.4). Expands `max_issued` if needed.
    pub fn force_restore(&mut self, index: u32, generation: u16, flags: u16, global_version: u32) {
        self.headers
            .with_mut(index, global_version, |h| {
                h.generation = generation;
                h.flags = flags;
            })
            .expect("header chunk within bounds");
        if index >= self.max_issued {
            self.max_issued = index + 1;
        }
    }

    /// After bulk header injection (keyframe apply), scans every header
    /// chunk and reconstructs `active_count`, `max_issued`, and the free
    /// list from observed truth (§4.4, §4.14).
    pub fn rebuild_metadata(&mut self) {
        let total_chunks = self.headers.total_chunks();
        let cap = self.headers.chunk_capacity();
        let mut max_index_seen: Option<u32> = None;
        let mut active = 0u32;
        let mut free: VecDeque<u32> = VecDeque::new();

        for c in 0..total_chunks {
            for i in 0..cap {
                let slot = (c * cap + i) as u32;
                let header = self.headers.read(slot);
                if header.generation != 0 {
                    max_index_seen = Some(slot);
                    if header.is_active() {
                        active += 1;
                    } else {
                        free.push_back(slot);
                    }
                }
            }
        }

        self.max_issued = max_index_seen.map(|m| m + 1).unwrap_or(0);
        // Holes below max_issued whose generation is still 0 were never
        // allocated; they are free slots too (reusable by `create`).
        for slot in 0..self.max_issued {
            let header = self.headers.read(slot);
            if header.generation == 0 && !free.contains(&slot) {
                free.push_back(slot);
            }
        }
        self.active_count = active;
        self.free_list = free;
        self.destruction_log.clear();
    }

    /// Resets the index to empty while keeping committed header pages
    /// resident (`Repository::clear`, §4.7).
    pub fn clear(&mut self) {
        self.headers.clear_contents();
        self.free_list.clear();
        self.max_issued = 0;
        self.active_count = 0;
        self.destruction_log.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_yields_alive_handle_with_generation_1() {
        let mut idx = EntityIndex::new(64).unwrap();
        let h = idx.create(1);
        assert!(idx.is_alive(h));
        assert_eq!(h.generation, 1);
    }

    #[test]
    fn destroy_then_recreate_bumps_generation_and_reuses_slot() {
        let mut idx = EntityIndex::new(64).unwrap();
        let h1 = idx.create(1);
        idx.destroy(h1, 2);
        assert!(!idx.is_alive(h1));
        let h2 = idx.create(3);
        assert_eq!(h1.index, h2.index);
        assert_ne!(h1.generation, h2.generation);
        assert!(idx.is_alive(h2));
    }

    #[test]
    fn default_handle_is_never_alive() {
        let idx = EntityIndex::new(64).unwrap();
        assert!(!idx.is_alive(EntityHandle::default()));
    }

    #[test]
    fn free_list_preferred_over_bump() {
        let mut idx = EntityIndex::new(64).unwrap();
        let h1 = idx.create(1);
        let _h2 = idx.create(1);
        idx.destroy(h1, 2);
        assert_eq!(idx.max_issued(), 2);
        let h3 = idx.create(3);
        assert_eq!(h3.index, h1.index, "free list reused before bumping");
        assert_eq!(idx.max_issued(), 2, "bump not used when free list had a slot");
    }

    #[test]
    fn rebuild_metadata_recovers_active_count_and_free_list() {
        let mut idx = EntityIndex::new(64).unwrap();
        let _h1 = idx.create(1);
        let h2 = idx.create(1);
        let _h3 = idx.create(1);
        idx.destroy(h2, 2);
        // Simulate keyframe header injection having scrambled bookkeeping.
        idx.max_issued = 0;
        idx.active_count = 0;
        idx.free_list.clear();
        idx.rebuild_metadata();
        assert_eq!(idx.active_count(), 2);
        assert_eq!(idx.max_issued(), 3);
        assert!(!idx.is_alive(h2));
    }

    #[test]
    fn clear_empties_index_but_keeps_pages_resident() {
        let mut idx = EntityIndex::new(64).unwrap();
        idx.create(1);
        idx.clear();
        assert_eq!(idx.active_count(), 0);
        assert_eq!(idx.max_issued(), 0);
        assert!(idx.headers.is_chunk_committed(0));
    }
}

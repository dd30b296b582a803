//! Reference-backed chunk table for reference-typed (Tier 2) components
//! (§4.3).
//!
//! Grounded on `ecsdb::storage::sparse::SparseSet<T>` (parallel
//! `entity_to_index`/`index_to_entity` arrays, swap-remove semantics)
//! adapted to typed, chunked storage behind `Arc<T>` so Tier 2 "reference
//! equality" (§3 P3) maps onto `Arc::ptr_eq`, and so the Global Double
//! Buffer snapshot provider's "shallow copy" (§4.16) is a cheap `Arc` clone
//! rather than a deep clone — the spec's explicit Non-goal against automatic
//! deep cloning of reference-typed components.

use crate::error::Result;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Marker trait for reference-typed (Tier 2) components.
pub trait ReferenceComponent: Send + Sync + 'static {}
impl<T: Send + Sync + 'static> ReferenceComponent for T {}

#[repr(align(64))]
struct PaddedVersion(AtomicU32);

impl PaddedVersion {
    fn new() -> Self {
        Self(AtomicU32::new(0))
    }
}

/// One registered reference type's table: chunked parallel `items`/`versions`
/// arrays, identical lifecycle shape to [`crate::chunk_table::ChunkTable`].
pub struct RefTable<T: ReferenceComponent> {
    chunk_capacity: usize,
    max_chunks: usize,
    items: Vec<RwLock<Option<Vec<Option<Arc<T>>>>>>,
    slot_versions: Vec<AtomicU32>,
    chunk_versions: Vec<PaddedVersion>,
}

impl<T: ReferenceComponent> RefTable<T> {
    pub fn new(max_entities: usize, chunk_capacity: usize) -> Self {
        let chunk_capacity = chunk_capacity.max(1);
        let max_chunks = max_entities.div_ceil(chunk_capacity).max(1);
        let mut items = Vec::with_capacity(max_chunks);
        items.resize_with(max_chunks, || RwLock::new(None));
        let mut slot_versions = Vec::with_capacity(max_chunks * chunk_capacity);
        slot_versions.resize_with(max_chunks * chunk_capacity, || AtomicU32::new(0));
        let mut chunk_versions = Vec::with_capacity(max_chunks);
        chunk_versions.resize_with(max_chunks, PaddedVersion::new);
        Self {
            chunk_capacity,
            max_chunks,
            items,
            slot_versions,
            chunk_versions,
        }
    }

    #[inline]
    fn location(&self, slot: u32) -> (usize, usize) {
        let slot = slot as usize;
        (slot / self.chunk_capacity, slot % self.chunk_capacity)
    }

    pub fn total_chunks(&self) -> usize {
        self.max_chunks
    }

    pub fn chunk_capacity(&self) -> usize {
        self.chunk_capacity
    }

    fn ensure_chunk(&self, i: usize) {
        let mut guard = self.items[i].write();
        if guard.is_none() {
            *guard = Some(vec![None; self.chunk_capacity]);
        }
    }

    /// Writes `value` at `slot`. Bumps the per-slot version and the owning
    /// chunk's version (check-before-write, matching §4.2's byte-packed
    /// table false-sharing avoidance).
    pub fn write(&self, slot: u32, value: Arc<T>, global_version: u32) {
        let (i, off) = self.location(slot);
        self.ensure_chunk(i);
        self.items[i].write().as_mut().unwrap()[off] = Some(value);
        self.bump_versions(slot, i, global_version);
    }

    pub fn clear_slot(&self, slot: u32, global_version: u32) {
        let (i, off) = self.location(slot);
        if let Some(inner) = self.items[i].write().as_mut() {
            inner[off] = None;
        }
        self.bump_versions(slot, i, global_version);
    }

    fn bump_versions(&self, slot: u32, chunk_idx: usize, global_version: u32) {
        self.slot_versions[slot as usize].store(global_version, Ordering::Relaxed);
        let cv = &self.chunk_versions[chunk_idx].0;
        if cv.load(Ordering::Relaxed) != global_version {
            cv.store(global_version, Ordering::Relaxed);
        }
    }

    pub fn read(&self, slot: u32) -> Option<Arc<T>> {
        let (i, off) = self.location(slot);
        self.items[i]
            .read()
            .as_ref()
            .and_then(|inner| inner[off].clone())
    }

    pub fn slot_version(&self, slot: u32) -> u32 {
        self.slot_versions[slot as usize].load(Ordering::Relaxed)
    }

    pub fn chunk_version(&self, i: usize) -> u32 {
        self.chunk_versions[i].0.load(Ordering::Relaxed)
    }

    pub fn clear_contents(&self) {
        for chunk in &self.items {
            *chunk.write() = None;
        }
        for v in &self.slot_versions {
            v.store(0, Ordering::Relaxed);
        }
        for v in &self.chunk_versions {
            v.0.store(0, Ordering::Relaxed);
        }
    }
}

impl<T> RefTable<T>
where
    T: ReferenceComponent + Serialize,
{
    /// Writes only slots in chunk `chunk_i` whose per-slot version exceeds
    /// `baseline_tick`, as `(slot_in_chunk: u16, is_null: u8, [payload_len:
    /// u32, payload])` records, explicitly encoding nulls (§4.3, §4.12).
    pub fn serialize_delta(&self, chunk_i: usize, baseline_tick: u32, out: &mut Vec<u8>) -> Result<usize> {
        let guard = self.items[chunk_i].read();
        let mut written = 0usize;
        if let Some(inner) = guard.as_ref() {
            for (off, slot_val) in inner.iter().enumerate() {
                let slot = (chunk_i * self.chunk_capacity + off) as u32;
                if self.slot_versions[slot as usize].load(Ordering::Relaxed) <= baseline_tick {
                    continue;
                }
                out.extend_from_slice(&(off as u16).to_le_bytes());
                match slot_val {
                    None => out.push(0),
                    Some(value) => {
                        out.push(1);
                        let payload = bincode::serialize(value.as_ref())
                            .map_err(|e| crate::error::EcsError::Serialization(e.to_string()))?;
                        out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
                        out.extend_from_slice(&payload);
                        written += 1;
                    }
                }
            }
        }
        Ok(written)
    }
}

impl<T> RefTable<T>
where
    T: ReferenceComponent + DeserializeOwned,
{
    /// Applies a `serialize_delta` record stream into chunk `chunk_i`,
    /// returning the slots touched (used by playback for mask repair, §4.14).
    pub fn apply_delta(&self, chunk_i: usize, bytes: &[u8], global_version: u32) -> Result<Vec<(u32, bool)>> {
        self.ensure_chunk(chunk_i);
        let mut cursor = 0usize;
        let mut touched = Vec::new();
        while cursor + 3 <= bytes.len() {
            let off = u16::from_le_bytes([bytes[cursor], bytes[cursor + 1]]) as usize;
            let is_null = bytes[cursor + 2] == 0;
            cursor += 3;
            let slot = (chunk_i * self.chunk_capacity + off) as u32;
            if is_null {
                self.clear_slot(slot, global_version);
                touched.push((slot, false));
            } else {
                if cursor + 4 > bytes.len() {
                    return Err(crate::error::EcsError::TruncatedFrame);
                }
                let len = u32::from_le_bytes(bytes[cursor..cursor + 4].try_into().unwrap()) as usize;
                cursor += 4;
                if cursor + len > bytes.len() {
                    return Err(crate::error::EcsError::TruncatedFrame);
                }
                let value: T = bincode::deserialize(&bytes[cursor..cursor + len])
                    .map_err(|e| crate::error::EcsError::Serialization(e.to_string()))?;
                cursor += len;
                self.write(slot, Arc::new(value), global_version);
                touched.push((slot, true));
            }
        }
        Ok(touched)
    }
}

/// Type-erased view over a [`RefTable<T>`] for the snapshot codec and the
/// repository's by-id table registry, mirroring [`crate::chunk_table::RawChunkTable`].
pub trait RawRefTable: Send + Sync {
    fn total_chunks(&self) -> usize;
    fn chunk_capacity(&self) -> usize;
    fn chunk_version(&self, i: usize) -> u32;
    /// Serializes the delta for chunk `i` into `out`, returning the number
    /// of non-null slots written.
    fn serialize_delta(&self, chunk_i: usize, baseline_tick: u32, out: &mut Vec<u8>) -> Result<usize>;
    /// Applies a delta record stream, returning `(slot, is_present)` pairs
    /// touched (for entity-header mask repair, §4.14).
    fn apply_delta(&self, chunk_i: usize, bytes: &[u8], global_version: u32) -> Result<Vec<(u32, bool)>>;
    fn clear_contents(&self);
}

impl<T> RawRefTable for RefTable<T>
where
    T: ReferenceComponent + Serialize + DeserializeOwned,
{
    fn total_chunks(&self) -> usize {
        RefTable::total_chunks(self)
    }
    fn chunk_capacity(&self) -> usize {
        RefTable::chunk_capacity(self)
    }
    fn chunk_version(&self, i: usize) -> u32 {
        RefTable::chunk_version(self, i)
    }
    fn serialize_delta(&self, chunk_i: usize, baseline_tick: u32, out: &mut Vec<u8>) -> Result<usize> {
        RefTable::serialize_delta(self, chunk_i, baseline_tick, out)
    }
    fn apply_delta(&self, chunk_i: usize, bytes: &[u8], global_version: u32) -> Result<Vec<(u32, bool)>> {
        RefTable::apply_delta(self, chunk_i, bytes, global_version)
    }
    fn clear_contents(&self) {
        RefTable::clear_contents(self)
    }
}

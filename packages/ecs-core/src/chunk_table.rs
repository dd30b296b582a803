//! Paged chunk table for byte-packed (Tier 1) components (§4.2).
//!
//! Generalizes `ecsdb::storage::table::ComponentTable<T>` (double-buffer
//! commit over one flat `ArcStorageBuffer`, one generation counter for the
//! whole table) into the specification's per-chunk model: each table is an
//! array of fixed-size 64 KiB pages, committed lazily, each carrying its own
//! cache-line-padded version counter so unrelated chunks never false-share.
//!
//! Byte-packed components must be blittable. Mirroring the reference
//! engine's own `unsafe impl ZeroCopyComponent for TestComponent` pattern in
//! `ecsdb::storage::table`, callers assert blittability explicitly:
//!
//! ```ignore
//! unsafe impl ByteComponent for Position {}
//! ```
//!
//! # Safety contract
//! `ByteComponent` implementors must have no padding bytes that matter (an
//! all-zero bit pattern must be a valid value) and must not contain any
//! non-'static references, matching the spec's "byte-packed" / blittable
//! requirement. The table never exposes uninitialized memory to safe code:
//! committed pages are zero-filled up front.

use crate::error::{EcsError, Result};
use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use std::cell::UnsafeCell;
use std::marker::PhantomData;
use std::mem::size_of;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// 64 KiB page size, matching the virtual memory allocator's granularity.
pub const CHUNK_SIZE_BYTES: usize = crate::vm::PAGE_SIZE;

/// Marker trait for components eligible for byte-packed (Tier 1) storage.
///
/// # Safety
/// Implementors assert that `Self` is blittable: `Copy`, free of padding
/// bytes that participate in equality/hashing, and valid when all-zero.
pub unsafe trait ByteComponent: Copy + Send + Sync + 'static {}

/// Cache-line-padded version counter, preventing false sharing between
/// adjacent chunks' counters (§4.2, §5.6).
#[repr(align(64))]
struct PaddedVersion(AtomicU32);

impl PaddedVersion {
    fn new() -> Self {
        Self(AtomicU32::new(0))
    }
}

/// Raw byte storage for one committed chunk. Interior mutability is manual:
/// callers are trusted (per the kernel's disjoint-slot discipline, §5.2-5.4)
/// never to write the same slot from two threads concurrently.
struct ChunkBuf {
    bytes: Box<[UnsafeCell<u8>]>,
}

// Safety: disjoint-slot writes are the caller's responsibility, exactly as
// documented for `query_parallel` (§5.2) and command-buffer deferral (§5.3).
unsafe impl Sync for ChunkBuf {}
unsafe impl Send for ChunkBuf {}

impl ChunkBuf {
    fn zeroed(len: usize) -> Self {
        let mut v = Vec::with_capacity(len);
        v.resize_with(len, || UnsafeCell::new(0));
        Self {
            bytes: v.into_boxed_slice(),
        }
    }

    #[inline]
    fn as_mut_ptr(&self) -> *mut u8 {
        self.bytes.as_ptr() as *mut u8
    }

    fn as_slice(&self) -> &[u8] {
        // Safety: `UnsafeCell<u8>` and `u8` share layout; this is a read-only
        // snapshot view used only by the (serialized) snapshot codec path.
        unsafe { std::slice::from_raw_parts(self.as_mut_ptr(), self.bytes.len()) }
    }
}

/// A table of fixed-size records for one registered byte-packed component
/// type, paged into 64 KiB chunks.
pub struct ChunkTable<T: ByteComponent> {
    chunk_capacity: usize,
    record_size: usize,
    max_chunks: usize,
    chunks: Vec<ArcSwapOption<ChunkBuf>>,
    chunk_versions: Vec<PaddedVersion>,
    commit_lock: Mutex<()>,
    _marker: PhantomData<T>,
}

impl<T: ByteComponent> ChunkTable<T> {
    /// Creates a table sized for `max_entities` slots.
    ///
    /// Returns [`EcsError::Overrun`] if `T` is larger than a single page.
    pub fn new(max_entities: usize) -> Result<Self> {
        let record_size = size_of::<T>().max(1);
        if record_size > CHUNK_SIZE_BYTES {
            return Err(EcsError::Overrun {
                size: record_size,
                page_size: CHUNK_SIZE_BYTES,
            });
        }
        let chunk_capacity = CHUNK_SIZE_BYTES / record_size;
        let max_chunks = max_entities.div_ceil(chunk_capacity).max(1);
        let mut chunks = Vec::with_capacity(max_chunks);
        chunks.resize_with(max_chunks, ArcSwapOption::empty);
        let mut chunk_versions = Vec::with_capacity(max_chunks);
        chunk_versions.resize_with(max_chunks, PaddedVersion::new);
        Ok(Self {
            chunk_capacity,
            record_size,
            max_chunks,
            chunks,
            chunk_versions,
            commit_lock: Mutex::new(()),
            _marker: PhantomData,
        })
    }

    #[inline]
    pub fn chunk_capacity(&self) -> usize {
        self.chunk_capacity
    }

    #[inline]
    pub fn total_chunks(&self) -> usize {
        self.max_chunks
    }

    #[inline]
    fn slot_location(&self, slot: u32) -> (usize, usize) {
        let slot = slot as usize;
        (slot / self.chunk_capacity, slot % self.chunk_capacity)
    }

    /// Commits chunk `i` if it is not already committed. Idempotent.
    pub fn ensure_chunk(&self, i: usize) -> Result<()> {
        if i >= self.max_chunks {
            return Err(EcsError::Overrun {
                size: i,
                page_size: self.max_chunks,
            });
        }
        if self.chunks[i].load().is_some() {
            return Ok(());
        }
        let _guard = self.commit_lock.lock();
        if self.chunks[i].load().is_some() {
            return Ok(());
        }
        let buf = ChunkBuf::zeroed(self.chunk_capacity * self.record_size);
        self.chunks[i].store(Some(Arc::new(buf)));
        Ok(())
    }

    pub fn is_chunk_committed(&self, i: usize) -> bool {
        self.chunks.get(i).is_some_and(|c| c.load().is_some())
    }

    /// Writes `value` at `slot`, committing its chunk first if necessary.
    /// Bumps the chunk's version to `global_version` only if it differs,
    /// per §4.2's check-before-write false-sharing avoidance.
    pub fn write(&self, slot: u32, value: T, global_version: u32) -> Result<()> {
        let (i, off) = self.slot_location(slot);
        self.ensure_chunk(i)?;
        let chunk = self.chunks[i].load_full().expect("just committed");
        unsafe {
            let ptr = chunk.as_mut_ptr().add(off * self.record_size) as *mut T;
            std::ptr::write_unaligned(ptr, value);
        }
        self.bump_version(i, global_version);
        Ok(())
    }

    /// Reads the value at `slot` without touching the chunk's version.
    /// Returns the zero-initialized default record if the chunk was never
    /// committed (matching the "zero-initialized after commit" guarantee
    /// without forcing a commit on a read-only path).
    pub fn read(&self, slot: u32) -> T
    where
        T: Default,
    {
        let (i, off) = self.slot_location(slot);
        match self.chunks.get(i).and_then(|c| c.load_full()) {
            Some(chunk) => unsafe {
                let ptr = chunk.as_mut_ptr().add(off * self.record_size) as *const T;
                std::ptr::read_unaligned(ptr)
            },
            None => T::default(),
        }
    }

    /// Mutates the value at `slot` via a short-lived scope token (closure),
    /// the idiomatic Rust realization of the spec's `read_mut -> &mut T`
    /// noted in §9's Design Notes ("encode via a short-lived scope token").
    /// Bumps the chunk version unconditionally, per §4.2 `write`/`read_mut`
    /// symmetry.
    pub fn with_mut<R>(&self, slot: u32, global_version: u32, f: impl FnOnce(&mut T) -> R) -> Result<R> {
        let (i, off) = self.slot_location(slot);
        self.ensure_chunk(i)?;
        let chunk = self.chunks[i].load_full().expect("just committed");
        let r = unsafe {
            let ptr = chunk.as_mut_ptr().add(off * self.record_size) as *mut T;
            let mut tmp = std::ptr::read_unaligned(ptr);
            let r = f(&mut tmp);
            std::ptr::write_unaligned(ptr, tmp);
            r
        };
        self.bump_version(i, global_version);
        Ok(r)
    }

    fn bump_version(&self, chunk_idx: usize, global_version: u32) {
        let slot = &self.chunk_versions[chunk_idx].0;
        if slot.load(Ordering::Relaxed) != global_version {
            slot.store(global_version, Ordering::Relaxed);
        }
    }

    pub fn chunk_version(&self, i: usize) -> u32 {
        self.chunk_versions[i].0.load(Ordering::Relaxed)
    }

    /// Copies chunk `i`'s raw bytes into `out_buf`, then zeroes the copy's
    /// records whose `liveness_bits` entry is clear. Live memory is never
    /// touched; `out_buf` is resized to the chunk's byte length.
    pub fn sanitize_chunk_into_buffer(&self, i: usize, liveness_bits: &[bool], out_buf: &mut Vec<u8>) {
        out_buf.clear();
        let Some(chunk) = self.chunks.get(i).and_then(|c| c.load_full()) else {
            return;
        };
        out_buf.extend_from_slice(chunk.as_slice());
        for (slot_in_chunk, alive) in liveness_bits.iter().enumerate().take(self.chunk_capacity) {
            if !*alive {
                let start = slot_in_chunk * self.record_size;
                let end = start + self.record_size;
                if end <= out_buf.len() {
                    out_buf[start..end].fill(0);
                }
            }
        }
    }

    /// Overwrites chunk `i` with `src`, committing it first if necessary.
    pub fn set_raw_chunk_bytes(&self, i: usize, src: &[u8]) -> Result<()> {
        self.ensure_chunk(i)?;
        let chunk = self.chunks[i].load_full().expect("just committed");
        let len = src.len().min(self.chunk_capacity * self.record_size);
        unsafe {
            std::ptr::copy_nonoverlapping(src.as_ptr(), chunk.as_mut_ptr(), len);
        }
        Ok(())
    }

    /// Zeroes every committed chunk's contents while keeping pages resident
    /// (`Repository::clear`, §4.7).
    pub fn clear_contents(&self) {
        for slot in &self.chunks {
            if let Some(chunk) = slot.load_full() {
                unsafe {
                    std::ptr::write_bytes(chunk.as_mut_ptr(), 0, chunk.bytes.len());
                }
            }
        }
        for v in &self.chunk_versions {
            v.0.store(0, Ordering::Relaxed);
        }
    }

    pub fn record_size(&self) -> usize {
        self.record_size
    }
}

/// Type-erased view over a [`ChunkTable<T>`], used by the snapshot codec and
/// the repository's by-id table registry (§4.7 `get_raw_table`, §4.12).
pub trait RawChunkTable: Send + Sync {
    fn total_chunks(&self) -> usize;
    fn chunk_capacity(&self) -> usize;
    fn record_size(&self) -> usize;
    fn chunk_version(&self, i: usize) -> u32;
    fn is_chunk_committed(&self, i: usize) -> bool;
    fn sanitize_chunk_into_buffer(&self, i: usize, liveness: &[bool], out: &mut Vec<u8>);
    fn set_raw_chunk_bytes(&self, i: usize, src: &[u8]) -> Result<()>;
    fn clear_contents(&self);
}

impl<T: ByteComponent> RawChunkTable for ChunkTable<T> {
    fn total_chunks(&self) -> usize {
        ChunkTable::total_chunks(self)
    }
    fn chunk_capacity(&self) -> usize {
        ChunkTable::chunk_capacity(self)
    }
    fn record_size(&self) -> usize {
        ChunkTable::record_size(self)
    }
    fn chunk_version(&self, i: usize) -> u32 {
        ChunkTable::chunk_version(self, i)
    }
    fn is_chunk_committed(&self, i: usize) -> bool {
        ChunkTable::is_chunk_committed(self, i)
    }
    fn sanitize_chunk_into_buffer(&self, i: usize, liveness: &[bool], out: &mut Vec<u8>) {
        ChunkTable::sanitize_chunk_into_buffer(self, i, liveness, out)
    }
    fn set_raw_chunk_bytes(&self, i: usize, src: &[u8]) -> Result<()> {
        ChunkTable::set_raw_chunk_bytes(self, i, src)
    }
    fn clear_contents(&self) {
        ChunkTable::clear_contents(self)
    }
}

//! Virtual memory allocator (§4.1).
//!
//! Reserves huge address ranges up front and commits 64 KiB pages on demand.
//! Real `mmap`/`VirtualAlloc` reservation semantics require OS-specific unsafe
//! code; this kernel instead reserves a process-heap-backed [`Vec<u8>`] sized
//! to the caller's request and tracks a committed-bytes watermark, giving the
//! same observable contract (stable base address, lazy zero-fill commit,
//! page-granularity accounting) without depending on a syscall binding that
//! the reference engine itself does not carry for this layer. With the
//! `persist` feature, a reservation's committed range can additionally be
//! snapshotted to and restored from a `memmap2`-backed file via
//! [`VirtualReservation::persist_to_file`] / [`VirtualReservation::restore_from_file`],
//! mirroring the reference engine's own `#[cfg(feature = "persist")]
//! BufferStorage::Mmap` variant without replacing the hot commit/write path's
//! `ArcSwap` storage.
//!
//! Grounded on `in-mem-db-core::atomic_buffer::{AtomicBuffer, BufferStorage}`
//! (copy-on-write swap via `ArcSwap`) and `ecsdb::storage::buffer` (commit/
//! generation tracking).

use crate::error::{EcsError, Result};
use arc_swap::ArcSwap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Page granularity. All commits are rounded up to this size.
pub const PAGE_SIZE: usize = 64 * 1024;

#[inline]
fn round_up_to_page(bytes: usize) -> usize {
    (bytes + PAGE_SIZE - 1) / PAGE_SIZE * PAGE_SIZE
}

/// A single virtual memory reservation.
///
/// The backing storage is a `Vec<u8>` sized to the full reservation; bytes
/// beyond `committed_len` are logically "unmapped" and must not be read by
/// callers (enforced by `commit`/`decommit` bookkeeping, not by the OS, since
/// this is a userspace emulation of the reference engine's page allocator).
pub struct VirtualReservation {
    storage: ArcSwap<Vec<u8>>,
    reserved_bytes: usize,
    committed_len: AtomicUsize,
}

impl VirtualReservation {
    /// Reserves `bytes` of address space, rounded up to page granularity.
    /// No physical memory is backing the range until `commit` is called.
    pub fn reserve(bytes: usize) -> Result<Arc<Self>> {
        let reserved = round_up_to_page(bytes.max(1));
        // A real allocator would fail here only if address space is exhausted;
        // we approximate that failure mode for pathologically large requests.
        if reserved > (1usize << 47) {
            return Err(EcsError::OutOfAddressSpace { bytes: reserved });
        }
        Ok(Arc::new(Self {
            storage: ArcSwap::new(Arc::new(Vec::new())),
            reserved_bytes: reserved,
            committed_len: AtomicUsize::new(0),
        }))
    }

    pub fn reserved_bytes(&self) -> usize {
        self.reserved_bytes
    }

    pub fn committed_bytes(&self) -> usize {
        self.committed_len.load(Ordering::Acquire)
    }

    /// Commits `[0, end)` of the reservation if not already committed.
    /// Newly committed bytes are zero-initialized. Re-committing an already
    /// committed range is a no-op.
    pub fn commit(&self, end: usize) -> Result<()> {
        let end = round_up_to_page(end).min(self.reserved_bytes);
        let current = self.committed_len.load(Ordering::Acquire);
        if end <= current {
            return Ok(());
        }
        let mut new_storage = self.storage.load().as_ref().clone();
        if new_storage.len() < end {
            new_storage.resize(end, 0);
        }
        self.storage.store(Arc::new(new_storage));
        self.committed_len.store(end, Ordering::Release);
        Ok(())
    }

    /// Returns pages to the OS without releasing the reservation. Bytes in
    /// `[start, reserved_bytes)` are zeroed and considered uncommitted again.
    pub fn decommit(&self, start: usize) {
        let start = round_up_to_page(start);
        let mut new_storage = self.storage.load().as_ref().clone();
        if start < new_storage.len() {
            new_storage.truncate(start);
            new_storage.shrink_to_fit();
        }
        self.storage.store(Arc::new(new_storage));
        let current = self.committed_len.load(Ordering::Acquire);
        self.committed_len.store(start.min(current), Ordering::Release);
    }

    /// Byte slice over the committed prefix of the reservation.
    pub fn committed_slice(&self) -> Arc<Vec<u8>> {
        self.storage.load_full()
    }

    /// Overwrites `range` with `src`, growing the commit if necessary.
    pub fn write_range(&self, offset: usize, src: &[u8]) -> Result<()> {
        self.commit(offset + src.len())?;
        let mut new_storage = self.storage.load().as_ref().clone();
        new_storage[offset..offset + src.len()].copy_from_slice(src);
        self.storage.store(Arc::new(new_storage));
        Ok(())
    }
}

/// `release` is implicit: dropping the last `Arc<VirtualReservation>` frees
/// the whole range, matching the spec's "release entire reservation" op.
#[cfg(feature = "persist")]
impl VirtualReservation {
    /// Writes the committed prefix of this reservation to `path` through a
    /// mutable memory mapping, giving literal OS-page-backed persistence for
    /// the committed range.
    pub fn persist_to_file(&self, path: impl AsRef<std::path::Path>) -> Result<()> {
        let committed = self.committed_slice();
        let file = std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        file.set_len(committed.len() as u64)?;
        if committed.is_empty() {
            return Ok(());
        }
        let mut mmap = unsafe { memmap2::MmapMut::map_mut(&file)? };
        mmap.copy_from_slice(&committed);
        mmap.flush()?;
        Ok(())
    }

    /// Restores a reservation's committed range from a file previously
    /// written by [`Self::persist_to_file`], via a read-only mapping.
    /// Commits exactly `path`'s length.
    pub fn restore_from_file(&self, path: impl AsRef<std::path::Path>) -> Result<()> {
        let file = std::fs::File::open(path)?;
        let len = file.metadata()?.len() as usize;
        if len == 0 {
            return Ok(());
        }
        let mmap = unsafe { memmap2::Mmap::map(&file)? };
        self.write_range(0, &mmap)
    }
}

//! Query engine: include/exclude/owned/DIS mask matching over entity
//! headers, with full, delta, time-sliced and parallel iteration modes
//! (§4.8).
//!
//! Grounded on `in-mem-db-runtime::runtime::Runtime::tick`'s chunk-skip loop
//! shape and `process_procedures_parallel`'s batch-partitioned `rayon`
//! fan-out, re-targeted from the reference engine's fixed procedure list to
//! an arbitrary entity predicate. The 256-bit mask compare is left as four
//! `u64` word compares rather than introducing `std::simd`: on
//! `target_feature = "avx2"` LLVM already fuses the chain, so there is
//! nothing a nightly-gated intrinsic would buy on stable.

use crate::entity_index::{EntityHandle, EntityIndex, Header};
use crate::mask::Mask256;

/// A query expressed as include/exclude masks plus optional authority and
/// DIS-type constraints (§4.8).
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryDesc {
    include: Mask256,
    exclude: Mask256,
    owned: Option<Mask256>,
    dis: Option<(u64, u64)>, // (target, mask)
}

impl QueryDesc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn include_bit(mut self, bit: u8) -> Self {
        self.include.set(bit);
        self
    }

    pub fn exclude_bit(mut self, bit: u8) -> Self {
        self.exclude.set(bit);
        self
    }

    pub fn owned(mut self, mask: Mask256) -> Self {
        self.owned = Some(mask);
        self
    }

    pub fn dis(mut self, target: u64, mask: u64) -> Self {
        self.dis = Some((target, mask));
        self
    }

    pub fn include_mask(&self) -> Mask256 {
        self.include
    }

    /// The match predicate (§4.8), branchless on the common path.
    #[inline]
    pub fn matches(&self, header: &Header) -> bool {
        header.component_mask.contains_all(&self.include)
            && !header.component_mask.intersects(&self.exclude)
            && self
                .owned
                .is_none_or(|o| header.authority_mask.contains_all(&o))
            && self
                .dis
                .is_none_or(|(target, mask)| (header.dis_type & mask) == (target & mask))
    }
}

/// **Full** iteration: scan every issued slot, skipping uncommitted (empty)
/// chunks outright (§4.8).
pub fn query_full(index: &EntityIndex, q: &QueryDesc, mut visit: impl FnMut(EntityHandle, &Header)) {
    let cap = index.chunk_capacity();
    let max_issued = index.max_issued();
    for c in 0..index.total_header_chunks() {
        if !index.is_chunk_committed(c) {
            continue;
        }
        for i in 0..cap {
            let slot = (c * cap + i) as u32;
            if slot >= max_issued {
                break;
            }
            let header = index.header(slot);
            if header.is_active() && q.matches(&header) {
                visit(
                    EntityHandle {
                        index: slot,
                        generation: header.generation,
                    },
                    &header,
                );
            }
        }
    }
}

/// **Delta** iteration: skip chunks whose header version AND every
/// queried-component's table version are `<= baseline`; within a surviving
/// chunk, emit slots whose own `last_change_tick` or referenced table
/// version exceeds `baseline` (§4.8).
///
/// `referenced_chunk_version(c)` must return the maximum chunk version,
/// across every component table this query's include mask touches, for
/// header chunk `c` — the repository computes this by probing its own
/// registered tables, keeping this function decoupled from table storage.
pub fn query_delta(
    index: &EntityIndex,
    q: &QueryDesc,
    baseline: u32,
    referenced_chunk_version: impl Fn(usize) -> u32,
    mut visit: impl FnMut(EntityHandle, &Header),
) {
    let cap = index.chunk_capacity();
    let max_issued = index.max_issued();
    for c in 0..index.total_header_chunks() {
        if !index.is_chunk_committed(c) {
            continue;
        }
        let ref_version = referenced_chunk_version(c);
        if index.chunk_version(c) <= baseline && ref_version <= baseline {
            continue;
        }
        for i in 0..cap {
            let slot = (c * cap + i) as u32;
            if slot >= max_issued {
                break;
            }
            let header = index.header(slot);
            if !header.is_active() || !q.matches(&header) {
                continue;
            }
            if header.last_change_tick > baseline || ref_version > baseline {
                visit(
                    EntityHandle {
                        index: slot,
                        generation: header.generation,
                    },
                    &header,
                );
            }
        }
    }
}

/// Resumable cursor for [`query_time_sliced`] (§4.8).
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeSliceState {
    pub chunk_idx: usize,
    pub slot_idx: usize,
    pub done: bool,
}

impl TimeSliceState {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Budget metric for time-sliced iteration (§4.8).
#[derive(Debug, Clone, Copy)]
pub enum TimeSliceMetric {
    WallClockMs(u64),
    EntityCount(usize),
}

/// **Time-sliced** iteration: resumes from `state`, stops once `budget` is
/// exceeded, persisting `state` for the next call (§4.8). Visits at least
/// one slot per call even if the budget is already exhausted, so a
/// pathologically small budget cannot stall forever.
pub fn query_time_sliced(
    index: &EntityIndex,
    q: &QueryDesc,
    state: &mut TimeSliceState,
    budget: TimeSliceMetric,
    mut visit: impl FnMut(EntityHandle, &Header),
) {
    let cap = index.chunk_capacity();
    let max_issued = index.max_issued();
    let total_chunks = index.total_header_chunks();
    let start = std::time::Instant::now();
    let mut processed = 0usize;

    while state.chunk_idx < total_chunks {
        if !index.is_chunk_committed(state.chunk_idx) {
            state.chunk_idx += 1;
            state.slot_idx = 0;
            continue;
        }
        while state.slot_idx < cap {
            let slot = (state.chunk_idx * cap + state.slot_idx) as u32;
            state.slot_idx += 1;
            if slot >= max_issued {
                break;
            }
            let header = index.header(slot);
            if header.is_active() && q.matches(&header) {
                visit(
                    EntityHandle {
                        index: slot,
                        generation: header.generation,
                    },
                    &header,
                );
                processed += 1;
            }
            let exceeded = match budget {
                TimeSliceMetric::WallClockMs(ms) => start.elapsed().as_millis() as u64 >= ms,
                TimeSliceMetric::EntityCount(n) => processed >= n,
            };
            if exceeded {
                return;
            }
        }
        state.slot_idx = 0;
        state.chunk_idx += 1;
    }
    state.done = true;
}

/// Parallel batch-size hint (§4.8), mirroring `in-mem-db-runtime`'s
/// procedure-weight classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParallelHint {
    Light,
    Medium,
    Heavy,
    VeryHeavy,
}

impl ParallelHint {
    fn chunks_per_batch(self) -> usize {
        match self {
            ParallelHint::Light => 16,
            ParallelHint::Medium => 8,
            ParallelHint::Heavy => 4,
            ParallelHint::VeryHeavy => 1,
        }
    }
}

/// Below this many candidate slots, parallel dispatch is not worth its
/// overhead and the engine falls back to serial (§4.8).
const PARALLEL_THRESHOLD_SLOTS: usize = 1024;

fn committed_chunks(index: &EntityIndex) -> Vec<usize> {
    (0..index.total_header_chunks())
        .filter(|&c| index.is_chunk_committed(c))
        .collect()
}

fn scan_chunk(index: &EntityIndex, q: &QueryDesc, c: usize, handler: &(impl Fn(EntityHandle, &Header) + Sync)) {
    let cap = index.chunk_capacity();
    let max_issued = index.max_issued();
    for i in 0..cap {
        let slot = (c * cap + i) as u32;
        if slot >= max_issued {
            break;
        }
        let header = index.header(slot);
        if header.is_active() && q.matches(&header) {
            handler(
                EntityHandle {
                    index: slot,
                    generation: header.generation,
                },
                &header,
            );
        }
    }
}

/// **Parallel** iteration: partitions committed chunks into batches sized by
/// `hint`, processed with `rayon` (`parallel` feature). Disjoint slots per
/// thread; falls back to serial under [`PARALLEL_THRESHOLD_SLOTS`] (§4.8,
/// §5.2's disjoint-slot-write discipline).
#[cfg(feature = "parallel")]
pub fn query_parallel(
    index: &EntityIndex,
    q: &QueryDesc,
    hint: ParallelHint,
    handler: impl Fn(EntityHandle, &Header) + Sync,
) {
    use rayon::prelude::*;

    let chunks = committed_chunks(index);
    if chunks.len() * index.chunk_capacity() < PARALLEL_THRESHOLD_SLOTS {
        for c in chunks {
            scan_chunk(index, q, c, &handler);
        }
        return;
    }
    chunks
        .par_chunks(hint.chunks_per_batch())
        .for_each(|batch| {
            for &c in batch {
                scan_chunk(index, q, c, &handler);
            }
        });
}

#[cfg(not(feature = "parallel"))]
pub fn query_parallel(
    index: &EntityIndex,
    q: &QueryDesc,
    _hint: ParallelHint,
    handler: impl Fn(EntityHandle, &Header) + Sync,
) {
    for c in committed_chunks(index) {
        scan_chunk(index, q, c, &handler);
    }
}

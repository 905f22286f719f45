//! Payload slot allocator (§4.2): region-based, to keep workers from
//! contending on the same cache lines while claiming slots.
//!
//! `my_region` is the re-architected version of the design note in §9:
//! instead of a single process-wide `thread_local!` (which would make two
//! tables in one process share allocation state), each `Allocator` owns a
//! small per-worker map from the calling thread's identity to its current
//! region, the same way this codebase already keeps per-key state in a
//! `DashMap` rather than a global.

use crate::bitmap::AtomicBitmap;
use crate::config::REGION_SLOTS;
use crate::error::Result;
use crate::memory::anon_provider;
use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::thread::ThreadId;

const NONE: i64 = -1;
/// Index 0 and 1 are permanently reserved (never handed out as a payload
/// index). Every sweep that walks the full index range must start past
/// this many slots, or it will see them as occupied-but-never-marked and
/// try to reclaim them.
pub const RESERVED_SLOTS: usize = 2;

pub struct Allocator {
    /// One bit per region: is it owned by some worker right now.
    bitmap1: AtomicBitmap,
    /// One bit per payload slot: is it occupied (filled or reserved).
    bitmap2: AtomicBitmap,
    max_size: usize,
    region_count: usize,
    /// worker's current region, or `NONE`. Keyed by calling thread rather
    /// than a bare `thread_local!` so the allocator (and thus the table) is
    /// the sole owner of this state.
    my_region: DashMap<ThreadId, AtomicI64>,
    /// Stable small ordinal assigned to each thread the first time it
    /// allocates, used only for the first-use spreading heuristic.
    ordinals: DashMap<ThreadId, usize>,
    next_ordinal: AtomicUsize,
    occupied_count: AtomicI64,
}

impl Allocator {
    pub fn new(max_size: usize) -> Result<Self> {
        let region_count = max_size.div_ceil(REGION_SLOTS).max(1);
        let bitmap1_bytes = region_count.div_ceil(64) * 8;
        let bitmap2_bytes = max_size.max(RESERVED_SLOTS).div_ceil(64) * 8;
        let bitmap2 = AtomicBitmap::new(anon_provider(bitmap2_bytes)?);
        // bitmap2[0] = 0xC000...: reserve indices 0 and 1.
        bitmap2.set_or(0, Ordering::Relaxed);
        bitmap2.set_or(1, Ordering::Relaxed);
        Ok(Self {
            bitmap1: AtomicBitmap::new(anon_provider(bitmap1_bytes)?),
            bitmap2,
            max_size,
            region_count,
            my_region: DashMap::new(),
            ordinals: DashMap::new(),
            next_ordinal: AtomicUsize::new(0),
            occupied_count: AtomicI64::new(RESERVED_SLOTS as i64),
        })
    }

    /// Number of currently occupied slots, including the two reserved ones.
    pub fn occupied_count(&self) -> u64 {
        self.occupied_count.load(Ordering::Relaxed).max(0) as u64
    }

    pub fn is_occupied(&self, index: u64) -> bool {
        self.bitmap2.test(index as usize, Ordering::Acquire)
    }

    /// Mark `index` occupied unconditionally. Used by the rehash sweep,
    /// which already knows the slot is live and holds exclusive access to
    /// bitmap1/bitmap2 (no concurrent allocator callers during GC).
    pub fn mark_occupied_exclusive(&self, index: u64) {
        self.bitmap2.set_or(index as usize, Ordering::Relaxed);
        self.occupied_count.fetch_add(1, Ordering::Relaxed);
    }

    fn ordinal_for(&self, thread: ThreadId) -> usize {
        if let Some(o) = self.ordinals.get(&thread) {
            return *o;
        }
        let o = self.next_ordinal.fetch_add(1, Ordering::Relaxed);
        self.ordinals.entry(thread).or_insert(o);
        o
    }

    /// Claim a fresh payload slot for the calling thread. Returns `None` if
    /// the table is full (every region scanned once with no free slot).
    pub fn allocate(&self, table_size: u64) -> Option<u64> {
        let thread = std::thread::current().id();
        let region_cell = self
            .my_region
            .entry(thread)
            .or_insert_with(|| AtomicI64::new(NONE));
        let mut region = region_cell.load(Ordering::Relaxed);

        if region != NONE {
            if let Some(bit) = self.bitmap2.find_clear_in_region(region as usize, Ordering::Relaxed) {
                self.bitmap2.set_or(bit, Ordering::Relaxed);
                self.occupied_count.fetch_add(1, Ordering::Relaxed);
                return Some(bit as u64);
            }
        }

        // Current region (if any) is full; scan bitmap1 for an unowned one.
        let worker_count = self.ordinals.len().max(1);
        let ordinal = self.ordinal_for(thread);
        let regions_in_play = (table_size as usize).div_ceil(REGION_SLOTS).clamp(1, self.region_count);
        let start = (ordinal * regions_in_play) / worker_count.max(1);

        for offset in 0..self.region_count {
            let candidate = (start + offset) % self.region_count;
            if self.bitmap1.set_cas(candidate, Ordering::AcqRel) {
                region = candidate as i64;
                region_cell.store(region, Ordering::Relaxed);
                if let Some(bit) = self.bitmap2.find_clear_in_region(candidate, Ordering::Relaxed) {
                    self.bitmap2.set_or(bit, Ordering::Relaxed);
                    self.occupied_count.fetch_add(1, Ordering::Relaxed);
                    return Some(bit as u64);
                }
                // Claimed region but it was already full (can happen if a
                // prior owner filled it completely then abandoned it
                // without a clear in between) -- keep scanning.
            }
        }
        None
    }

    /// Release a speculatively reserved slot whose directory CAS lost to a
    /// concurrent equal-payload insert.
    pub fn release(&self, index: u64) {
        self.bitmap2.clear_and(index as usize, Ordering::Release);
        self.occupied_count.fetch_sub(1, Ordering::Relaxed);
    }

    /// Number of set bits in bitmap2 over `[first, first+count)`.
    pub fn count_occupied_range(&self, first: usize, count: usize) -> u64 {
        self.bitmap2.count_ones_range(first, count, Ordering::Acquire)
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Reset region ownership for a new GC epoch: remap/zero `bitmap1` and
    /// every worker's `my_region`. Occupancy (`bitmap2`) is left untouched
    /// here — survivors are carried over by a `reap_sweep` run first, which
    /// releases every occupied-but-unmarked slot individually and leaves
    /// marked ones (and the two reserved indices) set.
    ///
    /// Returns `true` if `bitmap1` was cleared via a fixed-address remap,
    /// `false` if it fell back to a write pass, so the caller can log the
    /// fallback.
    pub fn clear_regions(&self) -> bool {
        let remapped = self.bitmap1.clear_all();
        for entry in self.my_region.iter() {
            entry.value().store(NONE, Ordering::Relaxed);
        }
        remapped
    }

    pub fn bitmap2(&self) -> &AtomicBitmap {
        &self.bitmap2
    }

    /// Hint `bitmap1` for random access, mirroring the same NUMA-interleave
    /// request the directory gets: region ownership scans have no more
    /// spatial locality than directory probes do.
    pub fn advise_random(&self) {
        self.bitmap1.advise_random();
    }
}

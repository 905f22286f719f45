//! Hash directory and probe engine (§4.1): CAS-based insertion with a
//! cache-line-bounded linear probe that re-mixes and restarts on a full
//! line, plus the contention-free rehash variant used during GC.

use crate::allocator::Allocator;
use crate::error::Result;
use crate::hash::{directory_start, mix, pack, remix, tag_of, unpack};
use crate::memory::{anon_provider, MemoryProvider};
use crate::payload::PayloadStore;
use parking_lot::RwLock;
use std::sync::atomic::Ordering;

/// `0` is never a valid index (0 and 1 are reserved), so it doubles as the
/// failure sentinel for both exhausted probes and a full table.
pub const FAIL: u64 = 0;

/// One directory slot per word. Wrapped in a `parking_lot::RwLock` the same
/// way `AtomicBitmap` is: every probe takes a read lock (the CAS underneath
/// is what makes concurrent publication safe), and only `clear`, which may
/// swap the backing region out via a fixed-address remap, takes the write
/// lock.
pub struct Directory {
    mem: RwLock<Box<dyn MemoryProvider>>,
}

#[inline(always)]
fn next_in_line(idx: u64, line_words: u64) -> u64 {
    (idx & !(line_words - 1)) | ((idx.wrapping_add(1)) & (line_words - 1))
}

impl Directory {
    pub fn new(capacity: usize) -> Result<Self> {
        let bytes = capacity.max(1) * 8;
        Ok(Self { mem: RwLock::new(anon_provider(bytes)?) })
    }

    pub fn capacity(&self) -> usize {
        self.mem.read().len() / 8
    }

    /// Re-zero every slot for a new GC epoch, preferring a fixed-address
    /// remap over a write pass (§4.5, §9). Returns `true` if a remap was
    /// used, `false` if it fell back to a write pass.
    pub fn clear(&self) -> bool {
        self.mem.write().zero_fill().unwrap_or(false)
    }

    /// Hint the backing region for random access: directory probes have no
    /// spatial locality, so a sequential-access readahead policy only hurts.
    pub fn advise_random(&self) {
        self.mem.read().advise_random();
    }

    /// Lookup-or-insert using `hash` as the starting hash and `eq` to
    /// compare a candidate payload against `(a, b)` when tags match.
    /// `on_created` is invoked once, after the directory CAS succeeds, so
    /// the caller can set the custom-hash liveness bit without doing so
    /// speculatively for an entry that turns out to already exist.
    #[allow(clippy::too_many_arguments)]
    pub fn lookup_or_insert(
        &self,
        a: u64,
        b: u64,
        mut hash: u64,
        table_size: u64,
        mask_mode: bool,
        line_words: u64,
        threshold: usize,
        allocator: &Allocator,
        payload: &PayloadStore,
        eq: impl Fn(u64, u64, u64, u64) -> bool,
        mut on_created: impl FnMut(u64),
    ) -> (u64, bool) {
        let mut reserved: Option<u64> = None;
        let guard = self.mem.read();
        let slots = guard.as_u64_slice();

        for _ in 0..threshold {
            let tag = tag_of(hash);
            let mut idx = directory_start(hash, table_size, mask_mode);

            for _ in 0..line_words {
                let slot = &slots[idx as usize];
                let mut word = slot.load(Ordering::Acquire);

                if word == 0 {
                    let index = match reserved {
                        Some(i) => i,
                        None => match allocator.allocate(table_size) {
                            Some(i) => {
                                reserved = Some(i);
                                i
                            }
                            None => return (FAIL, false),
                        },
                    };
                    payload.write(index, a, b);
                    let new_word = pack(tag, index);
                    match slot.compare_exchange(0, new_word, Ordering::AcqRel, Ordering::Acquire) {
                        Ok(_) => {
                            reserved = None;
                            on_created(index);
                            return (index, true);
                        }
                        Err(observed) => word = observed,
                    }
                }

                if word != 0 {
                    let (t, i) = unpack(word);
                    if t == tag {
                        let (a2, b2) = payload.read(i);
                        if eq(a, b, a2, b2) {
                            if let Some(r) = reserved.take() {
                                allocator.release(r);
                            }
                            return (i, false);
                        }
                    }
                }

                idx = next_in_line(idx, line_words);
            }

            hash = remix(hash);
        }

        if let Some(r) = reserved.take() {
            allocator.release(r);
        }
        (FAIL, false)
    }

    /// Re-publish a known-live payload during GC. No equality check is
    /// performed: the source table's uniqueness invariant guarantees no two
    /// live payloads are equal, so a non-empty slot encountered here always
    /// belongs to a different entry and the probe simply continues. A CAS
    /// is still used because the parallel rehash sweep (§4.4) runs many
    /// payloads through this same directory concurrently.
    pub fn rehash_insert(
        &self,
        index: u64,
        mut hash: u64,
        table_size: u64,
        mask_mode: bool,
        line_words: u64,
        threshold: usize,
    ) -> bool {
        let guard = self.mem.read();
        let slots = guard.as_u64_slice();
        for _ in 0..threshold {
            let tag = tag_of(hash);
            let published = pack(tag, index);
            let mut idx = directory_start(hash, table_size, mask_mode);

            for _ in 0..line_words {
                let slot = &slots[idx as usize];
                if slot
                    .compare_exchange(0, published, Ordering::AcqRel, Ordering::Relaxed)
                    .is_ok()
                {
                    return true;
                }
                idx = next_in_line(idx, line_words);
            }

            hash = remix(hash);
        }
        false
    }

    pub fn read(&self, idx: u64) -> u64 {
        self.mem.read().as_u64_slice()[idx as usize].load(Ordering::Acquire)
    }
}

/// Default mixer + equality wired up for `lookup`.
pub fn default_hash(seed: u64, a: u64, b: u64) -> u64 {
    mix(seed, a, b)
}

pub fn default_eq(a1: u64, b1: u64, a2: u64, b2: u64) -> bool {
    a1 == a2 && b1 == b2
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::Allocator;
    use crate::hash::DEFAULT_SEED;
    use crate::memory::VecMemoryProvider;
    use crate::payload::PayloadStore;

    fn fresh(table_size: u64) -> (Directory, Allocator, PayloadStore) {
        let dir = Directory::new(table_size as usize).unwrap();
        let alloc = Allocator::new(table_size as usize).unwrap();
        let payload = PayloadStore::new(Box::new(VecMemoryProvider::new(table_size as usize * 16).unwrap()));
        (dir, alloc, payload)
    }

    #[test]
    fn insert_then_lookup_dedups() {
        let (dir, alloc, payload) = fresh(512);
        let h = default_hash(DEFAULT_SEED, 7, 11);
        let (i1, created1) = dir.lookup_or_insert(7, 11, h, 512, true, 8, 20, &alloc, &payload, default_eq, |_| {});
        assert!(created1);
        assert!(i1 >= 2);

        let (i2, created2) = dir.lookup_or_insert(7, 11, h, 512, true, 8, 20, &alloc, &payload, default_eq, |_| {});
        assert!(!created2);
        assert_eq!(i1, i2);

        let h2 = default_hash(DEFAULT_SEED, 7, 12);
        let (i3, created3) = dir.lookup_or_insert(7, 12, h2, 512, true, 8, 20, &alloc, &payload, default_eq, |_| {});
        assert!(created3);
        assert_ne!(i1, i3);
    }

    #[test]
    fn fills_without_silent_duplication() {
        let (dir, alloc, payload) = fresh(512);
        let mut indices = std::collections::HashSet::new();
        let mut successes = 0;
        for i in 0..510u64 {
            let h = default_hash(DEFAULT_SEED, i, i * 7 + 1);
            let (idx, created) = dir.lookup_or_insert(i, i * 7 + 1, h, 512, true, 8, 40, &alloc, &payload, default_eq, |_| {});
            if idx != FAIL {
                assert!(created);
                assert!(indices.insert(idx), "duplicate index handed out");
                successes += 1;
            }
        }
        assert!(successes >= 400, "expected the vast majority of 510 inserts to succeed, got {successes}");
    }

    #[test]
    fn rehash_round_trip_preserves_lookup() {
        let (dir, alloc, payload) = fresh(512);
        let pairs = [(1u64, 1u64), (2, 2), (3, 3)];
        let mut indices = Vec::new();
        for &(a, b) in &pairs {
            let h = default_hash(DEFAULT_SEED, a, b);
            let (idx, created) = dir.lookup_or_insert(a, b, h, 512, true, 8, 20, &alloc, &payload, default_eq, |_| {});
            assert!(created);
            indices.push(idx);
        }

        dir.clear();
        for (&(a, b), &idx) in pairs.iter().zip(indices.iter()) {
            let h = default_hash(DEFAULT_SEED, a, b);
            assert!(dir.rehash_insert(idx, h, 512, true, 8, 20));
        }

        for (&(a, b), &idx) in pairs.iter().zip(indices.iter()) {
            let h = default_hash(DEFAULT_SEED, a, b);
            let (found, created) = dir.lookup_or_insert(a, b, h, 512, true, 8, 20, &alloc, &payload, default_eq, |_| {});
            assert!(!created);
            assert_eq!(found, idx);
        }
    }
}

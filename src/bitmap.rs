//! MSB-first atomic bitmap over a `MemoryProvider`-backed word array.
//!
//! Bit `k` of word `w` refers to global position `64*w + k`; the mask for
//! bit `k` is `0x8000_0000_0000_0000 >> k`. This ordering is load-bearing:
//! the region allocator's "find a free slot" scan depends on
//! `leading_zeros` of the *complement* of a word landing on the same bit
//! position the MSB-first convention assigns it.
//!
//! The backing store sits behind a `parking_lot::RwLock`, the same
//! read-for-hot-path/write-for-exclusive-phase split this codebase already
//! documents for `MmapHashIndex`: every atomic bit operation takes a read
//! lock (cheap and uncontended — the atomics underneath are what actually
//! make concurrent access safe), and only `clear_all`, which may swap the
//! whole backing region out from under readers via a fixed-address remap,
//! takes the write lock.

use crate::memory::MemoryProvider;
use parking_lot::RwLock;
use std::sync::atomic::Ordering;

#[inline(always)]
fn word_and_mask(bit: usize) -> (usize, u64) {
    let word = bit / 64;
    let k = bit % 64;
    (word, 0x8000_0000_0000_0000u64 >> k)
}

/// A fixed-length bitmap backed by atomic words, addressed MSB-first.
pub struct AtomicBitmap {
    mem: RwLock<Box<dyn MemoryProvider>>,
}

impl AtomicBitmap {
    pub fn new(mem: Box<dyn MemoryProvider>) -> Self {
        Self { mem: RwLock::new(mem) }
    }

    pub fn word_count(&self) -> usize {
        self.mem.read().len() / 8
    }

    #[inline]
    pub fn test(&self, bit: usize, order: Ordering) -> bool {
        let (w, mask) = word_and_mask(bit);
        self.mem.read().as_u64_slice()[w].load(order) & mask != 0
    }

    /// Plain OR-in, for use when the caller holds exclusive ownership of the
    /// word (e.g. a worker writing into a region it alone owns).
    #[inline]
    pub fn set_or(&self, bit: usize, order: Ordering) {
        let (w, mask) = word_and_mask(bit);
        self.mem.read().as_u64_slice()[w].fetch_or(mask, order);
    }

    #[inline]
    pub fn clear_and(&self, bit: usize, order: Ordering) {
        let (w, mask) = word_and_mask(bit);
        self.mem.read().as_u64_slice()[w].fetch_and(!mask, order);
    }

    /// CAS-based set; returns `true` if this call was the one that flipped
    /// the bit from 0 to 1 (first setter wins).
    pub fn set_cas(&self, bit: usize, order: Ordering) -> bool {
        let (w, mask) = word_and_mask(bit);
        let guard = self.mem.read();
        let word = &guard.as_u64_slice()[w];
        let mut cur = word.load(Ordering::Relaxed);
        loop {
            if cur & mask != 0 {
                return false;
            }
            match word.compare_exchange_weak(cur, cur | mask, order, Ordering::Relaxed) {
                Ok(_) => return true,
                Err(observed) => cur = observed,
            }
        }
    }

    /// Re-zero the whole bitmap for a new epoch. Prefers a fixed-address
    /// remap (§4.5, §9); falls back to a zero-fill pass if the provider
    /// can't remap. Returns `true` if a remap was used.
    pub fn clear_all(&self) -> bool {
        self.mem.write().zero_fill().unwrap_or(false)
    }

    /// Hint the backing region for random access (see `Directory::advise_random`).
    pub fn advise_random(&self) {
        self.mem.read().advise_random();
    }

    /// Number of set bits in `[first, first+count)`.
    pub fn count_ones_range(&self, first: usize, count: usize, order: Ordering) -> u64 {
        if count == 0 {
            return 0;
        }
        let guard = self.mem.read();
        let words = guard.as_u64_slice();
        let last = first + count - 1;
        let (w0, _) = word_and_mask(first);
        let (w1, _) = word_and_mask(last);
        let mut total = 0u64;
        for w in w0..=w1 {
            let word = words[w].load(order);
            let word_lo = w * 64;
            let lo_bit = first.max(word_lo) - word_lo;
            let hi_bit = last.min(word_lo + 63) - word_lo;
            let width = hi_bit - lo_bit + 1;
            // MSB-first: bit position k within the word is (63 - k) from the
            // LSB. Build a mask covering [lo_bit, hi_bit] in that convention.
            let mask = if width == 64 {
                u64::MAX
            } else {
                let shift_from_top = lo_bit;
                let run = (1u64 << width) - 1;
                run << (64 - width - shift_from_top)
            };
            total += (word & mask).count_ones() as u64;
        }
        total
    }

    /// Scan the 8 consecutive words `[region*8, region*8+8)` for a clear bit,
    /// returning the global bit index of the first one found (MSB-first scan
    /// order within each word, lowest word index first). `region` is the
    /// 512-slot allocation granularity (8 words * 64 bits = 512 bits).
    pub fn find_clear_in_region(&self, region: usize, order: Ordering) -> Option<usize> {
        let guard = self.mem.read();
        let words = guard.as_u64_slice();
        let base_word = region * 8;
        for w in base_word..base_word + 8 {
            let word = words.get(w)?.load(order);
            if word != u64::MAX {
                // leading_zeros of the complement gives the index of the
                // highest-order (i.e. first, under MSB-first) clear bit.
                let k = (!word).leading_zeros() as usize;
                return Some(w * 64 + k);
            }
        }
        None
    }
}

//! Memory provider abstraction: large anonymous allocations that can be
//! zeroed in place, plus a fallback that doesn't touch the OS at all.
//!
//! Grounded in this codebase's `arena.rs`, which already reserves
//! `memmap2::MmapMut` regions up front and writes into them with raw
//! pointer arithmetic. Here the provider is pulled out behind a trait so
//! the table can run against either a real mmap (matching §6's "memory
//! provider" collaborator, including remap-based zeroing) or a plain
//! `Vec<u8>` for tests and for callers who don't want a backing file
//! descriptor at all.

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};

/// A resizable, zeroable block of raw memory, addressed by byte offset.
///
/// Implementors must guarantee the region is zero-initialized on creation
/// and that `as_u64_slice`/`as_u64_slice_mut` are valid for the full
/// allocated length (a whole number of `u64` words).
pub trait MemoryProvider: Send + Sync {
    /// Total length in bytes.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw 64-bit word view of the whole region.
    fn as_u64_slice(&self) -> &[AtomicU64];

    /// Re-zero the whole region. Implementations backed by mmap prefer a
    /// fixed-address anonymous remap (cheaper than touching every page);
    /// implementations that cannot do that fall back to a plain write pass.
    /// Returns `Ok(true)` if a remap was used, `Ok(false)` if it fell back
    /// to zero-filling, `Err` only on an unrecoverable OS failure.
    fn zero_fill(&mut self) -> io::Result<bool>;

    /// Hint that the region will be accessed randomly (directory scans do
    /// not have spatial locality). Best-effort; providers that cannot act
    /// on it simply ignore the call.
    fn advise_random(&self) {}
}

/// Anonymous-mmap-backed provider. Used for the directory, payload store
/// and bitmaps in production: the region is reserved once at `max_size`
/// and `zero_fill` remaps it rather than writing every byte.
pub struct MmapMemoryProvider {
    mmap: memmap2::MmapMut,
}

impl MmapMemoryProvider {
    pub fn new(bytes: usize) -> io::Result<Self> {
        let words = bytes.div_ceil(8).max(1);
        let mmap = memmap2::MmapOptions::new().len(words * 8).map_anon()?;
        Ok(Self { mmap })
    }
}

impl MemoryProvider for MmapMemoryProvider {
    fn len(&self) -> usize {
        self.mmap.len()
    }

    fn as_u64_slice(&self) -> &[AtomicU64] {
        // SAFETY: the mapping is 8-byte-aligned (mmap pages are always
        // page-aligned, far stricter than 8), `AtomicU64` has the same size
        // and representation as `u64`, and all writers go through this same
        // atomic view, so there is no concurrent non-atomic access to race with.
        let ptr = self.mmap.as_ptr() as *const AtomicU64;
        let n = self.mmap.len() / 8;
        unsafe { std::slice::from_raw_parts(ptr, n) }
    }

    fn zero_fill(&mut self) -> io::Result<bool> {
        match memmap2::MmapOptions::new().len(self.mmap.len()).map_anon() {
            Ok(fresh) => {
                self.mmap = fresh;
                Ok(true)
            }
            Err(_) => {
                for w in self.as_u64_slice() {
                    w.store(0, Ordering::Relaxed);
                }
                Ok(false)
            }
        }
    }

    fn advise_random(&self) {
        #[cfg(all(unix, feature = "numa-hints"))]
        {
            let _ = self.mmap.advise(memmap2::Advice::Random);
        }
    }
}

/// Reserve an anonymous mmap region of exactly `bytes` (rounded up to a
/// whole number of words). The single construction point every large,
/// remap-clearable region in the table goes through: the directory, both
/// allocator bitmaps, and the liveness bitmaps, in addition to the payload
/// store.
pub fn anon_provider(bytes: usize) -> io::Result<Box<dyn MemoryProvider>> {
    Ok(Box::new(MmapMemoryProvider::new(bytes)?))
}

/// Plain heap-backed provider: no file descriptor, no madvise, `zero_fill`
/// always does a real write pass. Used by tests and by embedders that run
/// on platforms without anonymous mmap.
pub struct VecMemoryProvider {
    words: Box<[AtomicU64]>,
}

impl VecMemoryProvider {
    pub fn new(bytes: usize) -> io::Result<Self> {
        let n = bytes.div_ceil(8).max(1);
        let words = (0..n).map(|_| AtomicU64::new(0)).collect();
        Ok(Self { words })
    }
}

impl MemoryProvider for VecMemoryProvider {
    fn len(&self) -> usize {
        self.words.len() * 8
    }

    fn as_u64_slice(&self) -> &[AtomicU64] {
        &self.words
    }

    fn zero_fill(&mut self) -> io::Result<bool> {
        for w in self.words.iter() {
            w.store(0, Ordering::Relaxed);
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mmap_provider_starts_zeroed_and_remaps_clean() {
        let mut p = MmapMemoryProvider::new(4096).unwrap();
        p.as_u64_slice()[3].store(0xdead_beef, Ordering::Relaxed);
        assert_eq!(p.as_u64_slice()[3].load(Ordering::Relaxed), 0xdead_beef);
        let remapped = p.zero_fill().unwrap();
        assert!(remapped);
        assert_eq!(p.as_u64_slice()[3].load(Ordering::Relaxed), 0);
    }

    #[test]
    fn vec_provider_zero_fills_in_place() {
        let mut p = VecMemoryProvider::new(64).unwrap();
        p.as_u64_slice()[0].store(42, Ordering::Relaxed);
        let remapped = p.zero_fill().unwrap();
        assert!(!remapped);
        assert_eq!(p.as_u64_slice()[0].load(Ordering::Relaxed), 0);
    }
}

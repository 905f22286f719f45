//! Liveness bitmaps (§4.3): mark, notify-on-death, and custom-hash, each a
//! dedicated bit plane rather than overlaid on occupancy (§9's resolution
//! of the custom-bucket aliasing open question).

use crate::bitmap::AtomicBitmap;
use crate::error::Result;
use crate::memory::anon_provider;
use std::sync::atomic::Ordering;

pub struct Liveness {
    mark: AtomicBitmap,
    notify: AtomicBitmap,
    custom: AtomicBitmap,
}

impl Liveness {
    pub fn new(max_size: usize) -> Result<Self> {
        let bytes = max_size.max(1).div_ceil(64) * 8;
        Ok(Self {
            mark: AtomicBitmap::new(anon_provider(bytes)?),
            notify: AtomicBitmap::new(anon_provider(bytes)?),
            custom: AtomicBitmap::new(anon_provider(bytes)?),
        })
    }

    /// Sets the mark bit; returns `true` iff this call was the first setter
    /// this epoch.
    pub fn mark(&self, index: u64) -> bool {
        self.mark.set_cas(index as usize, Ordering::AcqRel)
    }

    pub fn is_marked(&self, index: u64) -> bool {
        self.mark.test(index as usize, Ordering::Acquire)
    }

    pub fn request_notify(&self, index: u64) {
        self.notify.set_or(index as usize, Ordering::Release);
    }

    pub fn is_notify_requested(&self, index: u64) -> bool {
        self.notify.test(index as usize, Ordering::Acquire)
    }

    pub fn clear_notify(&self, index: u64) {
        self.notify.clear_and(index as usize, Ordering::Release);
    }

    pub fn set_custom(&self, index: u64) {
        self.custom.set_or(index as usize, Ordering::Release);
    }

    pub fn is_custom(&self, index: u64) -> bool {
        self.custom.test(index as usize, Ordering::Acquire)
    }

    pub fn count_marked_range(&self, first: usize, count: usize) -> u64 {
        self.mark.count_ones_range(first, count, Ordering::Acquire)
    }

    /// New GC epoch: mark bits are scoped to one epoch and are zeroed by
    /// `clear`; notify requests and custom-hash flags persist across epochs
    /// (a client re-requests notify per slot it still cares about, but the
    /// custom-hash flag for a surviving payload must still be readable by
    /// the rehash sweep that re-inserts it).
    pub fn clear_epoch(&self) {
        self.mark.clear_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mark_is_idempotent_first_setter_wins() {
        let liv = Liveness::new(64).unwrap();
        assert!(liv.mark(3));
        assert!(!liv.mark(3));
        assert!(liv.is_marked(3));
    }

    #[test]
    fn clear_epoch_resets_marks_only() {
        let liv = Liveness::new(64).unwrap();
        liv.mark(3);
        liv.set_custom(3);
        liv.request_notify(5);
        liv.clear_epoch();
        assert!(!liv.is_marked(3));
        assert!(liv.is_custom(3));
        assert!(liv.is_notify_requested(5));
    }
}

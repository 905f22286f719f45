//! Parallel divide-and-conquer sweeps (§4.4): rehash, count-marked, and
//! notify-dead, all built on the same split-at-1024-join skeleton over a
//! contiguous index range.

use crate::allocator::Allocator;
use crate::callbacks::DeadCallback;
use crate::directory::Directory;
use crate::liveness::Liveness;
use crate::payload::PayloadStore;
use crate::runtime::WorkerRuntime;
use std::sync::atomic::{AtomicU64, Ordering};

const SPLIT_THRESHOLD: u64 = 1024;

fn divide_and_conquer<R, T, F, C>(rt: &R, first: u64, count: u64, leaf: &F, combine: &C) -> T
where
    R: WorkerRuntime,
    T: Send,
    F: Fn(u64, u64) -> T + Sync,
    C: Fn(T, T) -> T + Sync,
{
    if count > SPLIT_THRESHOLD {
        let half = count / 2;
        let (l, r) = rt.join(
            || divide_and_conquer(rt, first, half, leaf, combine),
            || divide_and_conquer(rt, first + half, count - half, leaf, combine),
        );
        combine(l, r)
    } else {
        leaf(first, count)
    }
}

/// Source of the per-payload hash used to re-insert it, since a custom-hash
/// entry must be re-mixed with the client's callback rather than the
/// default mixer (§4.1's rehash variant).
pub trait RehashHasher: Sync {
    fn hash_for(&self, index: u64, a: u64, b: u64, is_custom: bool) -> u64;
}

/// Re-insert every occupied payload into a freshly cleared directory.
/// Returns `Err((attempted, failed_at))` on the first index that could not
/// be placed, with `attempted` counting how many re-insertions had already
/// succeeded when the failure occurred (sweeps proceed in parallel, so this
/// is a lower bound, not necessarily the literal count at the moment of
/// failure, but it's the number the caller can show for "how far we got").
#[allow(clippy::too_many_arguments)]
pub fn rehash_sweep<R: WorkerRuntime>(
    rt: &R,
    directory: &Directory,
    allocator: &Allocator,
    payload: &PayloadStore,
    hasher: &dyn RehashHasher,
    liveness: &Liveness,
    table_size: u64,
    mask_mode: bool,
    line_words: u64,
    threshold: usize,
    first: u64,
    count: u64,
) -> Result<usize, u64> {
    let attempted = AtomicU64::new(0);
    let first_failure = AtomicU64::new(u64::MAX);

    let leaf = |start: u64, n: u64| -> bool {
        let mut ok = true;
        for i in start..start + n {
            if !allocator.is_occupied(i) {
                continue;
            }
            let (a, b) = payload.read(i);
            let is_custom = liveness.is_custom(i);
            let h = hasher.hash_for(i, a, b, is_custom);
            if directory.rehash_insert(i, h, table_size, mask_mode, line_words, threshold) {
                attempted.fetch_add(1, Ordering::Relaxed);
            } else {
                first_failure.fetch_min(i, Ordering::Relaxed);
                ok = false;
            }
        }
        ok
    };
    let combine = |a: bool, b: bool| a && b;

    let all_ok = divide_and_conquer(rt, first, count, &leaf, &combine);
    if all_ok {
        Ok(attempted.load(Ordering::Relaxed) as usize)
    } else {
        Err(first_failure.load(Ordering::Relaxed))
    }
}

/// For each occupied-but-unmarked slot in `[first, first+count)`, release it
/// so `clear` only retains the current mark epoch's survivors (§3: "clear
/// zeroes the directory... a rehash sweep re-publishes still-marked
/// entries"). Returns how many slots were reaped.
pub fn reap_sweep<R: WorkerRuntime>(rt: &R, allocator: &Allocator, liveness: &Liveness, first: u64, count: u64) -> usize {
    let leaf = |start: u64, n: u64| -> u64 {
        let mut reaped = 0u64;
        for i in start..start + n {
            if allocator.is_occupied(i) && !liveness.is_marked(i) {
                allocator.release(i);
                reaped += 1;
            }
        }
        reaped
    };
    let combine = |a: u64, b: u64| a + b;
    divide_and_conquer(rt, first, count, &leaf, &combine) as usize
}

/// Sum of set mark bits over `[first, first+count)`.
pub fn count_marked_sweep<R: WorkerRuntime>(rt: &R, liveness: &Liveness, first: u64, count: u64) -> u64 {
    let leaf = |start: u64, n: u64| liveness.count_marked_range(start as usize, n as usize);
    let combine = |a: u64, b: u64| a + b;
    divide_and_conquer(rt, first, count, &leaf, &combine)
}

/// For each slot that is unoccupied but has a pending notify request,
/// invoke `dead_cb`. `true` resurrects the slot: occupancy is re-set and
/// the payload is re-published into the directory (via the same rehash
/// variant the rehash sweep uses) so a subsequent `lookup` can find it
/// rather than silently double-inserting it under a fresh index. `false`
/// clears the pending notify request so it isn't re-delivered next epoch.
#[allow(clippy::too_many_arguments)]
pub fn notify_dead_sweep<R: WorkerRuntime>(
    rt: &R,
    directory: &Directory,
    allocator: &Allocator,
    payload: &PayloadStore,
    liveness: &Liveness,
    hasher: &dyn RehashHasher,
    table_size: u64,
    mask_mode: bool,
    line_words: u64,
    threshold: usize,
    dead_cb: &dyn DeadCallback,
    first: u64,
    count: u64,
) -> usize {
    let leaf = |start: u64, n: u64| -> u64 {
        let mut local = 0u64;
        for i in start..start + n {
            if allocator.is_occupied(i) {
                continue;
            }
            if !liveness.is_notify_requested(i) {
                continue;
            }
            if dead_cb.on_dead(i) {
                allocator.mark_occupied_exclusive(i);
                let (a, b) = payload.read(i);
                let is_custom = liveness.is_custom(i);
                let h = hasher.hash_for(i, a, b, is_custom);
                directory.rehash_insert(i, h, table_size, mask_mode, line_words, threshold);
                local += 1;
            } else {
                liveness.clear_notify(i);
            }
        }
        local
    };
    let combine = |a: u64, b: u64| a + b;
    divide_and_conquer(rt, first, count, &leaf, &combine) as usize
}

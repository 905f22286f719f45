//! Worker runtime abstraction (§6): parallel task spawn/join and a
//! "run on every worker and wait" primitive, used by GC's divide-and-conquer
//! sweeps and by the per-worker region reset at `clear()` time.
//!
//! The default implementation rides on `rayon`'s global thread pool, which
//! this codebase already depends on for its parallel graph traversal
//! feature. `join` maps onto `rayon::join`; `together` maps onto
//! `rayon::broadcast`, which runs a closure once on every thread currently
//! in the pool and blocks until all have returned — exactly the "together"
//! contract in §6.

pub trait WorkerRuntime: Send + Sync {
    /// Number of workers currently in the pool. Advisory only — used for
    /// the allocator's first-use region spreading heuristic, not for
    /// correctness.
    fn worker_count(&self) -> usize;

    /// Run two closures, possibly in parallel, and return both results.
    /// Used by the sweeps' divide-and-conquer split.
    fn join<A, B, RA, RB>(&self, a: A, b: B) -> (RA, RB)
    where
        A: FnOnce() -> RA + Send,
        B: FnOnce() -> RB + Send,
        RA: Send,
        RB: Send;

    /// Invoke `f` once on every pool worker and wait for all of them.
    fn together(&self, f: &(dyn Fn() + Sync));
}

#[derive(Default, Clone, Copy)]
pub struct RayonRuntime;

impl WorkerRuntime for RayonRuntime {
    fn worker_count(&self) -> usize {
        rayon::current_num_threads()
    }

    fn join<A, B, RA, RB>(&self, a: A, b: B) -> (RA, RB)
    where
        A: FnOnce() -> RA + Send,
        B: FnOnce() -> RB + Send,
        RA: Send,
        RB: Send,
    {
        rayon::join(a, b)
    }

    fn together(&self, f: &(dyn Fn() + Sync)) {
        rayon::broadcast(|_ctx| f());
    }
}

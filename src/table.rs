//! Top-level `Table`: wires the directory, allocator, liveness bitmaps,
//! memory providers and sweeps together into the public API from §6.
//!
//! Mirrors this codebase's `SekejapDB`: a single struct owning every
//! component, constructed once by a validating `create`, with
//! `parking_lot::RwLock` marking the boundary between "many readers at
//! once" and "one exclusive phase" the same way `MmapHashIndex` documents
//! `get()` under `read()` and `insert`/`remove` under `write()`. Here the
//! read side is `lookup`/`lookup_custom`/`mark`/`is_marked`, and the write
//! side is `clear`/`rehash`/`notify_all`.

use crate::allocator::{Allocator, RESERVED_SLOTS};
use crate::callbacks::{DeadCallback, EqualsCallback, HashCallback};
use crate::config::TableConfig;
use crate::directory::{self, Directory, FAIL};
use crate::error::{Error, Result};
use crate::hash::DEFAULT_SEED;
use crate::liveness::Liveness;
use crate::memory::MmapMemoryProvider;
use crate::payload::PayloadStore;
use crate::runtime::{RayonRuntime, WorkerRuntime};
use crate::sweep::{self, RehashHasher};
use log::{debug, info, warn};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

struct CustomCallbacks {
    hash: Arc<dyn HashCallback>,
    equals: Arc<dyn EqualsCallback>,
}

struct TableHasher<'a> {
    custom: &'a RwLock<Option<CustomCallbacks>>,
}

impl RehashHasher for TableHasher<'_> {
    fn hash_for(&self, _index: u64, a: u64, b: u64, is_custom: bool) -> u64 {
        if is_custom {
            if let Some(cb) = self.custom.read().as_ref() {
                return cb.hash.hash(a, b, DEFAULT_SEED);
            }
        }
        directory::default_hash(DEFAULT_SEED, a, b)
    }
}

pub struct Table<Rt: WorkerRuntime = RayonRuntime> {
    config: TableConfig,
    table_size: AtomicU64,
    directory: Directory,
    allocator: Allocator,
    payload: PayloadStore,
    liveness: Liveness,
    runtime: Rt,
    /// Separates the lock-free hot path (many readers: `lookup*`, `mark`,
    /// `is_marked`) from the exclusive GC phases (`clear`, `rehash`,
    /// `notify_all`), exactly as `MmapHashIndex`'s doc comment prescribes
    /// for its own CAS-free Robin Hood table.
    quiesce: RwLock<()>,
    custom: RwLock<Option<CustomCallbacks>>,
    dead_cb: RwLock<Option<Arc<dyn DeadCallback>>>,
}

impl Table<RayonRuntime> {
    pub fn create(config: TableConfig) -> Result<Self> {
        Self::create_with_runtime(config, RayonRuntime)
    }
}

impl<Rt: WorkerRuntime> Table<Rt> {
    pub fn create_with_runtime(config: TableConfig, runtime: Rt) -> Result<Self> {
        config.validate()?;

        let payload_bytes = config
            .max_size
            .checked_mul(16)
            .ok_or_else(|| Error::InvalidConfig("max_size too large: payload size overflows".into()))?;

        let payload_mem = MmapMemoryProvider::new(payload_bytes)?;

        let directory = Directory::new(config.max_size)?;
        let allocator = Allocator::new(config.max_size)?;
        if config.numa_interleave_directory {
            directory.advise_random();
            allocator.advise_random();
            debug!("numa_interleave_directory requested; applied random-access advice to the directory and region bitmap");
        }

        let table = Self {
            table_size: AtomicU64::new(config.initial_size as u64),
            directory,
            allocator,
            payload: PayloadStore::new(Box::new(payload_mem)),
            liveness: Liveness::new(config.max_size)?,
            runtime,
            quiesce: RwLock::new(()),
            custom: RwLock::new(None),
            dead_cb: RwLock::new(None),
            config,
        };

        info!(
            "table created: initial_size={} max_size={} mask_mode={}",
            table.config.initial_size, table.config.max_size, table.config.mask_mode
        );
        Ok(table)
    }

    pub fn table_size(&self) -> u64 {
        self.table_size.load(Ordering::Acquire)
    }

    pub fn max_size(&self) -> usize {
        self.config.max_size
    }

    pub fn len(&self) -> u64 {
        self.allocator.occupied_count().saturating_sub(2)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of distinct payloads this table can ever hold, fixed
    /// at construction. An alias for `max_size`, kept separate so callers
    /// used to a `Vec`-shaped `len`/`capacity` pair don't have to know the
    /// table's own vocabulary.
    pub fn capacity(&self) -> usize {
        self.config.max_size
    }

    pub fn set_size(&self, n: usize) -> Result<()> {
        if n > self.config.max_size || n < crate::config::MIN_TABLE_SIZE {
            return Err(Error::InvalidConfig(format!(
                "set_size({n}) must be within [{}, {}]",
                crate::config::MIN_TABLE_SIZE,
                self.config.max_size
            )));
        }
        if self.config.mask_mode && !n.is_power_of_two() {
            return Err(Error::InvalidConfig(format!(
                "mask_mode requires a power-of-two table_size, got {n}"
            )));
        }
        let _guard = self.quiesce.write();
        self.table_size.store(n as u64, Ordering::Release);
        info!("table_size set to {n}");
        Ok(())
    }

    fn threshold(&self) -> usize {
        self.config.threshold_for(self.table_size())
    }

    pub fn lookup(&self, a: u64, b: u64) -> (u64, bool) {
        let _guard = self.quiesce.read();
        let hash = directory::default_hash(DEFAULT_SEED, a, b);
        self.directory.lookup_or_insert(
            a,
            b,
            hash,
            self.table_size(),
            self.config.mask_mode,
            self.config.cache_line_words as u64,
            self.threshold(),
            &self.allocator,
            &self.payload,
            directory::default_eq,
            |_index| {},
        )
    }

    pub fn lookup_custom(&self, a: u64, b: u64) -> (u64, bool) {
        let _guard = self.quiesce.read();
        let custom = self.custom.read();
        let Some(cb) = custom.as_ref() else {
            drop(custom);
            return self.lookup(a, b);
        };
        let hash = cb.hash.hash(a, b, DEFAULT_SEED);
        let equals = &cb.equals;
        let liveness = &self.liveness;
        let (index, created) = self.directory.lookup_or_insert(
            a,
            b,
            hash,
            self.table_size(),
            self.config.mask_mode,
            self.config.cache_line_words as u64,
            self.threshold(),
            &self.allocator,
            &self.payload,
            |a1, b1, a2, b2| equals.equals(a1, b1, a2, b2),
            |index| liveness.set_custom(index),
        );
        (index, created)
    }

    pub fn set_custom(&self, hash_cb: Arc<dyn HashCallback>, equals_cb: Arc<dyn EqualsCallback>) {
        *self.custom.write() = Some(CustomCallbacks {
            hash: hash_cb,
            equals: equals_cb,
        });
    }

    pub fn set_ondead(&self, cb: Arc<dyn DeadCallback>) {
        *self.dead_cb.write() = Some(cb);
    }

    pub fn mark(&self, index: u64) -> bool {
        let _guard = self.quiesce.read();
        self.liveness.mark(index)
    }

    pub fn is_marked(&self, index: u64) -> bool {
        let _guard = self.quiesce.read();
        self.liveness.is_marked(index)
    }

    pub fn notify_ondead(&self, index: u64) {
        let _guard = self.quiesce.read();
        self.liveness.request_notify(index);
    }

    pub fn count_marked(&self) -> u64 {
        let _guard = self.quiesce.read();
        sweep::count_marked_sweep(&self.runtime, &self.liveness, RESERVED_SLOTS as u64, self.reapable_count())
    }

    /// Number of indices a full-range sweep should walk: everything past
    /// the two permanently-reserved slots, which are never marked (the
    /// public API never hands them out) and so must never be treated as
    /// occupied-but-unmarked garbage.
    fn reapable_count(&self) -> u64 {
        (self.config.max_size - RESERVED_SLOTS) as u64
    }

    /// Reap every occupied-but-unmarked payload, then zero the directory,
    /// region ownership and mark bits for a new GC epoch. Marked payloads
    /// stay occupied so `rehash` can re-publish them; a client that wants a
    /// last chance to resurrect what's reaped here calls `notify_all` with
    /// the right `dead_cb` after this returns, since the freed slots' notify
    /// flags (`bitmap3`) are untouched by `clear`.
    pub fn clear(&self) -> Result<()> {
        let _guard = self.quiesce.write();
        let reaped = sweep::reap_sweep(&self.runtime, &self.allocator, &self.liveness, RESERVED_SLOTS as u64, self.reapable_count());
        let dir_remapped = self.directory.clear();
        let bitmap1_remapped = self.allocator.clear_regions();
        self.liveness.clear_epoch();
        if !dir_remapped {
            warn!("directory clear fell back to a write pass instead of a remap");
        }
        if !bitmap1_remapped {
            warn!("region bitmap clear fell back to a write pass instead of a remap");
        }
        info!("table cleared for new GC epoch: reaped {reaped} unmarked payload(s)");
        Ok(())
    }

    pub fn rehash(&self) -> Result<()> {
        let _guard = self.quiesce.write();
        let hasher = TableHasher { custom: &self.custom };

        let result = sweep::rehash_sweep(
            &self.runtime,
            &self.directory,
            &self.allocator,
            &self.payload,
            &hasher,
            &self.liveness,
            self.table_size(),
            self.config.mask_mode,
            self.config.cache_line_words as u64,
            self.threshold(),
            RESERVED_SLOTS as u64,
            self.reapable_count(),
        );
        match result {
            Ok(attempted) => {
                debug!("rehash sweep re-inserted {attempted} payloads");
                Ok(())
            }
            Err(failed_at) => {
                warn!("rehash sweep exhausted its probe budget at payload index {failed_at}");
                Err(Error::RehashFailed {
                    attempted: self.allocator.occupied_count() as usize,
                    failed_at,
                })
            }
        }
    }

    /// Give every reaped-but-notify-requested slot a chance to resurrect,
    /// the third phase of a GC cycle (§4.4). A resurrected slot is
    /// re-published into the directory under its original hash so it stays
    /// discoverable via `lookup`.
    pub fn notify_all(&self) -> usize {
        let _guard = self.quiesce.write();
        let dead_cb = self.dead_cb.read();
        let Some(cb) = dead_cb.as_ref().cloned() else {
            return 0;
        };
        drop(dead_cb);
        let hasher = TableHasher { custom: &self.custom };
        sweep::notify_dead_sweep(
            &self.runtime,
            &self.directory,
            &self.allocator,
            &self.payload,
            &self.liveness,
            &hasher,
            self.table_size(),
            self.config.mask_mode,
            self.config.cache_line_words as u64,
            self.threshold(),
            cb.as_ref(),
            RESERVED_SLOTS as u64,
            self.reapable_count(),
        )
    }

    /// Consume and drop the table, releasing its mmap-backed regions.
    pub fn free(self) {
        drop(self);
    }
}

impl<Rt: WorkerRuntime> Drop for Table<Rt> {
    fn drop(&mut self) {
        debug!("table dropped, releasing backing regions");
    }
}

pub const FAILURE_SENTINEL: u64 = FAIL;

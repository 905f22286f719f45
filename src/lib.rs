//! Lock-free, fixed-capacity, unique-insert hash table for hash-consing
//! decision-diagram nodes.
//!
//! A `Table` maps two-word payloads `(a, b)` to a stable slot index, never
//! inserting the same payload twice even under concurrent `lookup` calls
//! from many threads. Capacity is fixed at construction (`max_size`); a
//! mark/rehash/notify cycle (`mark`, `clear`, `rehash`, `notify_all`) is how
//! a client reclaims dead entries once the table nears its threshold.
//!
//! ```
//! use uniquetable::{Table, TableConfig};
//!
//! let table = Table::create(TableConfig::new(512, 4096)).unwrap();
//! let (idx, created) = table.lookup(7, 11);
//! assert!(created);
//! let (idx2, created2) = table.lookup(7, 11);
//! assert!(!created2);
//! assert_eq!(idx, idx2);
//! ```

mod allocator;
mod bitmap;
mod callbacks;
mod config;
mod directory;
mod hash;
mod liveness;
mod memory;
mod payload;
mod runtime;
mod sweep;
mod table;

pub mod error;

pub use callbacks::{DeadCallback, EqualsCallback, HashCallback};
pub use config::TableConfig;
pub use error::{Error, Result};
pub use memory::{MemoryProvider, MmapMemoryProvider, VecMemoryProvider};
pub use runtime::{RayonRuntime, WorkerRuntime};
pub use table::{Table, FAILURE_SENTINEL};

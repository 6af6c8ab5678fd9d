//! A persistent B+ tree index for a key-value storage engine, written in Rust.
//!
//! `slabindex` maps a 64-bit key (typically a hash of a record's key, computed by the
//! caller) to a [`Locator`]: the storage segment and the slot inside it where the
//! record's bytes live. Each worker of the engine owns one index and one backing file;
//! the index performs no locking and expects its owner to serialize every call.
//!
//! The backing file starts with a checksummed meta block, followed by fixed-size pages
//! holding the nodes of the tree. Pages of removed nodes are reused before the file grows.
//!
//! # Open Index
//!
//! Use following way to open the index of a worker. If the index file does not exist,
//! it is created and initialized with an empty tree.
//!
//! ```
//! use slabindex::{worker_path, Options, Result, SlabIndex};
//! # fn try_main() -> Result<()> {
//!
//! let path = worker_path("target/doc-index", 0);
//!
//! // The simplest way to open with default `Options`:
//! let index = SlabIndex::create(&path, 0)?;
//! # drop(index);
//!
//! // Open with `Options`:
//! let index = Options::new()
//!     .force_sync(true)
//!     .page_cache_capacity(64)
//!     .open(&path, 0)?;
//! # Ok(())
//! # }
//!
//! # fn main() { try_main().unwrap(); }
//! ```
//! The index is closed when the instance is dropped.
//!
//! # Search, Insert, Update, Remove
//!
//! ```
//! # use slabindex::{worker_path, InsertOutcome, Locator, RemoveOutcome, Result, SlabIndex, UpdateOutcome};
//! # fn try_main() -> Result<()> {
//! # let mut index = SlabIndex::create(worker_path("target/doc-index", 1), 1)?;
//! # index.remove(42)?;
//! // Insert a new key. An existing key is never overwritten.
//! assert_eq!(index.insert(42, Locator::new(3, 17))?, InsertOutcome::Inserted);
//! assert_eq!(index.insert(42, Locator::new(9, 9))?, InsertOutcome::Duplicate);
//!
//! // Get the locator stored for a key.
//! assert_eq!(index.search(42)?, Some(Locator::new(3, 17)));
//!
//! // Replace the locator of an existing key.
//! assert_eq!(index.update(42, Locator::new(4, 0))?, UpdateOutcome::Updated);
//!
//! // Remove a key.
//! assert_eq!(index.remove(42)?, RemoveOutcome::Removed);
//! assert_eq!(index.search(42)?, None);
//! # Ok(())
//! # }
//! # fn main() { try_main().unwrap(); }
//! ```
//!
//! # Range Scan
//!
//! Entries are kept in key order, and a range scan walks the chain of leaves forward
//! from the first key not less than the given one:
//!
//! ```
//! # use slabindex::{worker_path, Locator, Result, SlabIndex};
//! # fn try_main() -> Result<()> {
//! # let mut index = SlabIndex::create(worker_path("target/doc-index", 2), 2)?;
//! for key in [10, 20, 30, 40] {
//!     index.insert(key, Locator::new(0, key))?;
//! }
//!
//! let keys = index
//!     .search_range(15, 2)?
//!     .into_iter()
//!     .map(|e| e.key)
//!     .collect::<Vec<_>>();
//! assert_eq!(keys, [20, 30]);
//!
//! // Or visit everything.
//! index.for_each(|key, locator| println!("{key} => {locator:?}"))?;
//! # Ok(())
//! # }
//! # fn main() { try_main().unwrap(); }
//! ```

mod bptree;
mod db;
mod debugger;
mod error;
mod freelist;
mod medium;
mod meta;
mod pager;
mod storage;

pub use crate::{
    bptree::{Entry, InsertOutcome, Key, Locator, RemoveOutcome, Stats, UpdateOutcome},
    db::{worker_path, Options, SlabIndex},
    debugger::Debugger,
    error::{Error, ErrorCode, Result},
    medium::cache::{LruPageCache, NoCache, PageCache, PageKey},
};

/// The order of a tree unless configured otherwise.
pub const DEFAULT_ORDER: usize = 20;
/// The smallest supported order.
pub const MIN_ORDER: usize = 4;
/// The number of reclaimed pages the free list holds. Part of the meta block layout.
pub const FREE_LIST_CAPACITY: usize = 128;

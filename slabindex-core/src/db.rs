use std::{
    num::NonZeroUsize,
    path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::{error, info, warn};

use crate::{
    bptree::{self, BPTree, Entry, InsertOutcome, Key, Locator, RemoveOutcome, UpdateOutcome},
    debugger::Debugger,
    error::Result,
    medium::{
        self,
        cache::{LruPageCache, NoCache, PageCache},
        File, MIN_PAGE_SIZE,
    },
    meta::Meta,
    pager::{self, ReadWrite, Readonly},
    storage::Storage,
    DEFAULT_ORDER, MIN_ORDER,
};

/// The options for configuring an index instance.
#[derive(Debug, Clone)]
pub struct Options {
    pub(crate) order: usize,
    pub(crate) page_size: Option<u32>,
    pub(crate) force_sync: bool,
    pub(crate) page_cache_capacity: usize,
}

#[derive(Error, Debug)]
pub(crate) enum InputInvalid {
    #[error("the order {order} is smaller than the minimum order {min}")]
    OrderTooSmall { order: usize, min: usize },
    #[error("the page size {page_size} is smaller than the minimum page size {min}")]
    PageSizeTooSmall { page_size: u32, min: u32 },
    #[error("the order {order} exceeds the {capacity} entries a page of {page_size} bytes holds")]
    OrderTooLarge {
        order: usize,
        page_size: u32,
        capacity: usize,
    },
}

/// An earlier mutating call failed after writing pages, so the tree on disk may be
/// half-modified.
#[derive(Error, Debug)]
#[error("an earlier call failed midway through its writes, the index refuses further calls")]
pub(crate) struct Poisoned;

impl Options {
    /// Creates a new Options instance with default values.
    #[inline]
    pub fn new() -> Self {
        Default::default()
    }

    /// Set the order of the tree: the maximum number of entries of a leaf and of
    /// children of a branch.
    ///
    /// By default, it is [`DEFAULT_ORDER`]. Only used when a new index file is initialized,
    /// an existing file keeps the order it was created with.
    #[inline]
    pub fn order(&mut self, order: usize) -> &mut Self {
        self.order = order;
        self
    }

    /// Set the size of a page.
    ///
    /// By default, it is the operating system's memory page size. And the minimum
    /// page size is 4 KB. Only used when a new index file is initialized.
    #[inline]
    pub fn page_size(&mut self, page_size: Option<u32>) -> &mut Self {
        self.page_size = page_size;
        self
    }

    /// Decide whether to force synchronization after every mutating call.
    ///
    /// If it is true, every insert, update and remove is followed by a sync of the backing
    /// file. If it is false, sync operation will be performed according to the operating
    /// system's internal logic.
    #[inline]
    pub fn force_sync(&mut self, flag: bool) -> &mut Self {
        self.force_sync = flag;
        self
    }

    /// Set the number of pages kept by the built-in LRU page cache.
    ///
    /// By default, it is 0, which disables caching.
    #[inline]
    pub fn page_cache_capacity(&mut self, capacity: usize) -> &mut Self {
        self.page_cache_capacity = capacity;
        self
    }

    /// Open the index of the given worker at `path` with the current options.
    #[inline]
    pub fn open(&self, path: impl AsRef<Path>, worker_id: u64) -> Result<SlabIndex> {
        SlabIndex::create_with_options(path, worker_id, self.clone())
    }

    /// Checks that a tree of this order fits pages of `page_size` bytes.
    fn validate(&self, page_size: u32) -> std::result::Result<(), InputInvalid> {
        if self.order < MIN_ORDER {
            return Err(InputInvalid::OrderTooSmall {
                order: self.order,
                min: MIN_ORDER,
            });
        }
        if page_size < MIN_PAGE_SIZE {
            return Err(InputInvalid::PageSizeTooSmall {
                page_size,
                min: MIN_PAGE_SIZE,
            });
        }

        let capacity = bptree::max_order(page_size);
        if self.order > capacity {
            return Err(InputInvalid::OrderTooLarge {
                order: self.order,
                page_size,
                capacity,
            });
        }
        Ok(())
    }
}

impl Default for Options {
    #[inline]
    fn default() -> Self {
        Self {
            order: DEFAULT_ORDER,
            page_size: None,
            force_sync: false,
            page_cache_capacity: 0,
        }
    }
}

/// Builds the path of the index file owned by a worker: `<dir>/slabindex-<worker_id>`.
#[inline]
pub fn worker_path(dir: impl AsRef<Path>, worker_id: u64) -> PathBuf {
    dir.as_ref().join(format!("slabindex-{worker_id}"))
}

/// A persistent index mapping 64-bit keys to record locators, owned by one worker.
///
/// All entry points are here. The index performs no locking: the owning worker
/// serializes every call, which the `&mut self` receivers of the mutating calls
/// enforce.
///
/// A mutating call that fails before writing anything leaves the index as it was.
/// One that fails after its first write poisons the instance: every later call
/// returns [`ErrorCode::DatabaseCorrupted`](crate::ErrorCode::DatabaseCorrupted).
pub struct SlabIndex {
    worker_id: u64,
    options: Options,
    storage: Storage,
    meta: Meta,
    poisoned: bool,
}

impl SlabIndex {
    /// Open the index of the given worker at `path` with default options.
    ///
    /// An absent or empty file is initialized with an empty tree.
    #[inline]
    pub fn create(path: impl AsRef<Path>, worker_id: u64) -> Result<Self> {
        Self::create_with_options(path, worker_id, Options::default())
    }

    /// Open the index of the given worker at `path` with the provided options.
    pub fn create_with_options(
        path: impl AsRef<Path>,
        worker_id: u64,
        options: Options,
    ) -> Result<Self> {
        let cache: Box<dyn PageCache> = match NonZeroUsize::new(options.page_cache_capacity) {
            Some(capacity) => Box::new(LruPageCache::new(capacity)),
            None => Box::new(NoCache),
        };
        Self::create_with_cache(path, worker_id, options, cache)
    }

    /// Open the index of the given worker at `path`, reading pages through `cache`.
    pub fn create_with_cache(
        path: impl AsRef<Path>,
        worker_id: u64,
        options: Options,
        cache: Box<dyn PageCache>,
    ) -> Result<Self> {
        let page_size = options
            .page_size
            .unwrap_or_else(medium::default_page_size);
        options.validate(page_size)?;

        let file = File::open(path)?;
        let stored = pager::load_meta(&file.acquire()?)?;

        let index = match stored {
            Some(meta) => Self::bind(worker_id, options, file, meta, cache),
            None => Self::init(worker_id, options, file, page_size, cache)?,
        };
        index.sync_if_forced()?;
        Ok(index)
    }

    /// The worker owning this index.
    #[inline]
    pub fn worker_id(&self) -> u64 {
        self.worker_id
    }

    /// Options used to configure the index.
    #[inline]
    pub fn options(&self) -> Options {
        self.options.clone()
    }

    /// The path of the backing file.
    #[inline]
    pub fn path(&self) -> &Path {
        self.storage.file().path()
    }

    /// Get the locator stored for a key.
    #[inline]
    pub fn search(&self, key: Key) -> Result<Option<Locator>> {
        self.bptree()?.search(key)
    }

    /// Get up to `limit` entries whose keys are not less than `key`, in ascending key order.
    #[inline]
    pub fn search_range(&self, key: Key, limit: usize) -> Result<Vec<Entry>> {
        self.bptree()?.search_range(key, limit)
    }

    /// Visit every key and its locator in ascending key order.
    #[inline]
    pub fn for_each(&self, f: impl FnMut(Key, Locator)) -> Result<()> {
        self.bptree()?.for_each(f)
    }

    /// Insert a new key. An existing key is never overwritten, see [`SlabIndex::update`].
    pub fn insert(&mut self, key: Key, locator: Locator) -> Result<InsertOutcome> {
        let outcome = self.mutate(|bptree| bptree.insert(key, locator))?;
        if outcome == InsertOutcome::Inserted {
            self.sync_if_forced()?;
        }
        Ok(outcome)
    }

    /// Replace the locator of an existing key.
    pub fn update(&mut self, key: Key, locator: Locator) -> Result<UpdateOutcome> {
        let outcome = self.mutate(|bptree| bptree.update(key, locator))?;
        if outcome == UpdateOutcome::Updated {
            self.sync_if_forced()?;
        }
        Ok(outcome)
    }

    /// Remove a key.
    pub fn remove(&mut self, key: Key) -> Result<RemoveOutcome> {
        let outcome = self.mutate(|bptree| bptree.remove(key))?;
        if outcome == RemoveOutcome::Removed {
            self.sync_if_forced()?;
        }
        Ok(outcome)
    }

    /// Flush the backing file to disk.
    #[inline]
    pub fn sync(&self) -> Result<()> {
        self.storage.acquire()?.sync().map_err(Into::into)
    }

    /// Get a debugger for the index.
    #[inline]
    pub fn debugger(&self) -> Result<Debugger<'_>> {
        self.bptree().map(Debugger::new)
    }

    /// Initialize a new index file with the given options.
    fn init(
        worker_id: u64,
        options: Options,
        file: File,
        page_size: u32,
        cache: Box<dyn PageCache>,
    ) -> Result<Self> {
        {
            let handle = file.acquire()?;
            if handle.len()? > 0 {
                warn!(
                    worker_id,
                    path = %file.path().display(),
                    "index file is truncated, reinitializing"
                );
            }
            handle.truncate()?;
        }

        let mut index = Self {
            worker_id,
            meta: Meta::new(page_size, options.order as u32),
            storage: Storage::new(file, page_size, worker_id, cache),
            options,
            poisoned: false,
        };
        index.mutate(|bptree| bptree.init())?;

        info!(
            worker_id,
            path = %index.path().display(),
            page_size,
            "index initialized"
        );
        Ok(index)
    }

    /// Bind to an existing index file, keeping its stored geometry.
    fn bind(
        worker_id: u64,
        options: Options,
        file: File,
        meta: Meta,
        cache: Box<dyn PageCache>,
    ) -> Self {
        let page_size_differs = options.page_size.is_some_and(|p| p != meta.page_size());
        if meta.order() != options.order || page_size_differs {
            warn!(
                worker_id,
                order = meta.order(),
                page_size = meta.page_size(),
                "the stored geometry differs from the options, keeping the stored one"
            );
        }
        info!(
            worker_id,
            path = %file.path().display(),
            height = meta.height,
            "index bound"
        );

        Self {
            worker_id,
            options,
            storage: Storage::new(file, meta.page_size(), worker_id, cache),
            meta,
            poisoned: false,
        }
    }

    #[inline]
    fn bptree(&self) -> Result<BPTree<Readonly<'_>>> {
        self.check_poisoned()?;
        Readonly::new(&self.storage, &self.meta).map(BPTree::new)
    }

    /// Runs a mutating tree operation.
    ///
    /// When it fails before any write, the in-memory meta block is rolled back.
    /// When it fails after one, the instance is poisoned.
    fn mutate<T>(
        &mut self,
        op: impl FnOnce(&mut BPTree<ReadWrite<'_>>) -> Result<T>,
    ) -> Result<T> {
        self.check_poisoned()?;
        let snapshot = self.meta.clone();

        let mut bptree = BPTree::new(ReadWrite::new(&self.storage, &mut self.meta)?);
        let result = op(&mut bptree);
        let written = bptree.as_index().written();
        drop(bptree);

        if let Err(err) = &result {
            if written {
                self.poisoned = true;
                error!(
                    worker_id = self.worker_id,
                    path = %self.path().display(),
                    "call failed after writing pages, refusing further calls: {err}"
                );
            } else {
                self.meta = snapshot;
            }
        }
        result
    }

    #[inline]
    fn check_poisoned(&self) -> Result<()> {
        match self.poisoned {
            true => Err(Poisoned.into()),
            false => Ok(()),
        }
    }

    #[inline]
    fn sync_if_forced(&self) -> Result<()> {
        if self.options.force_sync {
            self.sync()
        } else {
            Ok(())
        }
    }
}

impl std::fmt::Debug for SlabIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlabIndex")
            .field("worker_id", &self.worker_id)
            .field("path", &self.path())
            .field("height", &self.meta.height)
            .field("order", &self.meta.order())
            .field("poisoned", &self.poisoned)
            .finish()
    }
}

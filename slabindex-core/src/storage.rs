use std::{cell::RefCell, fmt};

use crate::{
    error::Result,
    medium::{
        cache::{PageCache, PageKey},
        codec,
        file::{self, Handle},
        File,
    },
};

/// A node image that can be decoded from and encoded into a page-sized buffer.
pub(crate) trait Page: Sized {
    fn decode(bytes: &[u8]) -> codec::Result<Self>;

    /// Encodes into `bytes`, which is zeroed and exactly one page long.
    fn encode(&self, bytes: &mut [u8]) -> codec::Result<()>;
}

/// The logical identity of a page: its byte offset within the backing file.
///
/// Offset 0 holds the meta block, so it never identifies a node and is used as the
/// "no page" marker in node links.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub(crate) struct PageOffset(u64);

impl PageOffset {
    pub(crate) const NULL: Self = Self(0);

    #[inline]
    pub(crate) const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    pub(crate) const fn raw(&self) -> u64 {
        self.0
    }

    #[inline]
    pub(crate) const fn is_null(&self) -> bool {
        self.0 == 0
    }

    /// Returns `None` for the null offset.
    #[inline]
    pub(crate) fn get(self) -> Option<Self> {
        (!self.is_null()).then_some(self)
    }
}

impl From<u64> for PageOffset {
    #[inline]
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Debug for PageOffset {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

impl fmt::Display for PageOffset {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The page store: translates page offsets into node images and back.
///
/// Every access reads or writes exactly one page at a page-aligned offset. Reads
/// consult the configured [`PageCache`] first; writes always go to the file.
pub(crate) struct Storage {
    file: File,
    page_size: u32,
    file_id: u64,
    cache: RefCell<Box<dyn PageCache>>,
}

impl Storage {
    #[inline]
    pub(crate) fn new(file: File, page_size: u32, file_id: u64, cache: Box<dyn PageCache>) -> Self {
        Self {
            file,
            page_size,
            file_id,
            cache: RefCell::new(cache),
        }
    }

    #[inline]
    pub(crate) fn file(&self) -> &File {
        &self.file
    }

    /// Acquires the backing file for the duration of a logical operation.
    #[inline]
    pub(crate) fn acquire(&self) -> file::Result<Handle<'_>> {
        self.file.acquire()
    }

    pub(crate) fn page<P>(&self, offset: PageOffset) -> Result<P>
    where
        P: Page,
    {
        let bytes = self.page_raw(offset)?;
        P::decode(&bytes).map_err(Into::into)
    }

    pub(crate) fn put_page<P>(&self, offset: PageOffset, page: &P) -> Result<()>
    where
        P: Page,
    {
        let mut bytes = vec![0; self.page_size as usize];
        page.encode(&mut bytes)?;
        self.put_page_raw(offset, &bytes)
    }

    fn page_raw(&self, offset: PageOffset) -> Result<Vec<u8>> {
        let key = self.key(offset);
        if let Some(bytes) = self.cache.borrow_mut().lookup(key) {
            return Ok(bytes);
        }

        let mut bytes = vec![0; self.page_size as usize];
        self.acquire()?.read_at(&mut bytes, offset.raw())?;

        self.cache.borrow_mut().on_read(key, &bytes);
        Ok(bytes)
    }

    fn put_page_raw(&self, offset: PageOffset, bytes: &[u8]) -> Result<()> {
        debug_assert_eq!(bytes.len(), self.page_size as usize);

        let key = self.key(offset);
        self.acquire()?.write_at(bytes, offset.raw())?;

        self.cache.borrow_mut().on_write(key, bytes);
        Ok(())
    }

    #[inline]
    fn key(&self, offset: PageOffset) -> PageKey {
        debug_assert_eq!(
            offset.raw() % self.page_size as u64,
            0,
            "page offset is not aligned"
        );
        PageKey {
            file: self.file_id,
            page: offset.raw() / self.page_size as u64,
        }
    }
}

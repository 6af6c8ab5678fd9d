use crate::{
    bptree::{Node, TreeIndex, TreeIndexMut},
    error::Result,
    medium::file::{self, Handle},
    meta::{Meta, ValidationError},
    storage::{Page, PageOffset, Storage},
};

/// Read access to the tree for the duration of one call.
///
/// Holds the backing file acquired, so every page access of the call shares one
/// descriptor.
pub(crate) struct Readonly<'a> {
    storage: &'a Storage,
    meta: &'a Meta,
    _handle: Handle<'a>,
}

/// Read-write access to the tree for the duration of one call.
///
/// Nodes go through the page store; the meta block is modified in memory and written
/// back to offset 0 on [`TreeIndexMut::flush_meta`].
pub(crate) struct ReadWrite<'a> {
    storage: &'a Storage,
    meta: &'a mut Meta,
    written: bool,
    _handle: Handle<'a>,
}

impl<'a> Readonly<'a> {
    #[inline]
    pub(crate) fn new(storage: &'a Storage, meta: &'a Meta) -> Result<Self> {
        Ok(Self {
            _handle: storage.acquire()?,
            storage,
            meta,
        })
    }
}

impl<'a> ReadWrite<'a> {
    #[inline]
    pub(crate) fn new(storage: &'a Storage, meta: &'a mut Meta) -> Result<Self> {
        Ok(Self {
            _handle: storage.acquire()?,
            storage,
            meta,
            written: false,
        })
    }

    /// Whether the call has attempted to write any page so far.
    #[inline]
    pub(crate) fn written(&self) -> bool {
        self.written
    }
}

/// Reads and validates the meta block of an existing file.
///
/// Returns `None` when the file is too short to hold one, i.e. it has never been
/// initialized or was cut short before the meta block was complete.
pub(crate) fn load_meta(handle: &Handle<'_>) -> Result<Option<Meta>> {
    if handle.len()? < Meta::SIZE as u64 {
        return Ok(None);
    }

    let mut bytes = vec![0; Meta::SIZE];
    match handle.read_at(&mut bytes, 0) {
        Ok(()) => {}
        Err(file::Error::ShortRead { .. }) => return Ok(None),
        Err(err) => return Err(err.into()),
    }

    let meta = Meta::decode(&bytes).map_err(|_| ValidationError::FileInvalid)?;
    meta.validate()?;
    Ok(Some(meta))
}

impl TreeIndex for Readonly<'_> {
    #[inline]
    fn meta(&self) -> &Meta {
        self.meta
    }

    #[inline]
    fn node<N>(&self, offset: PageOffset) -> Result<N>
    where
        N: Node,
    {
        self.storage.page(offset)
    }
}

impl TreeIndex for ReadWrite<'_> {
    #[inline]
    fn meta(&self) -> &Meta {
        &*self.meta
    }

    #[inline]
    fn node<N>(&self, offset: PageOffset) -> Result<N>
    where
        N: Node,
    {
        self.storage.page(offset)
    }
}

impl TreeIndexMut for ReadWrite<'_> {
    #[inline]
    fn meta_mut(&mut self) -> &mut Meta {
        &mut *self.meta
    }

    #[inline]
    fn put_node<N>(&mut self, offset: PageOffset, node: &N) -> Result<()>
    where
        N: Node,
    {
        self.written = true;
        self.storage.put_page(offset, node)
    }

    #[inline]
    fn flush_meta(&mut self) -> Result<()> {
        self.written = true;
        self.storage.put_page(PageOffset::NULL, &*self.meta)
    }
}

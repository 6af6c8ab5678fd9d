use std::mem;

use thiserror::Error;

use crate::{
    bptree::{self, NodeKind},
    freelist::{Freelist, FreelistOverflow},
    medium::{
        codec::{self, Decoder, Encoder},
        MIN_PAGE_SIZE,
    },
    storage::{Page, PageOffset},
    Key, FREE_LIST_CAPACITY, MIN_ORDER,
};

/// The current format version of the index file.
const VERSION: u32 = 1;

/// A special sequence of bytes that is used at the beginning of the index file for validation.
const MAGIC: u32 = 0x5142_5054;

/// The size in bytes of one leaf value: a segment id and a slot index.
const VALUE_SIZE: u32 = 2 * mem::size_of::<u64>() as u32;

/// Represents the header of an index file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Header {
    magic: u32,
    version: u32,
    page_size: u32,
    order: u32,
    key_size: u32,
    value_size: u32,
}

type Checksum = u32;

/// Represents the meta block of an index file, stored at offset 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Meta {
    header: Header,
    /// The number of internal (branch) nodes.
    pub(crate) internal_count: u64,
    /// The number of leaf nodes.
    pub(crate) leaf_count: u64,
    /// The number of internal levels, leaves excluded.
    pub(crate) height: u64,
    /// The next unused offset at the end of the file.
    pub(crate) slot: PageOffset,
    pub(crate) freelist: Freelist,
    /// The offset of the root node, always a branch.
    pub(crate) root: PageOffset,
    /// The offset of the leftmost leaf, where the leaf chain starts.
    pub(crate) leftmost: PageOffset,
    checksum: Checksum,
}

#[derive(Error, Debug)]
pub(crate) enum ValidationError {
    #[error("the index file is invalid")]
    FileInvalid,
    #[error("the file format version is mismatched")]
    VersionMismatched,
    #[error("the metadata checksum is mismatched")]
    ChecksumMismatched,
    #[error("the stored geometry is invalid (page size {page_size}, order {order})")]
    GeometryInvalid { page_size: u32, order: u32 },
}

impl Header {
    #[inline]
    fn new(page_size: u32, order: u32) -> Self {
        Self {
            magic: MAGIC,
            version: VERSION,
            page_size,
            order,
            key_size: mem::size_of::<Key>() as u32,
            value_size: VALUE_SIZE,
        }
    }

    /// Validates the header by checking the magic number, version and geometry.
    fn validate(&self) -> Result<(), ValidationError> {
        if self.magic != MAGIC
            || self.key_size != mem::size_of::<Key>() as u32
            || self.value_size != VALUE_SIZE
        {
            Err(ValidationError::FileInvalid)
        } else if self.version != VERSION {
            Err(ValidationError::VersionMismatched)
        } else if self.page_size < MIN_PAGE_SIZE
            || (self.order as usize) < MIN_ORDER
            || self.order as usize > bptree::max_order(self.page_size)
        {
            Err(ValidationError::GeometryInvalid {
                page_size: self.page_size,
                order: self.order,
            })
        } else {
            Ok(())
        }
    }

    fn encode(&self, encoder: &mut Encoder<'_>) -> codec::Result<()> {
        encoder.put_u32(self.magic)?;
        encoder.put_u32(self.version)?;
        encoder.put_u32(self.page_size)?;
        encoder.put_u32(self.order)?;
        encoder.put_u32(self.key_size)?;
        encoder.put_u32(self.value_size)
    }

    fn decode(decoder: &mut Decoder<'_>) -> codec::Result<Self> {
        Ok(Self {
            magic: decoder.u32()?,
            version: decoder.u32()?,
            page_size: decoder.u32()?,
            order: decoder.u32()?,
            key_size: decoder.u32()?,
            value_size: decoder.u32()?,
        })
    }
}

impl Meta {
    /// The encoded size of the meta block.
    pub(crate) const SIZE: usize = 6 * mem::size_of::<u32>()
        + (5 + FREE_LIST_CAPACITY + 2) * mem::size_of::<u64>()
        + mem::size_of::<Checksum>();

    /// Creates the meta block of an empty file; the first page after it is the slot.
    pub(crate) fn new(page_size: u32, order: u32) -> Self {
        let mut meta = Self {
            header: Header::new(page_size, order),
            internal_count: 0,
            leaf_count: 0,
            height: 0,
            slot: PageOffset::from_raw(page_size as u64),
            freelist: Freelist::new(),
            root: PageOffset::NULL,
            leftmost: PageOffset::NULL,
            checksum: 0,
        };

        meta.check_page_size();
        meta.update_checksum();
        meta
    }

    #[inline]
    pub(crate) fn page_size(&self) -> u32 {
        self.header.page_size
    }

    /// The maximum number of entries of a node.
    #[inline]
    pub(crate) fn order(&self) -> usize {
        self.header.order as usize
    }

    /// Hands out a page for a new node, reusing the most recently reclaimed one first.
    pub(crate) fn allocate(&mut self, kind: NodeKind) -> PageOffset {
        match kind {
            NodeKind::Branch => self.internal_count += 1,
            NodeKind::Leaf => self.leaf_count += 1,
        }

        self.freelist.pop().unwrap_or_else(|| {
            let offset = self.slot;
            self.slot = PageOffset::from_raw(offset.raw() + self.page_size() as u64);
            offset
        })
    }

    /// Returns the page of a removed node to the free list.
    pub(crate) fn release(
        &mut self,
        kind: NodeKind,
        offset: PageOffset,
    ) -> Result<(), FreelistOverflow> {
        self.freelist.push(offset)?;
        match kind {
            NodeKind::Branch => self.internal_count -= 1,
            NodeKind::Leaf => self.leaf_count -= 1,
        }
        Ok(())
    }

    /// Validates the meta block by validating the header and checking the checksum.
    pub(crate) fn validate(&self) -> Result<(), ValidationError> {
        self.header.validate()?;
        // Validate checksum.
        if self.checksum != self.calc_checksum() {
            Err(ValidationError::ChecksumMismatched)
        } else {
            Ok(())
        }
    }

    /// Updates the checksum of the metadata.
    #[inline]
    fn update_checksum(&mut self) {
        self.checksum = self.calc_checksum();
    }

    /// Calculates a checksum of the metadata (without the checksum field) using CRC32.
    fn calc_checksum(&self) -> Checksum {
        let mut bytes = [0u8; Self::SIZE];
        let mut encoder = Encoder::new(&mut bytes);
        self.encode_fields(&mut encoder)
            .expect("the meta block always fits its own size");
        crc32fast::hash(encoder.written())
    }

    fn encode_fields(&self, encoder: &mut Encoder<'_>) -> codec::Result<()> {
        self.header.encode(encoder)?;
        encoder.put_u64(self.internal_count)?;
        encoder.put_u64(self.leaf_count)?;
        encoder.put_u64(self.height)?;
        encoder.put_u64(self.slot.raw())?;

        let free = self.freelist.as_slice();
        codec::check_count(free.len(), FREE_LIST_CAPACITY)?;
        encoder.put_u64(free.len() as u64)?;
        for index in 0..FREE_LIST_CAPACITY {
            encoder.put_u64(free.get(index).map_or(0, |o| o.raw()))?;
        }

        encoder.put_u64(self.root.raw())?;
        encoder.put_u64(self.leftmost.raw())
    }

    /// Check page size, the meta block must fit into the first page.
    #[inline]
    fn check_page_size(&self) {
        assert!(
            self.header.page_size as usize >= Self::SIZE,
            "page size is too small, should not be smaller than than metadata size"
        );
    }
}

impl Page for Meta {
    fn decode(bytes: &[u8]) -> codec::Result<Self> {
        let mut decoder = Decoder::new(bytes);

        let header = Header::decode(&mut decoder)?;
        let internal_count = decoder.u64()?;
        let leaf_count = decoder.u64()?;
        let height = decoder.u64()?;
        let slot = decoder.u64()?.into();

        let free_count = decoder.u64()? as usize;
        codec::check_count(free_count, FREE_LIST_CAPACITY)?;
        let mut free = Vec::with_capacity(free_count);
        for index in 0..FREE_LIST_CAPACITY {
            let offset = decoder.u64()?;
            if index < free_count {
                free.push(offset.into());
            }
        }

        Ok(Self {
            header,
            internal_count,
            leaf_count,
            height,
            slot,
            freelist: free.into(),
            root: decoder.u64()?.into(),
            leftmost: decoder.u64()?.into(),
            checksum: decoder.u32()?,
        })
    }

    fn encode(&self, bytes: &mut [u8]) -> codec::Result<()> {
        let mut encoder = Encoder::new(bytes);
        self.encode_fields(&mut encoder)?;
        encoder.put_u32(self.calc_checksum())
    }
}

#[cfg(test)]
mod tests {
    use super::{Meta, ValidationError, MAGIC, VERSION};
    use crate::{
        bptree::NodeKind,
        medium::codec::Result,
        storage::{Page, PageOffset},
        FREE_LIST_CAPACITY,
    };

    const PAGE_SIZE: u32 = 4096;

    #[test]
    fn test_default() {
        let meta = Meta::new(PAGE_SIZE, 20);
        assert_eq!(meta.header.magic, MAGIC);
        assert_eq!(meta.header.version, VERSION);
        assert_eq!(meta.header.key_size, 8);
        assert_eq!(meta.header.value_size, 16);
        assert_eq!(meta.order(), 20);
        assert_eq!(meta.slot, PageOffset::from(4096));
        assert!(meta.validate().is_ok());
        assert!(Meta::SIZE < PAGE_SIZE as usize);
    }

    #[test]
    fn test_encoding() -> Result<()> {
        let mut meta = Meta::new(PAGE_SIZE, 20);
        meta.height = 3;
        meta.root = 8192.into();
        meta.leftmost = 4096.into();
        let freed = meta.allocate(NodeKind::Leaf);
        meta.allocate(NodeKind::Branch);
        meta.release(NodeKind::Leaf, freed).unwrap();

        let mut bytes = vec![0; PAGE_SIZE as usize];
        meta.encode(&mut bytes)?;

        let decoded = Meta::decode(&bytes)?;
        assert!(decoded.validate().is_ok());
        assert_eq!(decoded.height, 3);
        assert_eq!(decoded.root, 8192.into());
        assert_eq!(decoded.freelist.as_slice(), &[freed]);
        assert_eq!(decoded.leaf_count, 0);
        assert_eq!(decoded.internal_count, 1);

        // Flip a byte of the leaf count.
        bytes[32] ^= 0xff;
        let corrupted = Meta::decode(&bytes)?;
        assert!(matches!(
            corrupted.validate(),
            Err(ValidationError::ChecksumMismatched)
        ));

        Ok(())
    }

    #[test]
    fn test_allocate() {
        let mut meta = Meta::new(PAGE_SIZE, 20);

        let a = meta.allocate(NodeKind::Branch);
        let b = meta.allocate(NodeKind::Leaf);
        let c = meta.allocate(NodeKind::Leaf);
        assert_eq!((a.raw(), b.raw(), c.raw()), (4096, 8192, 12288));
        assert_eq!(meta.slot, PageOffset::from(16384));

        meta.release(NodeKind::Leaf, b).unwrap();
        meta.release(NodeKind::Leaf, c).unwrap();
        assert_eq!(meta.leaf_count, 0);

        // LIFO reuse before the slot cursor advances.
        assert_eq!(meta.allocate(NodeKind::Leaf), c);
        assert_eq!(meta.allocate(NodeKind::Leaf), b);
        assert_eq!(meta.allocate(NodeKind::Leaf), PageOffset::from(16384));
        assert_eq!(meta.leaf_count, 3);
    }

    #[test]
    fn test_release_overflow() {
        let mut meta = Meta::new(PAGE_SIZE, 20);
        let offsets = (0..=FREE_LIST_CAPACITY)
            .map(|_| meta.allocate(NodeKind::Leaf))
            .collect::<Vec<_>>();

        for offset in &offsets[..FREE_LIST_CAPACITY] {
            meta.release(NodeKind::Leaf, *offset).unwrap();
        }
        assert!(meta.release(NodeKind::Leaf, offsets[FREE_LIST_CAPACITY]).is_err());
        // The failed release leaves the counters alone.
        assert_eq!(meta.leaf_count, 1);
    }
}

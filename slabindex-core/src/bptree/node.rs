use std::mem;

use crate::{
    medium::codec::{self, Decoder, Encoder},
    storage::{Page, PageOffset},
};

/// The two kinds of nodes.
///
/// Node pages carry no tag: which kind lives at an offset follows from the level
/// the offset was reached at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NodeKind {
    Branch,
    Leaf,
}

/// The links every node carries to its neighbours.
///
/// `next` and `prev` chain the nodes of one level in key order; a null offset
/// marks the end of the chain (or the missing parent of the root).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Links {
    pub(crate) parent: PageOffset,
    pub(crate) next: PageOffset,
    pub(crate) prev: PageOffset,
}

/// Behavior shared by branch and leaf nodes.
pub(crate) trait Node: Page {
    fn links(&self) -> &Links;

    fn links_mut(&mut self) -> &mut Links;

    /// The number of entries (children for a branch).
    fn count(&self) -> usize;
}

/// Layout of the node header:
///
/// ```plain
/// ┌────────┬──────┬──────┬─────────┬──────────┐
/// │ Parent │ Next │ Prev │ Count n │ Size     │
/// │  u64   │ u64  │ u64  │   u32   │   u32    │
/// └────────┴──────┴──────┴─────────┴──────────┘
/// ```
///
/// `Size` is the number of bytes the entries occupy after the header.
pub(crate) const HEADER_SIZE: usize = 3 * mem::size_of::<u64>() + 2 * mem::size_of::<u32>();

pub(crate) struct Header {
    pub(crate) links: Links,
    pub(crate) count: usize,
    pub(crate) size: u32,
}

impl Header {
    pub(crate) fn decode(decoder: &mut Decoder<'_>) -> codec::Result<Self> {
        let links = Links {
            parent: decoder.u64()?.into(),
            next: decoder.u64()?.into(),
            prev: decoder.u64()?.into(),
        };
        let count = decoder.u32()? as usize;
        let size = decoder.u32()?;
        Ok(Self { links, count, size })
    }

    pub(crate) fn encode(&self, encoder: &mut Encoder<'_>) -> codec::Result<()> {
        encoder.put_u64(self.links.parent.raw())?;
        encoder.put_u64(self.links.next.raw())?;
        encoder.put_u64(self.links.prev.raw())?;
        encoder.put_u32(self.count as u32)?;
        encoder.put_u32(self.size)
    }

    /// Checks the recorded size against the size the entries should occupy.
    #[inline]
    pub(crate) fn check_size(&self, expected: usize) -> codec::Result<()> {
        if self.size as usize == expected {
            Ok(())
        } else {
            Err(codec::Error::AreaSize {
                recorded: self.size,
                expected: expected as u32,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Header, Links, HEADER_SIZE};
    use crate::medium::codec::{Decoder, Encoder, Error, Result};

    #[test]
    fn test_header() -> Result<()> {
        let header = Header {
            links: Links {
                parent: 4096.into(),
                next: 8192.into(),
                prev: 0.into(),
            },
            count: 3,
            size: 72,
        };

        let mut bytes = [0u8; HEADER_SIZE];
        header.encode(&mut Encoder::new(&mut bytes))?;

        let decoded = Header::decode(&mut Decoder::new(&bytes))?;
        assert_eq!(decoded.links, header.links);
        assert_eq!(decoded.count, 3);
        assert!(decoded.check_size(72).is_ok());
        assert!(matches!(
            decoded.check_size(48),
            Err(Error::AreaSize {
                recorded: 72,
                expected: 48
            })
        ));
        Ok(())
    }
}

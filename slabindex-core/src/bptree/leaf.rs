use crate::{
    bptree::{
        entry::{Entry, Key},
        node::{Header, Links, Node, HEADER_SIZE},
        search::SearchIndex,
    },
    medium::codec::{self, Decoder, Encoder},
    storage::{Page, PageOffset},
};

/// A leaf node: sorted entries plus the links of the leaf chain.
///
/// Layout:
///
/// ```plain
/// ┌────────┬───────────┬───────────┬─────┐
/// │ Header │ Entry 0   │ Entry 1   │ ... │
/// │        │ (24 bytes)│ (24 bytes)│     │
/// └────────┴───────────┴───────────┴─────┘
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Leaf {
    links: Links,
    entries: Vec<Entry>,
}

impl Leaf {
    #[inline]
    pub(crate) fn new(parent: PageOffset) -> Self {
        Self {
            links: Links {
                parent,
                ..Default::default()
            },
            entries: Vec::new(),
        }
    }

    /// The number of entries a leaf page of the given size can hold.
    #[inline]
    pub(crate) fn capacity(page_size: u32) -> usize {
        (page_size as usize).saturating_sub(HEADER_SIZE) / Entry::SIZE
    }

    #[inline]
    pub(crate) fn search(&self, key: Key) -> SearchIndex {
        search!(key, self.entries.len(), idx => self.entries[idx].key)
    }

    /// The position of the first entry whose key is not less than `key`.
    #[inline]
    pub(crate) fn lower_bound(&self, key: Key) -> usize {
        self.search(key).unwrap_or_else(|i| i)
    }

    #[inline]
    pub(crate) fn entries(&self) -> &[Entry] {
        &self.entries
    }

    #[inline]
    pub(crate) fn entry(&self, index: usize) -> Option<&Entry> {
        self.entries.get(index)
    }

    #[inline]
    pub(crate) fn entry_mut(&mut self, index: usize) -> Option<&mut Entry> {
        self.entries.get_mut(index)
    }

    #[inline]
    pub(crate) fn first_key(&self) -> Option<Key> {
        self.entries.first().map(|e| e.key)
    }

    #[inline]
    pub(crate) fn insert(&mut self, index: usize, entry: Entry) {
        self.entries.insert(index, entry);
    }

    #[inline]
    pub(crate) fn remove(&mut self, index: usize) -> Entry {
        self.entries.remove(index)
    }

    #[inline]
    pub(crate) fn push_front(&mut self, entry: Entry) {
        self.entries.insert(0, entry);
    }

    #[inline]
    pub(crate) fn push_back(&mut self, entry: Entry) {
        self.entries.push(entry);
    }

    /// Takes the first entry to lend it to the left neighbour.
    #[inline]
    pub(crate) fn pop_front(&mut self) -> Entry {
        assert!(!self.entries.is_empty(), "cannot lend from an empty leaf");
        self.entries.remove(0)
    }

    /// Takes the last entry to lend it to the right neighbour.
    #[inline]
    pub(crate) fn pop_back(&mut self) -> Entry {
        assert!(!self.entries.is_empty(), "cannot lend from an empty leaf");
        self.entries.remove(self.entries.len() - 1)
    }

    /// Moves the entries from `at` onward into a new leaf with the same parent.
    pub(crate) fn split_off(&mut self, at: usize) -> Leaf {
        Leaf {
            links: Links {
                parent: self.links.parent,
                ..Default::default()
            },
            entries: self.entries.split_off(at),
        }
    }

    /// Appends all entries of the right neighbour `other`.
    #[inline]
    pub(crate) fn append(&mut self, other: &mut Leaf) {
        debug_assert!(
            self.entries.last().map_or(true, |l| other
                .first_key()
                .map_or(true, |f| l.key < f)),
            "entries of the right neighbour must sort after this leaf's"
        );
        self.entries.append(&mut other.entries);
    }
}

impl Node for Leaf {
    #[inline]
    fn links(&self) -> &Links {
        &self.links
    }

    #[inline]
    fn links_mut(&mut self) -> &mut Links {
        &mut self.links
    }

    #[inline]
    fn count(&self) -> usize {
        self.entries.len()
    }
}

impl Page for Leaf {
    fn decode(bytes: &[u8]) -> codec::Result<Self> {
        let mut decoder = Decoder::new(bytes);
        let header = Header::decode(&mut decoder)?;

        codec::check_count(header.count, Self::capacity(bytes.len() as u32))?;
        header.check_size(header.count * Entry::SIZE)?;

        let entries = (0..header.count)
            .map(|_| Entry::decode(&mut decoder))
            .collect::<codec::Result<_>>()?;

        Ok(Self {
            links: header.links,
            entries,
        })
    }

    fn encode(&self, bytes: &mut [u8]) -> codec::Result<()> {
        let count = self.entries.len();
        codec::check_count(count, Self::capacity(bytes.len() as u32))?;

        let mut encoder = Encoder::new(bytes);
        Header {
            links: self.links,
            count,
            size: (count * Entry::SIZE) as u32,
        }
        .encode(&mut encoder)?;

        self.entries.iter().try_for_each(|e| e.encode(&mut encoder))
    }
}

#[cfg(test)]
mod tests {
    use super::Leaf;
    use crate::{
        bptree::{
            entry::{Entry, Locator},
            node::Node,
        },
        medium::codec::{Error, Result},
        storage::{Page, PageOffset},
    };

    const PAGE_SIZE: u32 = 4096;

    fn entry(key: u64) -> Entry {
        Entry::new(key, Locator::new(key * 10, key + 1))
    }

    fn leaf(keys: &[u64]) -> Leaf {
        let mut leaf = Leaf::new(PageOffset::from(4096));
        keys.iter().for_each(|k| leaf.push_back(entry(*k)));
        leaf
    }

    #[test]
    fn test_capacity() {
        assert_eq!(Leaf::capacity(PAGE_SIZE), (4096 - 32) / 24);
        assert_eq!(Leaf::capacity(16), 0);
    }

    #[test]
    fn test_search() {
        let leaf = leaf(&[2, 4, 6, 8]);
        assert_eq!(leaf.search(6), Ok(2));
        assert_eq!(leaf.search(5), Err(2));
        assert_eq!(leaf.lower_bound(1), 0);
        assert_eq!(leaf.lower_bound(9), 4);
    }

    #[test]
    fn test_split_and_append() {
        let mut left = leaf(&[1, 2, 3, 4, 5]);
        let mut right = left.split_off(3);
        assert_eq!(left.count(), 3);
        assert_eq!(right.first_key(), Some(4));
        assert_eq!(right.links().parent, PageOffset::from(4096));

        left.append(&mut right);
        assert_eq!(left.count(), 5);
        assert!(right.entries().is_empty());
    }

    #[test]
    fn test_encoding() -> Result<()> {
        let mut leaf = leaf(&[3, 9, 27]);
        leaf.links_mut().next = PageOffset::from(8192);
        leaf.links_mut().prev = PageOffset::from(12288);

        let mut bytes = vec![0; PAGE_SIZE as usize];
        leaf.encode(&mut bytes)?;
        assert_eq!(Leaf::decode(&bytes)?, leaf);

        // An empty page decodes to an empty, unlinked leaf.
        let empty = Leaf::decode(&vec![0; PAGE_SIZE as usize])?;
        assert!(empty.entries().is_empty());
        assert!(empty.links().parent.is_null());

        // A leaf page claiming more entries than fit.
        bytes[24..28].copy_from_slice(&1000u32.to_le_bytes());
        assert!(matches!(Leaf::decode(&bytes), Err(Error::Count { .. })));
        Ok(())
    }
}

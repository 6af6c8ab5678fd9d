use std::mem;

use crate::{
    bptree::{
        entry::Key,
        node::{Header, Links, Node, HEADER_SIZE},
    },
    medium::codec::{self, Decoder, Encoder},
    storage::{Page, PageOffset},
};

/// An internal node routing lookups to its children.
///
/// Holds `n` children separated by `n - 1` keys: every key reachable through
/// `children[i]` sorts below `keys[i]`, every key through `children[i + 1]` sorts
/// at or above it.
///
/// Layout:
///
/// ```plain
/// ┌────────┬───────────┬──────────────────────┬─────┐
/// │ Header │ Rightmost │ Key 0 │ Child 0      │ ... │
/// │        │    u64    │  u64  │   u64        │     │
/// └────────┴───────────┴──────────────────────┴─────┘
/// ```
///
/// The rightmost child has no key of its own, so it is stored apart from the
/// `n - 1` keyed children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Branch {
    links: Links,
    keys: Vec<Key>,
    children: Vec<PageOffset>,
}

const RECORD_SIZE: usize = 2 * mem::size_of::<u64>();

impl Branch {
    /// Creates a branch with a single child.
    #[inline]
    pub(crate) fn new(parent: PageOffset, child: PageOffset) -> Self {
        Self {
            links: Links {
                parent,
                ..Default::default()
            },
            keys: Vec::new(),
            children: vec![child],
        }
    }

    /// Creates a new root over two children split at `key`.
    #[inline]
    pub(crate) fn new_root(key: Key, left: PageOffset, right: PageOffset) -> Self {
        Self {
            links: Links::default(),
            keys: vec![key],
            children: vec![left, right],
        }
    }

    /// The number of children a branch page of the given size can hold.
    #[inline]
    pub(crate) fn capacity(page_size: u32) -> usize {
        let area = (page_size as usize).saturating_sub(HEADER_SIZE + mem::size_of::<u64>());
        area / RECORD_SIZE + 1
    }

    /// The index of the child to descend into for `key`.
    #[inline]
    pub(crate) fn search(&self, key: Key) -> usize {
        search!(key, self.keys.len(), idx => self.keys[idx])
            .map(|i| i + 1)
            .unwrap_or_else(|i| i)
    }

    #[inline]
    pub(crate) fn keys(&self) -> &[Key] {
        &self.keys
    }

    #[inline]
    pub(crate) fn children(&self) -> &[PageOffset] {
        &self.children
    }

    #[inline]
    pub(crate) fn child(&self, index: usize) -> PageOffset {
        self.children[index]
    }

    #[inline]
    pub(crate) fn key(&self, index: usize) -> Key {
        self.keys[index]
    }

    #[inline]
    pub(crate) fn set_key(&mut self, index: usize, key: Key) {
        self.keys[index] = key;
    }

    /// The position of `child` among the children.
    #[inline]
    pub(crate) fn position(&self, child: PageOffset) -> Option<usize> {
        self.children.iter().position(|c| *c == child)
    }

    /// Inserts `right` after the child at `index`, separated from it by `key`.
    #[inline]
    pub(crate) fn insert(&mut self, index: usize, key: Key, right: PageOffset) {
        self.keys.insert(index, key);
        self.children.insert(index + 1, right);
    }

    /// Removes the separator at `index` along with the child to its right.
    #[inline]
    pub(crate) fn remove(&mut self, index: usize) -> (Key, PageOffset) {
        (self.keys.remove(index), self.children.remove(index + 1))
    }

    /// Takes the first child and the separator after it.
    pub(crate) fn pop_front(&mut self) -> (PageOffset, Key) {
        assert!(self.children.len() > 1, "cannot lend the only child");
        (self.children.remove(0), self.keys.remove(0))
    }

    /// Takes the separator before the last child and the last child.
    pub(crate) fn pop_back(&mut self) -> (Key, PageOffset) {
        assert!(self.children.len() > 1, "cannot lend the only child");
        match (self.keys.pop(), self.children.pop()) {
            (Some(key), Some(child)) => (key, child),
            _ => unreachable!("a branch with more than one child has a key"),
        }
    }

    #[inline]
    pub(crate) fn push_front(&mut self, child: PageOffset, key: Key) {
        self.children.insert(0, child);
        self.keys.insert(0, key);
    }

    #[inline]
    pub(crate) fn push_back(&mut self, key: Key, child: PageOffset) {
        self.keys.push(key);
        self.children.push(child);
    }

    /// Splits the branch in two, keeping the first `at` children.
    ///
    /// Returns the separator between the halves, which belongs to neither of them,
    /// and the right half.
    pub(crate) fn split_off(&mut self, at: usize) -> (Key, Branch) {
        assert!(
            at >= 1 && at < self.children.len(),
            "a split must leave children on both sides"
        );

        let children = self.children.split_off(at);
        let keys = self.keys.split_off(at);
        let middle = self.keys.pop().unwrap_or_else(|| unreachable!());

        let right = Branch {
            links: Links {
                parent: self.links.parent,
                ..Default::default()
            },
            keys,
            children,
        };
        (middle, right)
    }

    /// Appends the right neighbour `other`, pulling `separator` down between them.
    pub(crate) fn merge(&mut self, separator: Key, other: &mut Branch) {
        self.keys.push(separator);
        self.keys.append(&mut other.keys);
        self.children.append(&mut other.children);
    }
}

impl Node for Branch {
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
        self.children.len()
    }
}

impl Page for Branch {
    fn decode(bytes: &[u8]) -> codec::Result<Self> {
        let mut decoder = Decoder::new(bytes);
        let header = Header::decode(&mut decoder)?;

        if header.count == 0 {
            return Err(codec::Error::EmptyBranch);
        }
        codec::check_count(header.count, Self::capacity(bytes.len() as u32))?;
        header.check_size(mem::size_of::<u64>() + (header.count - 1) * RECORD_SIZE)?;

        let rightmost = decoder.u64()?.into();
        let mut keys = Vec::with_capacity(header.count - 1);
        let mut children = Vec::with_capacity(header.count);
        for _ in 1..header.count {
            keys.push(decoder.u64()?);
            children.push(decoder.u64()?.into());
        }
        children.push(rightmost);

        Ok(Self {
            links: header.links,
            keys,
            children,
        })
    }

    fn encode(&self, bytes: &mut [u8]) -> codec::Result<()> {
        let count = self.children.len();
        if count == 0 {
            return Err(codec::Error::EmptyBranch);
        }
        codec::check_count(count, Self::capacity(bytes.len() as u32))?;

        let mut encoder = Encoder::new(bytes);
        Header {
            links: self.links,
            count,
            size: (mem::size_of::<u64>() + (count - 1) * RECORD_SIZE) as u32,
        }
        .encode(&mut encoder)?;

        encoder.put_u64(self.children[count - 1].raw())?;
        for (key, child) in self.keys.iter().zip(&self.children) {
            encoder.put_u64(*key)?;
            encoder.put_u64(child.raw())?;
        }
        Ok(())
    }
}

pub use debug::Stats;
pub use entry::{Entry, Key, Locator};

pub(crate) use debug::Violation;
pub(crate) use index::{TreeIndex, TreeIndexMut};
pub(crate) use node::{Node, NodeKind};

#[macro_use]
mod search;

mod branch;
mod crud;
mod debug;
mod entry;
mod index;
mod leaf;
mod node;
mod rebalance;

use crate::{
    bptree::{
        branch::Branch,
        index::TreeIndexMutExt,
        leaf::Leaf,
    },
    error::Result,
    storage::PageOffset,
};

/// Represents a B+ Tree, all tree algorithms of the index are implemented here.
///
/// Its structure consists of [`node`]s, which are divided into two types: [`branch`] and [`leaf`].
/// The root is always a branch; an empty tree is a root with a single empty leaf.
///
/// Different kinds of algorithms are implemented in different `mod`s.
/// See [`crud`], [`rebalance`], [`debug`] for more details.
pub(crate) struct BPTree<Index> {
    /// The `Index` acts as a bridge between the B+ Tree and the underlying storage,
    /// determining the logic of the interaction between them. See [`index`] mod for more details.
    index: Index,
}

/// The outcome of an insertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// The key is already present; the stored locator is left untouched.
    Duplicate,
}

/// The outcome of an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Updated,
    /// The key is absent, and the leaf it would live in holds a greater key.
    Mismatch,
    /// The key is absent, and sorts after every key of the leaf it would live in.
    NotFound,
}

/// The outcome of a removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    Removed,
    NotFound,
}

/// The largest order whose nodes of both kinds fit a page of `page_size` bytes.
#[inline]
pub(crate) fn max_order(page_size: u32) -> usize {
    Leaf::capacity(page_size).min(Branch::capacity(page_size))
}

impl<Index> BPTree<Index> {
    #[inline]
    pub(crate) fn new(index: Index) -> Self {
        Self { index }
    }

    #[inline]
    pub(crate) fn as_index(&self) -> &Index {
        &self.index
    }

    #[cfg(test)]
    #[inline]
    pub(crate) fn as_index_mut(&mut self) -> &mut Index {
        &mut self.index
    }
}

impl<Index> BPTree<Index>
where
    Index: TreeIndexMut,
{
    /// Lays out an empty tree: a root branch over a single empty leaf.
    pub(crate) fn init(&mut self) -> Result<()> {
        let root_offset = self.index.allocate(NodeKind::Branch);
        let leaf_offset = self.index.allocate(NodeKind::Leaf);

        self.index
            .put_node(root_offset, &Branch::new(PageOffset::NULL, leaf_offset))?;
        self.index.put_node(leaf_offset, &Leaf::new(root_offset))?;

        let meta = self.index.meta_mut();
        meta.root = root_offset;
        meta.leftmost = leaf_offset;
        meta.height = 1;
        self.index.flush_meta()
    }
}

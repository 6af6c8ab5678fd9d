use tracing::error;

use crate::{
    bptree::{
        branch::Branch,
        leaf::Leaf,
        node::{Links, Node, NodeKind},
    },
    error::Result,
    meta::Meta,
    storage::PageOffset,
};

/// Defines how the B+ Tree reads nodes from the underlying storage.
pub(crate) trait TreeIndex {
    fn meta(&self) -> &Meta;

    fn node<N>(&self, offset: PageOffset) -> Result<N>
    where
        N: Node;
}

/// Defines how the B+ Tree writes nodes to the underlying storage, it is also a TreeIndex.
pub(crate) trait TreeIndexMut: TreeIndex {
    fn meta_mut(&mut self) -> &mut Meta;

    fn put_node<N>(&mut self, offset: PageOffset, node: &N) -> Result<()>
    where
        N: Node;

    /// Persists the in-memory meta block.
    fn flush_meta(&mut self) -> Result<()>;
}

pub(crate) trait TreeIndexExt: TreeIndex {
    #[inline]
    fn root(&self) -> Result<Branch> {
        self.node(self.meta().root)
    }

    #[inline]
    fn leaf(&self, offset: PageOffset) -> Result<Leaf> {
        self.node(offset)
    }

    #[inline]
    fn branch(&self, offset: PageOffset) -> Result<Branch> {
        self.node(offset)
    }

    /// The minimum number of entries a non-root node of the given kind must keep.
    #[inline]
    fn min_count(&self, kind: NodeKind) -> usize {
        let meta = self.meta();
        match kind {
            NodeKind::Leaf if meta.leaf_count <= 1 => 0,
            _ => meta.order() / 2,
        }
    }
}

impl<T> TreeIndexExt for T where T: TreeIndex {}

pub(crate) trait TreeIndexMutExt: TreeIndexMut {
    /// Hands out the page for a new node of the given kind.
    #[inline]
    fn allocate(&mut self, kind: NodeKind) -> PageOffset {
        self.meta_mut().allocate(kind)
    }

    /// Returns the page of a removed node to the free list.
    fn free_node(&mut self, kind: NodeKind, offset: PageOffset) -> Result<()> {
        self.meta_mut().release(kind, offset).map_err(|err| {
            error!(%offset, "unable to reclaim node page: {err}");
            err.into()
        })
    }

    /// Points the parent link of each child at `parent`.
    fn reparent(
        &mut self,
        kind: NodeKind,
        children: &[PageOffset],
        parent: PageOffset,
    ) -> Result<()> {
        match kind {
            NodeKind::Branch => children
                .iter()
                .try_for_each(|c| self.update_links::<Branch>(*c, |l| l.parent = parent)),
            NodeKind::Leaf => children
                .iter()
                .try_for_each(|c| self.update_links::<Leaf>(*c, |l| l.parent = parent)),
        }
    }

    /// Points the `prev` link of `next` at `new`, after `new` was spliced in before it.
    #[inline]
    fn link_before<N>(&mut self, next: PageOffset, new: PageOffset) -> Result<()>
    where
        N: Node,
    {
        match next.get() {
            Some(next) => self.update_links::<N>(next, |l| l.prev = new),
            None => Ok(()),
        }
    }

    #[inline]
    fn update_links<N>(
        &mut self,
        offset: PageOffset,
        f: impl FnOnce(&mut Links),
    ) -> Result<()>
    where
        N: Node,
    {
        let mut node = self.node::<N>(offset)?;
        f(node.links_mut());
        self.put_node(offset, &node)
    }
}

impl<T> TreeIndexMutExt for T where T: TreeIndexMut {}

use tracing::debug;

use crate::{
    bptree::{
        branch::Branch,
        entry::Key,
        index::{TreeIndexExt, TreeIndexMut, TreeIndexMutExt},
        leaf::Leaf,
        node::{Node, NodeKind},
        BPTree, RemoveOutcome,
    },
    error::Result,
    storage::PageOffset,
};

/// The siblings of a node that share its parent.
struct Siblings<N> {
    left: Option<(PageOffset, N)>,
    right: Option<(PageOffset, N)>,
}

impl<Index> BPTree<Index>
where
    Index: TreeIndexMut,
{
    pub(crate) fn remove(&mut self, key: Key) -> Result<RemoveOutcome> {
        let (offset, mut leaf) = self.search_leaf(key)?;
        let Ok(index) = leaf.search(key) else {
            return Ok(RemoveOutcome::NotFound);
        };
        leaf.remove(index);

        if leaf.count() >= self.index.min_count(NodeKind::Leaf) {
            self.index.put_node(offset, &leaf)?;
        } else {
            // Nothing is written unless every page the merges may free fits the free list.
            let meta = self.index.meta();
            meta.freelist.reserve(Self::reclaimable(meta.height))?;
            self.rebalance_leaf(offset, leaf)?;
            self.index.flush_meta()?;
        }
        Ok(RemoveOutcome::Removed)
    }

    /// The most pages one removal frees: a merge on every level below the root,
    /// plus the root itself when it collapses.
    #[inline]
    fn reclaimable(height: u64) -> usize {
        height as usize + 1
    }

    fn siblings<N>(&self, parent: &Branch, index: usize) -> Result<Siblings<N>>
    where
        N: Node,
    {
        let read = |index: usize| -> Result<(PageOffset, N)> {
            let offset = parent.child(index);
            self.index.node::<N>(offset).map(|node| (offset, node))
        };

        let left = match index {
            0 => None,
            _ => Some(read(index - 1)?),
        };
        let right = match index + 1 < parent.count() {
            true => Some(read(index + 1)?),
            false => None,
        };
        Ok(Siblings { left, right })
    }

    /// Restores the occupancy of an underflowing leaf by borrowing from or merging
    /// with a sibling.
    fn rebalance_leaf(&mut self, offset: PageOffset, mut leaf: Leaf) -> Result<()> {
        let parent_offset = leaf.links().parent;
        let mut parent = self.index.branch(parent_offset)?;
        let index = self.child_position(&parent, parent_offset, offset)?;
        let min = self.index.min_count(NodeKind::Leaf);
        let Siblings { left, right } = self.siblings::<Leaf>(&parent, index)?;

        if let Some((left_offset, mut left)) = left.clone() {
            if left.count() > min {
                let entry = left.pop_back();
                leaf.push_front(entry);
                parent.set_key(index - 1, entry.key);

                self.index.put_node(left_offset, &left)?;
                self.index.put_node(offset, &leaf)?;
                debug!(%offset, from = %left_offset, "leaf borrowed from left");
                return self.index.put_node(parent_offset, &parent);
            }
        }

        if let Some((right_offset, mut right)) = right.clone() {
            if right.count() > min.max(1) {
                let entry = right.pop_front();
                leaf.push_back(entry);
                parent.set_key(index, right.entries()[0].key);

                self.index.put_node(right_offset, &right)?;
                self.index.put_node(offset, &leaf)?;
                debug!(%offset, from = %right_offset, "leaf borrowed from right");
                return self.index.put_node(parent_offset, &parent);
            }
        }

        match (left, right) {
            // The last child merges into its left sibling.
            (Some((left_offset, mut left)), None) => {
                let next = leaf.links().next;
                left.append(&mut leaf);
                left.links_mut().next = next;
                self.index.link_before::<Leaf>(next, left_offset)?;
                parent.remove(index - 1);

                self.index.put_node(left_offset, &left)?;
                self.index.free_node(NodeKind::Leaf, offset)?;
                debug!(into = %left_offset, %offset, "leaf merged");
            }
            // Otherwise the right sibling merges into this leaf.
            (_, Some((right_offset, mut right))) => {
                let next = right.links().next;
                leaf.append(&mut right);
                leaf.links_mut().next = next;
                self.index.link_before::<Leaf>(next, offset)?;
                parent.remove(index);

                self.index.put_node(offset, &leaf)?;
                self.index.free_node(NodeKind::Leaf, right_offset)?;
                debug!(into = %offset, offset = %right_offset, "leaf merged");
            }
            (None, None) => {
                // An only child underflows only when it is the only leaf.
                return self.index.put_node(offset, &leaf);
            }
        }

        self.rebalance_branch(parent_offset, parent, NodeKind::Leaf)
    }

    /// Restores the occupancy of a branch that lost a child, whose children are of
    /// `kind`, then continues with its parent as needed.
    fn rebalance_branch(
        &mut self,
        offset: PageOffset,
        mut branch: Branch,
        kind: NodeKind,
    ) -> Result<()> {
        let parent_offset = branch.links().parent;
        if parent_offset.is_null() {
            return self.shrink_root(offset, branch);
        }

        let min = self.index.min_count(NodeKind::Branch);
        if branch.count() >= min {
            return self.index.put_node(offset, &branch);
        }

        let mut parent = self.index.branch(parent_offset)?;
        let index = self.child_position(&parent, parent_offset, offset)?;
        let Siblings { left, right } = self.siblings::<Branch>(&parent, index)?;

        if let Some((left_offset, mut left)) = left.clone() {
            if left.count() > min {
                // Rotate right through the parent separator.
                let (key, child) = left.pop_back();
                branch.push_front(child, parent.key(index - 1));
                parent.set_key(index - 1, key);
                self.index.reparent(kind, &[child], offset)?;

                self.index.put_node(left_offset, &left)?;
                self.index.put_node(offset, &branch)?;
                debug!(%offset, from = %left_offset, "branch borrowed from left");
                return self.index.put_node(parent_offset, &parent);
            }
        }

        if let Some((right_offset, mut right)) = right.clone() {
            if right.count() > min {
                // Rotate left through the parent separator.
                let (child, key) = right.pop_front();
                branch.push_back(parent.key(index), child);
                parent.set_key(index, key);
                self.index.reparent(kind, &[child], offset)?;

                self.index.put_node(right_offset, &right)?;
                self.index.put_node(offset, &branch)?;
                debug!(%offset, from = %right_offset, "branch borrowed from right");
                return self.index.put_node(parent_offset, &parent);
            }
        }

        match (left, right) {
            (Some((left_offset, mut left)), None) => {
                let next = branch.links().next;
                self.index.reparent(kind, branch.children(), left_offset)?;
                left.merge(parent.key(index - 1), &mut branch);
                left.links_mut().next = next;
                self.index.link_before::<Branch>(next, left_offset)?;
                parent.remove(index - 1);

                self.index.put_node(left_offset, &left)?;
                self.index.free_node(NodeKind::Branch, offset)?;
                debug!(into = %left_offset, %offset, "branch merged");
            }
            (_, Some((right_offset, mut right))) => {
                let next = right.links().next;
                self.index.reparent(kind, right.children(), offset)?;
                branch.merge(parent.key(index), &mut right);
                branch.links_mut().next = next;
                self.index.link_before::<Branch>(next, offset)?;
                parent.remove(index);

                self.index.put_node(offset, &branch)?;
                self.index.free_node(NodeKind::Branch, right_offset)?;
                debug!(into = %offset, offset = %right_offset, "branch merged");
            }
            (None, None) => unreachable!("a non-root branch always has a sibling"),
        }

        self.rebalance_branch(parent_offset, parent, NodeKind::Branch)
    }

    /// Writes back the root, collapsing it into its only child when that child is a branch.
    fn shrink_root(&mut self, offset: PageOffset, root: Branch) -> Result<()> {
        if root.count() > 1 || self.index.meta().height <= 1 {
            return self.index.put_node(offset, &root);
        }

        let child = root.child(0);
        self.index
            .update_links::<Branch>(child, |l| l.parent = PageOffset::NULL)?;
        self.index.free_node(NodeKind::Branch, offset)?;

        let meta = self.index.meta_mut();
        meta.root = child;
        meta.height -= 1;
        debug!(root_offset = %child, height = meta.height, "root collapsed");
        Ok(())
    }
}

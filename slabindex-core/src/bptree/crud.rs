use tracing::debug;

use crate::{
    bptree::{
        branch::Branch,
        entry::{Entry, Key, Locator},
        index::{TreeIndex, TreeIndexExt, TreeIndexMut, TreeIndexMutExt},
        leaf::Leaf,
        node::{Node, NodeKind},
        BPTree, InsertOutcome, UpdateOutcome, Violation,
    },
    error::Result,
    storage::PageOffset,
};

impl<Index> BPTree<Index>
where
    Index: TreeIndex,
{
    /// Descends from the root to the leaf that `key` belongs to.
    pub(crate) fn search_leaf(&self, key: Key) -> Result<(PageOffset, Leaf)> {
        let mut offset = self.index.meta().root;
        for _ in 0..self.index.meta().height {
            let branch = self.index.branch(offset)?;
            offset = branch.child(branch.search(key));
        }
        self.index.leaf(offset).map(|leaf| (offset, leaf))
    }

    pub(crate) fn search(&self, key: Key) -> Result<Option<Locator>> {
        let (_, leaf) = self.search_leaf(key)?;
        Ok(leaf
            .search(key)
            .ok()
            .and_then(|i| leaf.entry(i))
            .map(|e| e.locator))
    }

    /// Collects up to `limit` entries with keys not less than `key`, in ascending order.
    pub(crate) fn search_range(&self, key: Key, limit: usize) -> Result<Vec<Entry>> {
        let (_, mut leaf) = self.search_leaf(key)?;
        let mut start = leaf.lower_bound(key);
        let mut found = Vec::new();

        while found.len() < limit {
            let take = limit - found.len();
            found.extend(leaf.entries().iter().skip(start).take(take));

            // Later leaves are read from their first entry on.
            start = 0;
            match leaf.links().next.get() {
                Some(next) if found.len() < limit => leaf = self.index.leaf(next)?,
                _ => break,
            }
        }
        Ok(found)
    }

    /// Visits every entry in ascending key order by walking the leaf chain.
    pub(crate) fn for_each(&self, mut f: impl FnMut(Key, Locator)) -> Result<()> {
        let mut next = self.index.meta().leftmost.get();
        while let Some(offset) = next {
            let leaf = self.index.leaf(offset)?;
            leaf.entries().iter().for_each(|e| f(e.key, e.locator));
            next = leaf.links().next.get();
        }
        Ok(())
    }

    /// The position of `child` in `parent`, which must hold it.
    pub(crate) fn child_position(
        &self,
        parent: &Branch,
        parent_offset: PageOffset,
        child: PageOffset,
    ) -> Result<usize> {
        parent.position(child).ok_or_else(|| {
            Violation::ChildMissing {
                parent: parent_offset,
                child,
            }
            .into()
        })
    }
}

impl<Index> BPTree<Index>
where
    Index: TreeIndexMut,
{
    pub(crate) fn insert(&mut self, key: Key, locator: Locator) -> Result<InsertOutcome> {
        let (offset, mut leaf) = self.search_leaf(key)?;
        let index = match leaf.search(key) {
            Ok(_) => return Ok(InsertOutcome::Duplicate),
            Err(index) => index,
        };

        let entry = Entry::new(key, locator);
        if leaf.count() < self.index.meta().order() {
            leaf.insert(index, entry);
            self.index.put_node(offset, &leaf)?;
        } else {
            self.split_leaf(offset, leaf, index, entry)?;
            self.index.flush_meta()?;
        }
        Ok(InsertOutcome::Inserted)
    }

    pub(crate) fn update(&mut self, key: Key, locator: Locator) -> Result<UpdateOutcome> {
        let (offset, mut leaf) = self.search_leaf(key)?;
        let index = leaf.lower_bound(key);

        match leaf.entry_mut(index) {
            None => return Ok(UpdateOutcome::NotFound),
            Some(entry) if entry.key != key => return Ok(UpdateOutcome::Mismatch),
            Some(entry) => entry.locator = locator,
        }
        self.index.put_node(offset, &leaf)?;
        Ok(UpdateOutcome::Updated)
    }

    /// Splits a full leaf in two and inserts `entry` at `index` into the proper half.
    fn split_leaf(
        &mut self,
        offset: PageOffset,
        mut leaf: Leaf,
        index: usize,
        entry: Entry,
    ) -> Result<()> {
        // Whichever side takes the new entry starts one short, so both halves end up even.
        let mut point = leaf.count() / 2;
        let place_right = index > point;
        if place_right {
            point += 1;
        }

        let mut new = leaf.split_off(point);
        if place_right {
            new.insert(index - point, entry);
        } else {
            leaf.insert(index, entry);
        }

        let new_offset = self.index.allocate(NodeKind::Leaf);
        let next = leaf.links().next;
        new.links_mut().prev = offset;
        new.links_mut().next = next;
        leaf.links_mut().next = new_offset;
        self.index.link_before::<Leaf>(next, new_offset)?;

        let separator = new.entries()[0].key;
        self.index.put_node(offset, &leaf)?;
        self.index.put_node(new_offset, &new)?;

        debug!(%offset, %new_offset, separator, "leaf split");
        self.insert_into_parent(leaf.links().parent, separator, offset, new_offset, NodeKind::Leaf)
    }

    /// Hooks `right`, split off from `left`, into the parent of `left`.
    ///
    /// Splits the parent in turn when it overflows, up to growing a new root.
    fn insert_into_parent(
        &mut self,
        parent_offset: PageOffset,
        key: Key,
        left: PageOffset,
        right: PageOffset,
        kind: NodeKind,
    ) -> Result<()> {
        let mut parent = self.index.branch(parent_offset)?;
        let index = self.child_position(&parent, parent_offset, left)?;
        parent.insert(index, key, right);

        if parent.count() <= self.index.meta().order() {
            return self.index.put_node(parent_offset, &parent);
        }

        let (middle, mut new) = parent.split_off((parent.count() + 1) / 2);
        let new_offset = self.index.allocate(NodeKind::Branch);
        let next = parent.links().next;
        new.links_mut().prev = parent_offset;
        new.links_mut().next = next;
        parent.links_mut().next = new_offset;
        self.index.link_before::<Branch>(next, new_offset)?;
        self.index.reparent(kind, new.children(), new_offset)?;

        debug!(%parent_offset, %new_offset, middle, "branch split");

        let grandparent = parent.links().parent;
        if !grandparent.is_null() {
            self.index.put_node(parent_offset, &parent)?;
            self.index.put_node(new_offset, &new)?;
            return self.insert_into_parent(
                grandparent,
                middle,
                parent_offset,
                new_offset,
                NodeKind::Branch,
            );
        }

        // The root split: grow a new root above both halves.
        let root = Branch::new_root(middle, parent_offset, new_offset);
        let root_offset = self.index.allocate(NodeKind::Branch);
        parent.links_mut().parent = root_offset;
        new.links_mut().parent = root_offset;

        self.index.put_node(parent_offset, &parent)?;
        self.index.put_node(new_offset, &new)?;
        self.index.put_node(root_offset, &root)?;

        let meta = self.index.meta_mut();
        meta.root = root_offset;
        meta.height += 1;
        debug!(%root_offset, height = meta.height, "root grown");
        Ok(())
    }
}

use std::fmt::Formatter;

use thiserror::Error;

use crate::{
    bptree::{
        branch::Branch,
        entry::Key,
        index::{TreeIndex, TreeIndexExt},
        leaf::Leaf,
        node::{Node, NodeKind},
        BPTree,
    },
    error::Result,
    storage::PageOffset,
};

/// A broken structural invariant of the tree.
#[derive(Error, Debug)]
pub(crate) enum Violation {
    #[error("page {child} is not a child of its recorded parent {parent}")]
    ChildMissing { parent: PageOffset, child: PageOffset },
    #[error("node {offset} holds {count} entries, outside of [{min}, {max}]")]
    Occupancy {
        offset: PageOffset,
        count: usize,
        min: usize,
        max: usize,
    },
    #[error("key {key} of node {offset} is out of order or out of its parent's bounds")]
    KeyOrder { offset: PageOffset, key: Key },
    #[error("node {offset} records parent {recorded}, expected {expected}")]
    Parent {
        offset: PageOffset,
        recorded: PageOffset,
        expected: PageOffset,
    },
    #[error("the level chain is broken at node {offset}")]
    Chain { offset: PageOffset },
    #[error("the meta block records {recorded} {kind:?} nodes, found {found}")]
    NodeCount {
        kind: NodeKind,
        recorded: u64,
        found: u64,
    },
    #[error("the leftmost leaf is recorded as {recorded}, found {found}")]
    Leftmost {
        recorded: PageOffset,
        found: PageOffset,
    },
}

/// A snapshot of the tree's shape and allocator state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stats {
    pub height: u64,
    pub order: usize,
    pub page_size: u32,
    pub internal_count: u64,
    pub leaf_count: u64,
    /// The number of reclaimed pages waiting for reuse.
    pub free_pages: usize,
    /// The offset at which the file grows next.
    pub slot: u64,
}

/// A node queued for checking, with the key range its parent allows.
struct Pending {
    offset: PageOffset,
    parent: PageOffset,
    low: Option<Key>,
    high: Option<Key>,
}

impl<Index> BPTree<Index>
where
    Index: TreeIndex,
{
    pub(crate) fn stats(&self) -> Stats {
        let meta = self.index.meta();
        Stats {
            height: meta.height,
            order: meta.order(),
            page_size: meta.page_size(),
            internal_count: meta.internal_count,
            leaf_count: meta.leaf_count,
            free_pages: meta.freelist.len(),
            slot: meta.slot.raw(),
        }
    }

    /// Walks the whole tree level by level and verifies every structural invariant.
    pub(crate) fn check(&self) -> Result<()> {
        let meta = self.index.meta();
        let order = meta.order();

        let mut level = vec![Pending {
            offset: meta.root,
            parent: PageOffset::NULL,
            low: None,
            high: None,
        }];
        let mut branches = 0;

        for _ in 0..meta.height {
            let mut below = Vec::new();
            for (i, pending) in level.iter().enumerate() {
                let branch = self.index.branch(pending.offset)?;
                branches += 1;

                let min = match pending.parent.is_null() {
                    true => 1,
                    false => self.index.min_count(NodeKind::Branch),
                };
                self.check_node(&branch, pending, &level, i, min, order)?;
                check_keys(branch.keys(), pending)?;

                for (j, child) in branch.children().iter().enumerate() {
                    below.push(Pending {
                        offset: *child,
                        parent: pending.offset,
                        low: if j == 0 { pending.low } else { Some(branch.key(j - 1)) },
                        high: branch.keys().get(j).copied().or(pending.high),
                    });
                }
            }
            level = below;
        }

        let min = self.index.min_count(NodeKind::Leaf);
        for (i, pending) in level.iter().enumerate() {
            let leaf = self.index.leaf(pending.offset)?;
            self.check_node(&leaf, pending, &level, i, min, order)?;

            let keys = leaf.entries().iter().map(|e| e.key).collect::<Vec<_>>();
            check_keys(&keys, pending)?;
        }

        let counts = [
            (NodeKind::Branch, meta.internal_count, branches),
            (NodeKind::Leaf, meta.leaf_count, level.len() as u64),
        ];
        for (kind, recorded, found) in counts {
            if recorded != found {
                return Err(Violation::NodeCount {
                    kind,
                    recorded,
                    found,
                }
                .into());
            }
        }

        let leftmost = level.first().map_or(PageOffset::NULL, |p| p.offset);
        if meta.leftmost != leftmost {
            return Err(Violation::Leftmost {
                recorded: meta.leftmost,
                found: leftmost,
            }
            .into());
        }
        Ok(())
    }

    /// Checks occupancy, the parent link and the level chain of the `i`-th node of `level`.
    fn check_node<N>(
        &self,
        node: &N,
        pending: &Pending,
        level: &[Pending],
        i: usize,
        min: usize,
        max: usize,
    ) -> Result<()>
    where
        N: Node,
    {
        let offset = pending.offset;
        let count = node.count();
        if count < min || count > max {
            return Err(Violation::Occupancy {
                offset,
                count,
                min,
                max,
            }
            .into());
        }

        let links = node.links();
        if links.parent != pending.parent {
            return Err(Violation::Parent {
                offset,
                recorded: links.parent,
                expected: pending.parent,
            }
            .into());
        }

        let prev = i.checked_sub(1).map_or(PageOffset::NULL, |p| level[p].offset);
        let next = level.get(i + 1).map_or(PageOffset::NULL, |n| n.offset);
        if links.prev != prev || links.next != next {
            return Err(Violation::Chain { offset }.into());
        }
        Ok(())
    }

    #[inline]
    pub(crate) fn dump(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "┓")?;
        let root = self.index.root()?;
        self.dump_branch(root, 1, String::new(), f)
    }

    fn dump_branch(
        &self,
        branch: Branch,
        depth: u64,
        prefix: String,
        f: &mut Formatter<'_>,
    ) -> std::fmt::Result {
        for (index, offset) in branch.children().iter().enumerate() {
            let is_last = index == branch.count() - 1;

            if index > 0 {
                writeln!(f, "{}┣━ {}", prefix, branch.key(index - 1))?;
            }

            f.write_str(&prefix)?;
            if is_last {
                writeln!(f, "┗━━━━━━┓ ({})", offset)?;
            } else {
                writeln!(f, "┣━━━━━━┓ ({})", offset)?;
            }

            let next_prefix = prefix.clone() + if is_last { "       " } else { "┃      " };
            if depth < self.index.meta().height {
                self.dump_branch(self.index.branch(*offset)?, depth + 1, next_prefix, f)?;
            } else {
                self.dump_leaf(self.index.leaf(*offset)?, next_prefix, f)?;
            }
        }
        Ok(())
    }

    fn dump_leaf(&self, leaf: Leaf, prefix: String, f: &mut Formatter<'_>) -> std::fmt::Result {
        for (index, entry) in leaf.entries().iter().enumerate() {
            let weld = if index == leaf.count() - 1 { "┗" } else { "┣" };
            let locator = entry.locator;
            writeln!(
                f,
                "{}{}━ {} => ({}, {})",
                prefix, weld, entry.key, locator.segment_id, locator.slot_index
            )?;
        }
        Ok(())
    }
}

/// Keys must ascend strictly and stay within `[low, high)`.
fn check_keys(keys: &[Key], pending: &Pending) -> Result<()> {
    let mut prev = None;
    for key in keys.iter().copied() {
        let in_order = prev.map_or(true, |p| p < key);
        let above = pending.low.map_or(true, |low| key >= low);
        let below = pending.high.map_or(true, |high| key < high);
        if !(in_order && above && below) {
            return Err(Violation::KeyOrder {
                offset: pending.offset,
                key,
            }
            .into());
        }
        prev = Some(key);
    }
    Ok(())
}

impl From<crate::error::Error> for std::fmt::Error {
    #[inline]
    fn from(_: crate::error::Error) -> Self {
        Self
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        bptree::{
            index::{TreeIndex, TreeIndexExt, TreeIndexMut, TreeIndexMutExt},
            leaf::Leaf,
            node::Node,
            tests::{locator, tree, MemIndex},
            BPTree,
        },
        error::{ErrorCode, Result},
    };

    #[test]
    fn test_stats() -> Result<()> {
        let mut tree = tree(4);
        for key in 0..5 {
            tree.insert(key, locator(key))?;
        }

        let stats = tree.stats();
        assert_eq!(stats.height, 1);
        assert_eq!(stats.order, 4);
        assert_eq!(stats.leaf_count, 2);
        assert_eq!(stats.internal_count, 1);
        assert_eq!(stats.free_pages, 0);
        assert_eq!(stats.slot, 4 * 4096);
        Ok(())
    }

    #[test]
    fn test_check_detects_corruption() -> Result<()> {
        let mut tree = tree(4);
        for key in 0..12 {
            tree.insert(key, locator(key))?;
        }
        tree.check()?;

        // Swap two keys of the leftmost leaf behind the tree's back.
        let offset = tree.as_index().meta().leftmost;
        let mut leaf = tree.as_index().leaf(offset)?;
        let (a, b) = (leaf.entries()[0], leaf.entries()[1]);
        leaf.remove(0);
        leaf.remove(0);
        leaf.push_front(a);
        leaf.push_front(b);
        tree.as_index_mut().put_node(offset, &leaf)?;

        let err = tree.check().unwrap_err();
        assert_eq!(err.code(), ErrorCode::DatabaseCorrupted);
        Ok(())
    }

    #[test]
    fn test_check_detects_broken_chain() -> Result<()> {
        let mut tree = tree(4);
        for key in 0..12 {
            tree.insert(key, locator(key))?;
        }

        let offset = tree.as_index().meta().leftmost;
        tree.as_index_mut()
            .update_links::<Leaf>(offset, |l| l.next = l.prev)?;
        assert!(tree.check().is_err());

        let leaf = tree.as_index().leaf(offset)?;
        assert!(leaf.links().next.is_null());
        Ok(())
    }

    #[test]
    fn test_dump() -> Result<()> {
        let mut tree = tree(4);
        for key in [10, 20, 30, 40, 50] {
            tree.insert(key, locator(key))?;
        }

        struct Dump<'a>(&'a BPTree<MemIndex>);
        impl std::fmt::Debug for Dump<'_> {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                self.0.dump(f)
            }
        }

        let dump = format!("{:?}", Dump(&tree));
        assert!(dump.starts_with("┓\n"));
        assert!(dump.contains("┣━ 40"));
        assert!(dump.contains("┗━ 50 => (1, 150)"));
        Ok(())
    }
}

use std::fmt::{Debug, Formatter};

use crate::{
    bptree::{BPTree, Stats},
    pager::Readonly,
    Result,
};

/// Inspects the shape of an index: statistics, a full structural check, and a
/// tree dump through its `Debug` output.
///
/// Holds the backing file acquired while alive.
pub struct Debugger<'a> {
    bptree: BPTree<Readonly<'a>>,
}

impl<'a> Debugger<'a> {
    #[inline]
    pub(crate) fn new(bptree: BPTree<Readonly<'a>>) -> Self {
        Self { bptree }
    }

    #[inline]
    pub fn stats(&self) -> Stats {
        self.bptree.stats()
    }

    /// Verifies every structural invariant of the tree: node occupancy, key order,
    /// separator bounds, parent and sibling links, and the node counts of the meta block.
    ///
    /// Fails with [`ErrorCode::DatabaseCorrupted`](crate::ErrorCode::DatabaseCorrupted)
    /// on the first violation found.
    #[inline]
    pub fn check(&self) -> Result<()> {
        self.bptree.check()
    }
}

impl Debug for Debugger<'_> {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.bptree.dump(f)
    }
}

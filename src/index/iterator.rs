//! Forward leaf-chain iterator.

use super::leaf::LeafNode;
use crate::index::error::IndexError;
use crate::index::{IndexKey, RecordId};
use crate::storage::{BufferPool, DiskManager, PageId, PageReadGuard, Replacer};

/// Forward scan over the tree's entries in ascending key order.
///
/// The iterator holds a shared latch (and pin) on the current leaf and
/// walks the `next` sibling chain, coupling onto the next leaf before
/// releasing the current one. Exhaustion releases the last leaf.
pub struct TreeIter<'a, D: DiskManager, R: Replacer> {
    pool: &'a BufferPool<D, R>,
    guard: Option<PageReadGuard<'a, D, R>>,
    index: usize,
}

impl<'a, D: DiskManager, R: Replacer> TreeIter<'a, D, R> {
    pub(crate) fn new(
        pool: &'a BufferPool<D, R>,
        guard: Option<PageReadGuard<'a, D, R>>,
        index: usize,
    ) -> Self {
        Self { pool, guard, index }
    }

    /// The leaf currently under the cursor, if any.
    pub fn current_leaf(&self) -> Option<PageId> {
        self.guard.as_ref().map(|g| g.page_id())
    }
}

impl<D: DiskManager, R: Replacer> Iterator for TreeIter<'_, D, R> {
    type Item = Result<(IndexKey, RecordId), IndexError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let next_id = {
                let guard = self.guard.as_ref()?;
                let leaf = LeafNode::new(&**guard);
                if self.index < leaf.size() {
                    let item = (leaf.key_at(self.index), leaf.rid_at(self.index));
                    self.index += 1;
                    return Some(Ok(item));
                }
                leaf.next()
            };
            match next_id {
                None => {
                    self.guard = None;
                    return None;
                }
                Some(page_id) => match self.pool.fetch_page_read(page_id) {
                    Ok(next_guard) => {
                        self.guard = Some(next_guard);
                        self.index = 0;
                    }
                    Err(e) => {
                        self.guard = None;
                        return Some(Err(e.into()));
                    }
                },
            }
        }
    }
}

//! The B+tree: search, insertion with splits, deletion with
//! coalesce/redistribute, and persistent root tracking.
//!
//! # Latching protocol
//!
//! A `root_latch` serializes every thread that may read or move the root
//! while entering the tree. Reads descend with latch coupling: latch the
//! child shared, release the parent. Writes descend holding exclusive
//! latches, keeping the latched ancestors of the current node in the
//! operation's page set; as soon as the current node is *safe* (cannot
//! propagate a split or merge upward) every ancestor latch and the root
//! latch are released.
//!
//! Structural changes therefore happen with the whole affected path
//! exclusively latched, which lets split and merge helpers drop child
//! latches before touching the parent: nothing can descend into the
//! subtree past the still-latched ancestors.

use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use tracing::debug;

use super::header::HeaderPage;
use super::internal::{InternalNode, INTERNAL_ENTRY_SIZE};
use super::iterator::TreeIter;
use super::leaf::{LeafNode, LEAF_ENTRY_SIZE};
use super::node::{self, NodeKind, NODE_HEADER_SIZE};
use crate::index::error::IndexError;
use crate::index::{IndexKey, RecordId};
use crate::storage::{BufferPool, DiskManager, PageId, PageReadGuard, PageWriteGuard, Replacer};
use crate::storage::PAGE_SIZE;

/// Tree fan-out configuration.
///
/// The defaults fill a page; tests use tiny values to force splits and
/// merges with few keys.
#[derive(Debug, Clone, Copy)]
pub struct TreeOptions {
    /// Max entries per leaf. A leaf holds at most `leaf_max_size - 1`
    /// records at rest.
    pub leaf_max_size: usize,
    /// Max entries per internal node at rest; one extra slot is reserved
    /// for the transient overflow that triggers a split.
    pub internal_max_size: usize,
}

impl Default for TreeOptions {
    fn default() -> Self {
        Self {
            leaf_max_size: (PAGE_SIZE - NODE_HEADER_SIZE) / LEAF_ENTRY_SIZE,
            internal_max_size: (PAGE_SIZE - NODE_HEADER_SIZE) / INTERNAL_ENTRY_SIZE - 1,
        }
    }
}

impl TreeOptions {
    fn validate(&self) {
        assert!(self.leaf_max_size >= 3, "leaf_max_size must be at least 3");
        assert!(
            self.internal_max_size >= 3,
            "internal_max_size must be at least 3"
        );
        assert!(
            NODE_HEADER_SIZE + self.leaf_max_size * LEAF_ENTRY_SIZE <= PAGE_SIZE,
            "leaf_max_size does not fit in a page"
        );
        assert!(
            NODE_HEADER_SIZE + (self.internal_max_size + 1) * INTERNAL_ENTRY_SIZE <= PAGE_SIZE,
            "internal_max_size does not fit in a page"
        );
    }
}

/// What a write descent intends to do; decides when a node is safe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    Insert,
    Delete,
}

/// Where a read descent is headed.
#[derive(Debug, Clone, Copy)]
enum Target {
    Key(IndexKey),
    Leftmost,
}

/// Per-operation scratchpad: the latched-ancestor page set, the pages
/// queued for deletion, and the root-latch token.
struct Context<'a, D: DiskManager, R: Replacer> {
    page_set: Vec<PageWriteGuard<'a, D, R>>,
    deleted: Vec<PageId>,
    root_token: Option<MutexGuard<'a, ()>>,
}

impl<'a, D: DiskManager, R: Replacer> Context<'a, D, R> {
    fn new() -> Self {
        Self {
            page_set: Vec::new(),
            deleted: Vec::new(),
            root_token: None,
        }
    }

    /// Releases every held ancestor latch and the root latch.
    fn release_ancestors(&mut self) {
        self.page_set.clear();
        self.root_token = None;
    }
}

/// A concurrent B+tree mapping [`IndexKey`]s to [`RecordId`]s.
///
/// All operations take `&self` and are thread-safe; share the tree with
/// an `Arc` to use it from several threads.
pub struct BPlusTree<D: DiskManager, R: Replacer> {
    pool: Arc<BufferPool<D, R>>,
    header_page_id: PageId,
    leaf_max_size: usize,
    internal_max_size: usize,
    /// Serializes threads that may read or update `root_page_id` while
    /// entering the tree.
    root_latch: Mutex<()>,
}

impl<D: DiskManager, R: Replacer> BPlusTree<D, R> {
    /// Creates a new empty tree, allocating its header page from the pool.
    pub fn create(
        pool: Arc<BufferPool<D, R>>,
        options: TreeOptions,
    ) -> Result<Self, IndexError> {
        options.validate();
        let header_page_id = {
            let mut guard = pool.new_page()?;
            HeaderPage::init(&mut *guard);
            guard.page_id()
        };
        Ok(Self {
            pool,
            header_page_id,
            leaf_max_size: options.leaf_max_size,
            internal_max_size: options.internal_max_size,
            root_latch: Mutex::new(()),
        })
    }

    /// Opens an existing tree rooted at `header_page_id`, keeping its
    /// persisted contents.
    ///
    /// # Errors
    ///
    /// Returns `IndexError::Corrupted` if the header page does not carry
    /// a valid tree header.
    pub fn open(
        pool: Arc<BufferPool<D, R>>,
        header_page_id: PageId,
        options: TreeOptions,
    ) -> Result<Self, IndexError> {
        options.validate();
        {
            let guard = pool.fetch_page_read(header_page_id)?;
            HeaderPage::new(&*guard).validate()?;
        }
        Ok(Self {
            pool,
            header_page_id,
            leaf_max_size: options.leaf_max_size,
            internal_max_size: options.internal_max_size,
            root_latch: Mutex::new(()),
        })
    }

    /// The page holding this tree's header.
    pub fn header_page_id(&self) -> PageId {
        self.header_page_id
    }

    /// The current root page, or `None` for an empty tree.
    pub fn root_page_id(&self) -> Result<Option<PageId>, IndexError> {
        self.read_root()
    }

    /// True iff the tree holds no keys.
    pub fn is_empty(&self) -> Result<bool, IndexError> {
        Ok(self.read_root()?.is_none())
    }

    /// Point lookup.
    pub fn get(&self, key: IndexKey) -> Result<Option<RecordId>, IndexError> {
        let Some(guard) = self.find_leaf_read(Target::Key(key))? else {
            return Ok(None);
        };
        Ok(LeafNode::new(&*guard).lookup(key))
    }

    /// Inserts `key -> rid`. Returns `false` (tree unchanged) if the key
    /// is already present.
    pub fn insert(&self, key: IndexKey, rid: RecordId) -> Result<bool, IndexError> {
        let mut ctx = Context::new();
        ctx.root_token = Some(self.root_latch.lock());

        let Some(root_id) = self.read_root()? else {
            self.start_new_tree(key, rid)?;
            return Ok(true);
        };

        let mut leaf_guard = self.descend_write(root_id, key, Access::Insert, &mut ctx)?;

        if LeafNode::new(&*leaf_guard).lookup(key).is_some() {
            return Ok(false);
        }
        let new_size = LeafNode::new(&mut *leaf_guard).insert(key, rid);
        if new_size < self.leaf_max_size {
            return Ok(true);
        }

        // Leaf is full: split it and push the new sibling's first key up.
        let (split_key, new_leaf_guard) = self.split_leaf(&mut leaf_guard)?;
        let old_id = leaf_guard.page_id();
        let old_parent = node::parent(&*leaf_guard);
        let new_id = new_leaf_guard.page_id();
        drop(new_leaf_guard);
        drop(leaf_guard);
        self.insert_into_parent(old_id, old_parent, split_key, new_id, &mut ctx)?;
        Ok(true)
    }

    /// Removes `key`. Returns `false` (tree unchanged) if absent.
    pub fn remove(&self, key: IndexKey) -> Result<bool, IndexError> {
        let mut ctx = Context::new();
        ctx.root_token = Some(self.root_latch.lock());

        let Some(root_id) = self.read_root()? else {
            return Ok(false);
        };

        let mut leaf_guard = self.descend_write(root_id, key, Access::Delete, &mut ctx)?;

        if LeafNode::new(&*leaf_guard).lookup(key).is_none() {
            return Ok(false);
        }
        LeafNode::new(&mut *leaf_guard).remove(key);
        self.coalesce_or_redistribute(leaf_guard, &mut ctx)?;
        ctx.release_ancestors();

        for page_id in std::mem::take(&mut ctx.deleted) {
            let removed = self.pool.delete_page(page_id)?;
            debug_assert!(removed, "emptied tree page must be unpinned");
        }
        Ok(true)
    }

    /// Forward scan over all entries in key order.
    pub fn iter(&self) -> Result<TreeIter<'_, D, R>, IndexError> {
        let guard = self.find_leaf_read(Target::Leftmost)?;
        Ok(TreeIter::new(self.pool.as_ref(), guard, 0))
    }

    /// Forward scan starting at the first entry with key `>= key`.
    pub fn iter_from(&self, key: IndexKey) -> Result<TreeIter<'_, D, R>, IndexError> {
        let guard = self.find_leaf_read(Target::Key(key))?;
        let index = guard
            .as_ref()
            .map(|g| LeafNode::new(&**g).key_index(key))
            .unwrap_or(0);
        Ok(TreeIter::new(self.pool.as_ref(), guard, index))
    }

    // === Root bookkeeping ===

    fn read_root(&self) -> Result<Option<PageId>, IndexError> {
        let guard = self.pool.fetch_page_read(self.header_page_id)?;
        Ok(HeaderPage::new(&*guard).root())
    }

    fn write_root(&self, root: Option<PageId>) -> Result<(), IndexError> {
        let mut guard = self.pool.fetch_page_write(self.header_page_id)?;
        HeaderPage::new(&mut *guard).set_root(root);
        Ok(())
    }

    /// Plants the first leaf. The caller holds the root latch.
    fn start_new_tree(&self, key: IndexKey, rid: RecordId) -> Result<(), IndexError> {
        let mut guard = self.pool.new_page()?;
        let page_id = guard.page_id();
        let mut leaf = LeafNode::init(&mut *guard, page_id, None, self.leaf_max_size);
        leaf.insert(key, rid);
        drop(guard);
        self.write_root(Some(page_id))?;
        debug!(root = page_id.page_num(), "started new tree");
        Ok(())
    }

    // === Descent ===

    /// Read descent with latch coupling; returns the target leaf, or
    /// `None` for an empty tree.
    fn find_leaf_read(
        &self,
        target: Target,
    ) -> Result<Option<PageReadGuard<'_, D, R>>, IndexError> {
        let root_token = self.root_latch.lock();
        let Some(root_id) = self.read_root()? else {
            drop(root_token);
            return Ok(None);
        };
        let mut guard = self.pool.fetch_page_read(root_id)?;
        drop(root_token);

        loop {
            match node::node_kind(&*guard)? {
                NodeKind::Leaf => return Ok(Some(guard)),
                NodeKind::Internal => {
                    let child_id = {
                        let internal = InternalNode::new(&*guard);
                        match target {
                            Target::Key(key) => internal.lookup(key),
                            Target::Leftmost => internal.value_at(0),
                        }
                    };
                    let child_guard = self.pool.fetch_page_read(child_id)?;
                    guard = child_guard;
                }
            }
        }
    }

    /// Write descent: exclusive latches top-down, ancestors kept in the
    /// page set until the current node is safe for `access`.
    fn descend_write<'a>(
        &'a self,
        root_id: PageId,
        key: IndexKey,
        access: Access,
        ctx: &mut Context<'a, D, R>,
    ) -> Result<PageWriteGuard<'a, D, R>, IndexError> {
        let mut guard = self.pool.fetch_page_write(root_id)?;
        if is_safe(&guard, access) {
            ctx.release_ancestors();
        }
        loop {
            if node::node_kind(&*guard)? == NodeKind::Leaf {
                return Ok(guard);
            }
            let child_id = InternalNode::new(&*guard).lookup(key);
            let child_guard = self.pool.fetch_page_write(child_id)?;
            ctx.page_set.push(guard);
            if is_safe(&child_guard, access) {
                ctx.release_ancestors();
            }
            guard = child_guard;
        }
    }

    // === Insertion internals ===

    /// Splits a full leaf: the upper half moves to a fresh right sibling
    /// and the leaf chain is spliced. Returns the split key (the new
    /// leaf's first key) and the new leaf, still latched.
    fn split_leaf<'a>(
        &'a self,
        old_guard: &mut PageWriteGuard<'a, D, R>,
    ) -> Result<(IndexKey, PageWriteGuard<'a, D, R>), IndexError> {
        let mut new_guard = self.pool.new_page()?;
        let new_id = new_guard.page_id();
        let old_parent = node::parent(&**old_guard);
        let old_next = node::next_leaf(&**old_guard);
        {
            let mut new_leaf =
                LeafNode::init(&mut *new_guard, new_id, old_parent, self.leaf_max_size);
            let mut old_leaf = LeafNode::new(&mut **old_guard);
            old_leaf.move_half_to(&mut new_leaf);
            new_leaf.set_next(old_next);
            old_leaf.set_next(Some(new_id));
        }
        let split_key = LeafNode::new(&*new_guard).key_at(0);
        debug!(
            left = old_guard.page_id().page_num(),
            right = new_id.page_num(),
            split_key,
            "leaf split"
        );
        Ok((split_key, new_guard))
    }

    /// Splits an overflowed internal node (`size == max_size + 1`) into
    /// two halves and re-parents the moved children. Returns the split
    /// key and the new node, still latched.
    fn split_internal<'a>(
        &'a self,
        old_guard: &mut PageWriteGuard<'a, D, R>,
    ) -> Result<(IndexKey, PageWriteGuard<'a, D, R>), IndexError> {
        let mut new_guard = self.pool.new_page()?;
        let new_id = new_guard.page_id();
        let old_parent = node::parent(&**old_guard);
        {
            let mut new_node =
                InternalNode::init(&mut *new_guard, new_id, old_parent, self.internal_max_size);
            let mut old_node = InternalNode::new(&mut **old_guard);
            old_node.move_half_to(&mut new_node);
        }
        let (split_key, children) = {
            let new_node = InternalNode::new(&*new_guard);
            let children: Vec<_> = (0..new_node.size()).map(|i| new_node.value_at(i)).collect();
            (new_node.key_at(0), children)
        };
        for child in children {
            self.reparent(child, Some(new_id))?;
        }
        debug!(
            left = old_guard.page_id().page_num(),
            right = new_id.page_num(),
            split_key,
            "internal node split"
        );
        Ok((split_key, new_guard))
    }

    /// Propagates a split upward: links `new_id` (right half of the node
    /// `old_id`) into the parent, splitting ancestors as needed. The
    /// child guards are already dropped; the latched ancestors in the
    /// page set fence off the subtree.
    fn insert_into_parent<'a>(
        &'a self,
        old_id: PageId,
        old_parent: Option<PageId>,
        key: IndexKey,
        new_id: PageId,
        ctx: &mut Context<'a, D, R>,
    ) -> Result<(), IndexError> {
        let Some(parent_id) = old_parent else {
            // The split node was the root: grow the tree by one level.
            let mut root_guard = self.pool.new_page()?;
            let root_id = root_guard.page_id();
            {
                let mut root =
                    InternalNode::init(&mut *root_guard, root_id, None, self.internal_max_size);
                root.populate_new_root(old_id, key, new_id);
            }
            drop(root_guard);
            self.reparent(old_id, Some(root_id))?;
            self.reparent(new_id, Some(root_id))?;
            debug_assert!(
                ctx.root_token.is_some(),
                "root latch must be held while growing the tree"
            );
            self.write_root(Some(root_id))?;
            debug!(root = root_id.page_num(), "tree grew a new root");
            ctx.release_ancestors();
            return Ok(());
        };

        let mut parent_guard = ctx
            .page_set
            .pop()
            .expect("parent latch held during split propagation");
        debug_assert_eq!(parent_guard.page_id(), parent_id);

        let new_size =
            InternalNode::new(&mut *parent_guard).insert_node_after(old_id, key, new_id);
        if new_size <= self.internal_max_size {
            ctx.release_ancestors();
            return Ok(());
        }

        let (split_key, new_parent_guard) = self.split_internal(&mut parent_guard)?;
        let parent_parent = node::parent(&*parent_guard);
        let new_parent_id = new_parent_guard.page_id();
        drop(new_parent_guard);
        drop(parent_guard);
        self.insert_into_parent(parent_id, parent_parent, split_key, new_parent_id, ctx)
    }

    // === Deletion internals ===

    /// Restores the minimum-fill invariant for an underflowing node,
    /// consuming its guard. Recurses up through the latched ancestors if
    /// a merge empties the parent below its minimum.
    fn coalesce_or_redistribute<'a>(
        &'a self,
        mut node_guard: PageWriteGuard<'a, D, R>,
        ctx: &mut Context<'a, D, R>,
    ) -> Result<(), IndexError> {
        if node::is_root(&*node_guard) {
            return self.adjust_root(node_guard, ctx);
        }

        let kind = node::node_kind(&*node_guard)?;
        let size = node::size(&*node_guard);
        let max = node::max_size(&*node_guard);
        if size >= node::min_size(kind, max) {
            ctx.release_ancestors();
            return Ok(());
        }

        let mut parent_guard = ctx
            .page_set
            .pop()
            .expect("parent latch held for an unsafe child");
        let node_id = node_guard.page_id();
        let (index, sibling_id) = {
            let parent = InternalNode::new(&*parent_guard);
            let index = parent
                .value_index(node_id)
                .expect("node must be present in its parent");
            let sibling_index = if index == 0 { 1 } else { index - 1 };
            (index, parent.value_at(sibling_index))
        };
        let mut sibling_guard = self.pool.fetch_page_write(sibling_id)?;

        // Redistribute only when the two nodes cannot merge: a merged
        // leaf must stay below max_size (its at-rest bound), a merged
        // internal node may reach it exactly. With these thresholds a
        // lending sibling always keeps its minimum fill.
        let merge_limit = match kind {
            NodeKind::Leaf => max,
            NodeKind::Internal => max + 1,
        };
        if size + node::size(&*sibling_guard) >= merge_limit {
            self.redistribute(&mut node_guard, &mut sibling_guard, &mut parent_guard, index)?;
            ctx.release_ancestors();
            return Ok(());
        }

        // Merge right into left; the parent loses the separator entry.
        let (mut left_guard, mut right_guard, key_index) = if index == 0 {
            (node_guard, sibling_guard, 1)
        } else {
            (sibling_guard, node_guard, index)
        };
        let middle_key = InternalNode::new(&*parent_guard).key_at(key_index);

        match kind {
            NodeKind::Leaf => {
                let right_next = node::next_leaf(&*right_guard);
                let mut right = LeafNode::new(&mut *right_guard);
                let mut left = LeafNode::new(&mut *left_guard);
                right.move_all_to(&mut left);
                left.set_next(right_next);
            }
            NodeKind::Internal => {
                let left_old_size = node::size(&*left_guard);
                {
                    let mut right = InternalNode::new(&mut *right_guard);
                    let mut left = InternalNode::new(&mut *left_guard);
                    right.move_all_to(&mut left, middle_key);
                }
                let left_id = left_guard.page_id();
                let children: Vec<_> = {
                    let left = InternalNode::new(&*left_guard);
                    (left_old_size..left.size()).map(|i| left.value_at(i)).collect()
                };
                for child in children {
                    self.reparent(child, Some(left_id))?;
                }
            }
        }

        debug!(
            left = left_guard.page_id().page_num(),
            right = right_guard.page_id().page_num(),
            "merged siblings"
        );
        ctx.deleted.push(right_guard.page_id());
        InternalNode::new(&mut *parent_guard).remove(key_index);
        drop(left_guard);
        drop(right_guard);

        self.coalesce_or_redistribute(parent_guard, ctx)
    }

    /// Moves one entry from the (larger) sibling into the underflowing
    /// node and refreshes the parent's separator key.
    fn redistribute(
        &self,
        node_guard: &mut PageWriteGuard<'_, D, R>,
        sibling_guard: &mut PageWriteGuard<'_, D, R>,
        parent_guard: &mut PageWriteGuard<'_, D, R>,
        index: usize,
    ) -> Result<(), IndexError> {
        let kind = node::node_kind(&**node_guard)?;
        let node_id = node_guard.page_id();

        match kind {
            NodeKind::Leaf => {
                if index == 0 {
                    // Sibling is the right neighbor: borrow its first.
                    {
                        let mut sibling = LeafNode::new(&mut **sibling_guard);
                        let mut node = LeafNode::new(&mut **node_guard);
                        sibling.move_first_to_end_of(&mut node);
                    }
                    let separator = LeafNode::new(&**sibling_guard).key_at(0);
                    InternalNode::new(&mut **parent_guard).set_key_at(1, separator);
                } else {
                    // Sibling is the left neighbor: borrow its last.
                    {
                        let mut sibling = LeafNode::new(&mut **sibling_guard);
                        let mut node = LeafNode::new(&mut **node_guard);
                        sibling.move_last_to_front_of(&mut node);
                    }
                    let separator = LeafNode::new(&**node_guard).key_at(0);
                    InternalNode::new(&mut **parent_guard).set_key_at(index, separator);
                }
            }
            NodeKind::Internal => {
                if index == 0 {
                    let middle_key = InternalNode::new(&**parent_guard).key_at(1);
                    let moved_child = {
                        let mut sibling = InternalNode::new(&mut **sibling_guard);
                        let mut node = InternalNode::new(&mut **node_guard);
                        sibling.move_first_to_end_of(&mut node, middle_key)
                    };
                    self.reparent(moved_child, Some(node_id))?;
                    let separator = InternalNode::new(&**sibling_guard).key_at(0);
                    InternalNode::new(&mut **parent_guard).set_key_at(1, separator);
                } else {
                    let middle_key = InternalNode::new(&**parent_guard).key_at(index);
                    let moved_child = {
                        let mut sibling = InternalNode::new(&mut **sibling_guard);
                        let mut node = InternalNode::new(&mut **node_guard);
                        sibling.move_last_to_front_of(&mut node, middle_key)
                    };
                    self.reparent(moved_child, Some(node_id))?;
                    let separator = InternalNode::new(&**node_guard).key_at(0);
                    InternalNode::new(&mut **parent_guard).set_key_at(index, separator);
                }
            }
        }

        debug!(
            node = node_id.page_num(),
            sibling = sibling_guard.page_id().page_num(),
            "redistributed one entry"
        );
        Ok(())
    }

    /// The root is exempt from the minimum fill; it only shrinks the
    /// tree. An empty leaf root empties the tree; an internal root left
    /// with a single child hands the root role to that child.
    fn adjust_root<'a>(
        &'a self,
        mut root_guard: PageWriteGuard<'a, D, R>,
        ctx: &mut Context<'a, D, R>,
    ) -> Result<(), IndexError> {
        let kind = node::node_kind(&*root_guard)?;
        let size = node::size(&*root_guard);

        match (kind, size) {
            (NodeKind::Internal, 1) => {
                let only_child =
                    InternalNode::new(&mut *root_guard).remove_and_return_only_child();
                let old_root = root_guard.page_id();
                drop(root_guard);
                self.reparent(only_child, None)?;
                debug_assert!(
                    ctx.root_token.is_some(),
                    "root latch must be held while shrinking the tree"
                );
                self.write_root(Some(only_child))?;
                ctx.deleted.push(old_root);
                debug!(root = only_child.page_num(), "root collapsed into its only child");
            }
            (NodeKind::Leaf, 0) => {
                let old_root = root_guard.page_id();
                drop(root_guard);
                debug_assert!(
                    ctx.root_token.is_some(),
                    "root latch must be held while emptying the tree"
                );
                self.write_root(None)?;
                ctx.deleted.push(old_root);
                debug!("tree is now empty");
            }
            _ => {}
        }

        ctx.release_ancestors();
        Ok(())
    }

    /// Rewrites a child's parent back-reference.
    fn reparent(&self, child: PageId, parent: Option<PageId>) -> Result<(), IndexError> {
        let mut guard = self.pool.fetch_page_basic(child)?;
        node::set_parent(guard.data_mut().as_mut_slice(), parent);
        Ok(())
    }
}

/// A node is safe for `access` iff the operation below it cannot
/// propagate a structural change into it.
fn is_safe<D: DiskManager, R: Replacer>(
    guard: &PageWriteGuard<'_, D, R>,
    access: Access,
) -> bool {
    let data: &[u8] = guard;
    let size = node::size(data);
    let max = node::max_size(data);
    match access {
        Access::Insert => size + 1 < max,
        Access::Delete => {
            if node::is_root(data) {
                size > 2
            } else {
                let Ok(kind) = node::node_kind(data) else {
                    return false;
                };
                size > node::min_size(kind, max)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{ClockReplacer, MemoryDisk};

    type TestTree = BPlusTree<MemoryDisk, ClockReplacer>;

    fn small_tree() -> TestTree {
        tree_with(3, 3, 16)
    }

    fn tree_with(leaf_max: usize, internal_max: usize, pool_size: usize) -> TestTree {
        let pool = Arc::new(BufferPool::new(
            MemoryDisk::new(),
            ClockReplacer::new(pool_size),
            pool_size,
        ));
        BPlusTree::create(
            pool,
            TreeOptions {
                leaf_max_size: leaf_max,
                internal_max_size: internal_max,
            },
        )
        .unwrap()
    }

    fn rid(key: IndexKey) -> RecordId {
        RecordId::new(PageId::new(key as u64), key as u16)
    }

    /// Recursively validates subtree invariants and appends its keys in
    /// order: sorted entries, key-range bounds, parent back-references,
    /// and minimum fill for non-root leaves.
    fn check_subtree(
        tree: &TestTree,
        page_id: PageId,
        parent: Option<PageId>,
        lower: Option<IndexKey>,
        upper: Option<IndexKey>,
        out: &mut Vec<IndexKey>,
    ) {
        let guard = tree.pool.fetch_page_read(page_id).unwrap();
        assert_eq!(node::page_id(&*guard), page_id);
        assert_eq!(node::parent(&*guard), parent);

        match node::node_kind(&*guard).unwrap() {
            NodeKind::Leaf => {
                let leaf = LeafNode::new(&*guard);
                assert!(leaf.size() < leaf.max_size());
                if parent.is_some() {
                    assert!(leaf.size() >= leaf.min_size());
                }
                for i in 0..leaf.size() {
                    let key = leaf.key_at(i);
                    if i > 0 {
                        assert!(key > leaf.key_at(i - 1));
                    }
                    if let Some(lower) = lower {
                        assert!(key >= lower);
                    }
                    if let Some(upper) = upper {
                        assert!(key < upper);
                    }
                    out.push(key);
                }
            }
            NodeKind::Internal => {
                let internal = InternalNode::new(&*guard);
                let size = internal.size();
                assert!(size >= 2, "internal node with fewer than two children");
                assert!(size <= internal.max_size());
                let entries: Vec<(IndexKey, PageId)> = (0..size)
                    .map(|i| (internal.key_at(i), internal.value_at(i)))
                    .collect();
                for i in 2..size {
                    assert!(entries[i].0 > entries[i - 1].0);
                }
                // Release the latch (and pin) before recursing.
                drop(guard);
                for (i, &(key, child)) in entries.iter().enumerate() {
                    let child_lower = if i == 0 { lower } else { Some(key) };
                    let child_upper = if i + 1 < size {
                        Some(entries[i + 1].0)
                    } else {
                        upper
                    };
                    check_subtree(tree, child, Some(page_id), child_lower, child_upper, out);
                }
            }
        }
    }

    /// Full-tree invariant sweep plus equivalence with the expected key
    /// set, the leaf-chain scan, and point lookups.
    fn check_tree(tree: &TestTree, expected: &[IndexKey]) {
        let mut keys = Vec::new();
        if let Some(root) = tree.root_page_id().unwrap() {
            check_subtree(tree, root, None, None, None, &mut keys);
        }
        assert_eq!(keys, expected, "in-order subtree walk mismatch");

        let scanned: Vec<IndexKey> = tree.iter().unwrap().map(|r| r.unwrap().0).collect();
        assert_eq!(scanned, expected, "leaf chain scan mismatch");

        for &key in expected {
            assert_eq!(tree.get(key).unwrap(), Some(rid(key)));
        }
    }

    #[test]
    fn test_empty_tree() {
        let tree = small_tree();
        assert!(tree.is_empty().unwrap());
        assert_eq!(tree.get(1).unwrap(), None);
        assert!(!tree.remove(1).unwrap());
        assert_eq!(tree.iter().unwrap().count(), 0);
    }

    #[test]
    fn test_first_insert_starts_tree() {
        let tree = small_tree();
        assert!(tree.insert(1, rid(1)).unwrap());
        assert!(!tree.is_empty().unwrap());
        check_tree(&tree, &[1]);
    }

    #[test]
    fn test_sequential_inserts_split_leaf() {
        let tree = small_tree();
        for key in 1..=3 {
            assert!(tree.insert(key, rid(key)).unwrap());
        }
        check_tree(&tree, &[1, 2, 3]);

        assert!(tree.insert(4, rid(4)).unwrap());
        check_tree(&tree, &[1, 2, 3, 4]);
        // The root must have split off the leaf level by now.
        let root = tree.root_page_id().unwrap().unwrap();
        let guard = tree.pool.fetch_page_read(root).unwrap();
        assert_eq!(node::node_kind(&*guard).unwrap(), NodeKind::Internal);
    }

    #[test]
    fn test_lookup_hit_and_miss() {
        let tree = small_tree();
        for key in 1..=4 {
            tree.insert(key, rid(key)).unwrap();
        }
        assert_eq!(tree.get(2).unwrap(), Some(rid(2)));
        assert_eq!(tree.get(5).unwrap(), None);
    }

    #[test]
    fn test_duplicate_insert_leaves_tree_unchanged() {
        let tree = small_tree();
        for key in 1..=4 {
            tree.insert(key, rid(key)).unwrap();
        }
        assert!(!tree.insert(2, rid(99)).unwrap());
        check_tree(&tree, &[1, 2, 3, 4]);
        assert_eq!(tree.get(2).unwrap(), Some(rid(2)));
    }

    #[test]
    fn test_remove_triggers_merge_and_root_adjust() {
        let tree = small_tree();
        for key in 1..=4 {
            tree.insert(key, rid(key)).unwrap();
        }
        assert!(tree.remove(3).unwrap());
        assert!(tree.remove(4).unwrap());
        check_tree(&tree, &[1, 2]);
    }

    #[test]
    fn test_remove_absent_key_is_noop() {
        let tree = small_tree();
        for key in [1, 3, 5] {
            tree.insert(key, rid(key)).unwrap();
        }
        assert!(!tree.remove(2).unwrap());
        check_tree(&tree, &[1, 3, 5]);
    }

    #[test]
    fn test_remove_last_key_empties_tree() {
        let tree = small_tree();
        tree.insert(7, rid(7)).unwrap();
        assert!(tree.remove(7).unwrap());
        assert!(tree.is_empty().unwrap());
        assert_eq!(tree.root_page_id().unwrap(), None);

        // The tree keeps working after being emptied.
        tree.insert(8, rid(8)).unwrap();
        check_tree(&tree, &[8]);
    }

    #[test]
    fn test_grow_three_levels_and_shrink_to_empty() {
        let tree = small_tree();
        let keys: Vec<IndexKey> = (1..=40).collect();
        for &key in &keys {
            tree.insert(key, rid(key)).unwrap();
            let done: Vec<IndexKey> = keys.iter().copied().filter(|&k| k <= key).collect();
            check_tree(&tree, &done);
        }
        for &key in &keys {
            assert!(tree.remove(key).unwrap());
            let left: Vec<IndexKey> = keys.iter().copied().filter(|&k| k > key).collect();
            check_tree(&tree, &left);
        }
        assert!(tree.is_empty().unwrap());
    }

    #[test]
    fn test_descending_and_interleaved_inserts() {
        let tree = tree_with(4, 4, 16);
        let mut expected = Vec::new();
        // Descending then odd keys in between.
        for key in (1..=20).rev() {
            tree.insert(key * 10, rid(key * 10)).unwrap();
            expected.push(key * 10);
        }
        for key in 1..=20 {
            tree.insert(key * 10 + 5, rid(key * 10 + 5)).unwrap();
            expected.push(key * 10 + 5);
        }
        expected.sort_unstable();
        check_tree(&tree, &expected);
    }

    #[test]
    fn test_left_edge_removals_rebalance() {
        let tree = tree_with(5, 4, 16);
        for key in 1..=25 {
            tree.insert(key, rid(key)).unwrap();
        }
        let mut expected: Vec<IndexKey> = (1..=25).collect();
        // Deleting from the left edge underflows the left-most leaves,
        // which then merge with or borrow from their right siblings.
        for key in 1..=20 {
            assert!(tree.remove(key).unwrap());
            expected.retain(|&k| k != key);
            check_tree(&tree, &expected);
        }
    }

    #[test]
    fn test_redistribute_borrows_from_full_sibling() {
        let tree = tree_with(4, 4, 16);
        // Two leaves under one root: [1, 2] and [3, 4, 5].
        for key in 1..=5 {
            tree.insert(key, rid(key)).unwrap();
        }
        check_tree(&tree, &[1, 2, 3, 4, 5]);

        // Underflow the left leaf; its right sibling holds 3 entries, so
        // the pair cannot merge and must redistribute.
        assert!(tree.remove(1).unwrap());
        assert!(tree.remove(2).unwrap());
        check_tree(&tree, &[3, 4, 5]);
    }

    #[test]
    fn test_iter_from() {
        let tree = small_tree();
        for key in [10, 20, 30, 40, 50] {
            tree.insert(key, rid(key)).unwrap();
        }

        let from_25: Vec<IndexKey> = tree.iter_from(25).unwrap().map(|r| r.unwrap().0).collect();
        assert_eq!(from_25, vec![30, 40, 50]);

        let from_30: Vec<IndexKey> = tree.iter_from(30).unwrap().map(|r| r.unwrap().0).collect();
        assert_eq!(from_30, vec![30, 40, 50]);

        let past_end: Vec<IndexKey> = tree.iter_from(99).unwrap().map(|r| r.unwrap().0).collect();
        assert!(past_end.is_empty());
    }

    #[test]
    fn test_iterator_yields_rids() {
        let tree = small_tree();
        for key in 1..=6 {
            tree.insert(key, rid(key)).unwrap();
        }
        for (i, item) in tree.iter().unwrap().enumerate() {
            let (key, value) = item.unwrap();
            assert_eq!(key, (i + 1) as IndexKey);
            assert_eq!(value, rid(key));
        }
    }

    #[test]
    fn test_reopen_same_pool_keeps_contents() {
        let pool = Arc::new(BufferPool::new(
            MemoryDisk::new(),
            ClockReplacer::new(16),
            16,
        ));
        let options = TreeOptions {
            leaf_max_size: 3,
            internal_max_size: 3,
        };
        let header_page_id = {
            let tree = BPlusTree::create(Arc::clone(&pool), options).unwrap();
            for key in 1..=10 {
                tree.insert(key, rid(key)).unwrap();
            }
            tree.header_page_id()
        };

        let tree = BPlusTree::open(pool, header_page_id, options).unwrap();
        check_tree(&tree, &(1..=10).collect::<Vec<_>>());
    }

    #[test]
    fn test_open_rejects_non_header_page() {
        let tree = small_tree();
        tree.insert(1, rid(1)).unwrap();
        let root = tree.root_page_id().unwrap().unwrap();
        let result = BPlusTree::open(Arc::clone(&tree.pool), root, TreeOptions::default());
        assert!(matches!(result, Err(IndexError::Corrupted(_))));
    }

    #[test]
    fn test_negative_and_boundary_keys() {
        let tree = small_tree();
        let keys = [IndexKey::MIN, -5, 0, 5, IndexKey::MAX];
        for &key in &keys {
            tree.insert(key, rid(key)).unwrap();
        }
        let mut expected = keys.to_vec();
        expected.sort_unstable();
        check_tree(&tree, &expected);
    }
}

//! Frame management for the buffer pool.
//!
//! A frame is a slot in the buffer pool that can hold one 8KB page at a
//! time. The frame owns the page's reader/writer latch; bookkeeping about
//! the loaded page (`FrameMeta`) lives under the pool's state mutex.

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::storage::{PageData, PageId};

/// Identifier for a frame in the buffer pool.
///
/// `FrameId` is distinct from `PageId`: `PageId` identifies a logical page
/// on disk, while `FrameId` identifies a physical memory slot in the
/// buffer pool. FrameIds range from 0 to pool_size-1 and are valid only
/// within a single `BufferPool` instance.
pub type FrameId = usize;

/// A frame in the buffer pool.
///
/// The frame's page buffer is protected by a reader/writer latch. The
/// latch is acquired by page guards (and briefly by the pool for
/// write-back during eviction), never by index code directly.
pub(crate) struct Frame {
    latch: RwLock<PageData>,
}

impl Frame {
    pub(crate) fn new() -> Self {
        Self {
            latch: RwLock::new(PageData::new()),
        }
    }

    /// Acquires the frame's shared latch.
    pub(crate) fn read(&self) -> RwLockReadGuard<'_, PageData> {
        self.latch.read()
    }

    /// Acquires the frame's exclusive latch.
    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, PageData> {
        self.latch.write()
    }
}

/// Bookkeeping for one frame, guarded by the pool's state mutex.
///
/// # Lifecycle
///
/// 1. **Empty**: `page_id = None`, frame is in the free list
/// 2. **Loaded**: page read from disk, `page_id = Some(...)`, pinned
/// 3. **Pinned**: `pin_count > 0`, page cannot be evicted
/// 4. **Unpinned**: `pin_count = 0`, frame is an eviction candidate
/// 5. **Evicted**: written back if dirty, then reset for the next page
#[derive(Debug)]
pub(crate) struct FrameMeta {
    /// The `PageId` currently loaded in this frame, if any.
    pub(crate) page_id: Option<PageId>,

    /// Number of operations currently using this frame.
    ///
    /// A frame cannot be evicted while `pin_count > 0`. Each fetch
    /// increments this counter; each unpin (usually a guard drop)
    /// decrements it.
    pub(crate) pin_count: u32,

    /// Whether the page has been modified since loading from disk.
    ///
    /// Dirty pages must be written back before eviction.
    pub(crate) is_dirty: bool,
}

impl FrameMeta {
    pub(crate) fn new() -> Self {
        Self {
            page_id: None,
            pin_count: 0,
            is_dirty: false,
        }
    }

    /// True iff the frame holds a page.
    pub(crate) fn is_resident(&self) -> bool {
        self.page_id.is_some()
    }

    /// Clears the bookkeeping, returning the frame to the empty state.
    pub(crate) fn reset(&mut self) {
        self.page_id = None;
        self.pin_count = 0;
        self.is_dirty = false;
    }
}

//! RAII guards for buffer pool page access.
//!
//! Guards own a pin on a frame and release it on every exit path,
//! including unwind. The latched variants additionally hold the frame's
//! reader/writer latch; on drop the latch is released before the pin.

use std::ops::{Deref, DerefMut};

use parking_lot::{RwLockReadGuard, RwLockWriteGuard};

use super::frame::{Frame, FrameId};
use super::pool::BufferPool;
use super::replacer::Replacer;
use crate::storage::disk::DiskManager;
use crate::storage::page::{PageData, PageId};

/// RAII guard for pinned page access without a held latch.
///
/// The guard keeps the page pinned; byte access goes through short-lived
/// latch acquisitions (`data` / `data_mut`). Use [`PageGuard::into_read`]
/// or [`PageGuard::into_write`] to hold the latch for a longer scope.
///
/// When dropped, unpins the page with the accumulated dirty flag.
pub struct PageGuard<'a, D: DiskManager, R: Replacer> {
    pub(super) pool: &'a BufferPool<D, R>,
    pub(super) frame: &'a Frame,
    pub(super) frame_id: FrameId,
    pub(super) page_id: PageId,
    pub(super) is_dirty: bool,
}

impl<'a, D: DiskManager, R: Replacer> PageGuard<'a, D, R> {
    /// Returns the PageId of this page.
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Briefly latches the frame shared and returns the page bytes.
    pub fn data(&self) -> RwLockReadGuard<'_, PageData> {
        self.frame.read()
    }

    /// Briefly latches the frame exclusive and returns the page bytes,
    /// marking the page dirty.
    pub fn data_mut(&mut self) -> RwLockWriteGuard<'_, PageData> {
        self.is_dirty = true;
        self.frame.write()
    }

    /// Records that the page content has been modified.
    pub fn mark_dirty(&mut self) {
        self.is_dirty = true;
    }

    /// Upgrades into a guard holding the shared latch.
    pub fn into_read(self) -> PageReadGuard<'a, D, R> {
        let frame = self.frame;
        PageReadGuard {
            lock: frame.read(),
            base: self,
        }
    }

    /// Upgrades into a guard holding the exclusive latch.
    pub fn into_write(self) -> PageWriteGuard<'a, D, R> {
        let frame = self.frame;
        PageWriteGuard {
            lock: frame.write(),
            base: self,
        }
    }
}

impl<D: DiskManager, R: Replacer> Drop for PageGuard<'_, D, R> {
    fn drop(&mut self) {
        self.pool.unpin_internal(self.frame_id, self.is_dirty);
    }
}

/// RAII guard for read-only page access.
///
/// Holds the frame's shared latch and a pin; dereferences to the page
/// bytes. On drop, the latch is released first, then the pin.
pub struct PageReadGuard<'a, D: DiskManager, R: Replacer> {
    // Field order matters: the latch must be released before the pin.
    lock: RwLockReadGuard<'a, PageData>,
    base: PageGuard<'a, D, R>,
}

impl<D: DiskManager, R: Replacer> PageReadGuard<'_, D, R> {
    /// Returns the PageId of this page.
    pub fn page_id(&self) -> PageId {
        self.base.page_id
    }
}

impl<D: DiskManager, R: Replacer> Deref for PageReadGuard<'_, D, R> {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.lock.as_slice()
    }
}

/// RAII guard for mutable page access.
///
/// Holds the frame's exclusive latch and a pin; dereferences to the page
/// bytes. Mutable access marks the page dirty. On drop, the latch is
/// released first, then the pin.
pub struct PageWriteGuard<'a, D: DiskManager, R: Replacer> {
    // Field order matters: the latch must be released before the pin.
    lock: RwLockWriteGuard<'a, PageData>,
    base: PageGuard<'a, D, R>,
}

impl<D: DiskManager, R: Replacer> PageWriteGuard<'_, D, R> {
    /// Returns the PageId of this page.
    pub fn page_id(&self) -> PageId {
        self.base.page_id
    }

    /// Records that the page content has been modified.
    pub fn mark_dirty(&mut self) {
        self.base.is_dirty = true;
    }
}

impl<D: DiskManager, R: Replacer> Deref for PageWriteGuard<'_, D, R> {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.lock.as_slice()
    }
}

impl<D: DiskManager, R: Replacer> DerefMut for PageWriteGuard<'_, D, R> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.base.is_dirty = true;
        self.lock.as_mut_slice()
    }
}

pub(super) fn make_guard<'a, D: DiskManager, R: Replacer>(
    pool: &'a BufferPool<D, R>,
    frame: &'a Frame,
    frame_id: FrameId,
    page_id: PageId,
) -> PageGuard<'a, D, R> {
    PageGuard {
        pool,
        frame,
        frame_id,
        page_id,
        is_dirty: false,
    }
}

//! Buffer pool manager for caching pages in memory.
//!
//! The buffer pool sits between the disk manager and the index layer,
//! caching frequently accessed pages in a fixed set of frames.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use super::error::BufferError;
use super::frame::{Frame, FrameId, FrameMeta};
use super::guard::{make_guard, PageGuard, PageReadGuard, PageWriteGuard};
use super::replacer::Replacer;
use crate::storage::disk::DiskManager;
use crate::storage::page::PageId;

/// Buffer pool manager.
///
/// The pool maintains a fixed number of frames (in-memory page slots)
/// and maps pages from the disk manager into frames on demand. When all
/// frames are occupied, the replacement policy selects an unpinned
/// victim for eviction; dirty victims are written back first.
///
/// # Thread Safety
///
/// All operations take `&self` and are safe to call from multiple
/// threads:
/// - multiple readers may latch the same page concurrently,
/// - a writer holds the page's latch exclusively,
/// - the structural state (page table, frame bookkeeping, free list,
///   replacer) is protected by one mutex.
///
/// # Latch ordering
///
/// The state mutex is only ever held for short critical sections and is
/// never held while blocking on a frame latch. Frame latches may be held
/// while briefly taking the state mutex (unpin, dirty-flag updates).
pub struct BufferPool<D: DiskManager, R: Replacer> {
    disk: D,

    /// Frame array; each frame carries its own page latch.
    frames: Vec<Frame>,

    /// Structural state: page table, per-frame bookkeeping, free list,
    /// and the replacement policy.
    state: Mutex<PoolState<R>>,

    /// Monotonic page-id allocator, seeded from the disk's high-water
    /// mark so that reopening a page file continues where it left off.
    next_page_id: AtomicU64,

    pool_size: usize,
}

struct PoolState<R: Replacer> {
    /// Maps PageId -> FrameId for resident pages.
    page_table: HashMap<PageId, FrameId>,

    /// Bookkeeping for each frame (indexed by FrameId).
    meta: Vec<FrameMeta>,

    /// Frames not currently holding any page.
    free_list: Vec<FrameId>,

    /// Replacement policy over unpinned resident frames.
    replacer: R,
}

impl<D: DiskManager, R: Replacer> BufferPool<D, R> {
    /// Creates a new buffer pool over the given disk manager.
    ///
    /// # Panics
    ///
    /// Panics if `pool_size` is 0.
    pub fn new(disk: D, replacer: R, pool_size: usize) -> Self {
        assert!(pool_size > 0, "pool_size must be > 0");

        let frames: Vec<_> = (0..pool_size).map(|_| Frame::new()).collect();
        let meta: Vec<_> = (0..pool_size).map(|_| FrameMeta::new()).collect();
        let free_list: Vec<_> = (0..pool_size).collect();
        let next_page_id = disk.page_count();

        Self {
            disk,
            frames,
            state: Mutex::new(PoolState {
                page_table: HashMap::with_capacity(pool_size),
                meta,
                free_list,
                replacer,
            }),
            next_page_id: AtomicU64::new(next_page_id),
            pool_size,
        }
    }

    /// Returns the number of frames in the buffer pool.
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Returns the number of pages currently resident in the pool.
    pub fn resident_count(&self) -> usize {
        self.state.lock().page_table.len()
    }

    /// Allocates a fresh page and returns it pinned and write-latched.
    ///
    /// The page id comes from the monotonic allocator; the frame comes
    /// from the free list, or from evicting an unpinned victim. The page
    /// memory is zeroed and the page is created dirty so that it reaches
    /// disk even if it is evicted before its first flush.
    ///
    /// # Errors
    ///
    /// - `BufferError::NoFreeFrames` if every frame is pinned
    /// - `BufferError::Storage` if a dirty victim's write-back fails
    pub fn new_page(&self) -> Result<PageWriteGuard<'_, D, R>, BufferError> {
        let frame_id = self.reserve_frame()?;
        let page_id = PageId::new(self.next_page_id.fetch_add(1, Ordering::Relaxed));

        // Latch before publishing the mapping so the caller observes the
        // zeroed page.
        let mut lock = self.frames[frame_id].write();
        lock.as_mut_slice().fill(0);
        drop(lock);

        {
            let mut state = self.state.lock();
            debug_assert!(!state.page_table.contains_key(&page_id));
            state.page_table.insert(page_id, frame_id);
            let meta = &mut state.meta[frame_id];
            meta.page_id = Some(page_id);
            meta.pin_count = 1;
            meta.is_dirty = true;
        }

        trace!(page_id = page_id.page_num(), frame_id, "allocated new page");
        let mut guard = make_guard(self, &self.frames[frame_id], frame_id, page_id).into_write();
        guard.mark_dirty();
        Ok(guard)
    }

    /// Fetches a page and returns it pinned, without holding its latch.
    ///
    /// Useful for brief metadata updates where the caller manages latch
    /// scope itself via [`PageGuard::data`] / [`PageGuard::data_mut`].
    pub fn fetch_page_basic(&self, page_id: PageId) -> Result<PageGuard<'_, D, R>, BufferError> {
        let frame_id = self.get_or_load(page_id)?;
        Ok(make_guard(self, &self.frames[frame_id], frame_id, page_id))
    }

    /// Fetches a page for reading (pinned, shared latch held).
    ///
    /// # Errors
    ///
    /// - `BufferError::NoFreeFrames` if the pool is full of pinned pages
    /// - `BufferError::PageNotFound` if the page does not exist on disk
    /// - `BufferError::Storage` if I/O fails
    pub fn fetch_page_read(&self, page_id: PageId) -> Result<PageReadGuard<'_, D, R>, BufferError> {
        Ok(self.fetch_page_basic(page_id)?.into_read())
    }

    /// Fetches a page for writing (pinned, exclusive latch held).
    ///
    /// # Errors
    ///
    /// Same as [`BufferPool::fetch_page_read`].
    pub fn fetch_page_write(
        &self,
        page_id: PageId,
    ) -> Result<PageWriteGuard<'_, D, R>, BufferError> {
        Ok(self.fetch_page_basic(page_id)?.into_write())
    }

    /// Unpins a page, OR-ing `is_dirty` into the frame's dirty flag.
    ///
    /// Returns `false` if the page is not resident or its pin count is
    /// already zero; both indicate a caller bookkeeping bug.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let mut state = self.state.lock();
        let Some(&frame_id) = state.page_table.get(&page_id) else {
            return false;
        };
        let meta = &mut state.meta[frame_id];
        if meta.pin_count == 0 {
            return false;
        }
        meta.pin_count -= 1;
        if is_dirty {
            meta.is_dirty = true;
        }
        if meta.pin_count == 0 {
            state.replacer.unpin(frame_id);
        }
        true
    }

    /// Writes a resident page back to disk and clears its dirty flag.
    ///
    /// Returns `Ok(false)` if the page is not resident.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool, BufferError> {
        let frame_id = {
            let state = self.state.lock();
            match state.page_table.get(&page_id) {
                Some(&frame_id) => frame_id,
                None => return Ok(false),
            }
        };

        let lock = self.frames[frame_id].read();
        // Re-check under the frame latch: the frame may have been evicted
        // and reused while we were waiting for it.
        {
            let state = self.state.lock();
            if state.meta[frame_id].page_id != Some(page_id) {
                return Ok(false);
            }
        }
        self.disk.write_page(page_id, lock.as_slice())?;
        let mut state = self.state.lock();
        if state.meta[frame_id].page_id == Some(page_id) {
            state.meta[frame_id].is_dirty = false;
        }
        Ok(true)
    }

    /// Writes every resident dirty page back to disk, then syncs.
    pub fn flush_all(&self) -> Result<(), BufferError> {
        let dirty: Vec<(FrameId, PageId)> = {
            let state = self.state.lock();
            state
                .meta
                .iter()
                .enumerate()
                .filter_map(|(frame_id, meta)| {
                    if meta.is_dirty {
                        meta.page_id.map(|page_id| (frame_id, page_id))
                    } else {
                        None
                    }
                })
                .collect()
        };

        for (frame_id, page_id) in dirty {
            let lock = self.frames[frame_id].read();
            {
                let state = self.state.lock();
                if state.meta[frame_id].page_id != Some(page_id) {
                    // Evicted (and thus already written back) meanwhile.
                    continue;
                }
            }
            self.disk.write_page(page_id, lock.as_slice())?;
            let mut state = self.state.lock();
            if state.meta[frame_id].page_id == Some(page_id) {
                state.meta[frame_id].is_dirty = false;
            }
        }

        self.disk.sync_all()?;
        Ok(())
    }

    /// Drops a page from the pool and returns its frame to the free list.
    ///
    /// Returns `Ok(true)` if the page was not resident to begin with, or
    /// was successfully removed. Returns `Ok(false)` if the page is
    /// pinned. Dirty pages are written back before removal.
    pub fn delete_page(&self, page_id: PageId) -> Result<bool, BufferError> {
        let (frame_id, is_dirty) = {
            let state = self.state.lock();
            match state.page_table.get(&page_id) {
                None => return Ok(true),
                Some(&frame_id) => {
                    if state.meta[frame_id].pin_count > 0 {
                        return Ok(false);
                    }
                    (frame_id, state.meta[frame_id].is_dirty)
                }
            }
        };

        if is_dirty {
            let lock = self.frames[frame_id].read();
            self.disk.write_page(page_id, lock.as_slice())?;
        }

        let mut state = self.state.lock();
        match state.page_table.get(&page_id) {
            Some(&f) if f == frame_id => {
                if state.meta[frame_id].pin_count > 0 {
                    return Ok(false);
                }
                state.page_table.remove(&page_id);
                state.replacer.pin(frame_id);
                state.meta[frame_id].reset();
                state.free_list.push(frame_id);
                trace!(page_id = page_id.page_num(), frame_id, "deleted page");
                Ok(true)
            }
            // Evicted by another thread while we were writing back.
            _ => Ok(true),
        }
    }

    /// Unpins a frame (called from guard drops).
    pub(super) fn unpin_internal(&self, frame_id: FrameId, is_dirty: bool) {
        let mut state = self.state.lock();
        let meta = &mut state.meta[frame_id];
        debug_assert!(meta.is_resident(), "unpin of a non-resident frame");
        debug_assert!(meta.pin_count > 0, "unpin with pin_count == 0");
        if meta.pin_count == 0 {
            return;
        }
        meta.pin_count -= 1;
        if is_dirty {
            meta.is_dirty = true;
        }
        if meta.pin_count == 0 {
            state.replacer.unpin(frame_id);
        }
    }

    /// Returns the frame holding `page_id`, loading it from disk if
    /// necessary. The frame is pinned on return.
    fn get_or_load(&self, page_id: PageId) -> Result<FrameId, BufferError> {
        // Fast path: page hit.
        {
            let mut state = self.state.lock();
            if let Some(&frame_id) = state.page_table.get(&page_id) {
                state.meta[frame_id].pin_count += 1;
                state.replacer.pin(frame_id);
                return Ok(frame_id);
            }
        }

        // Page miss: claim a frame and read from disk.
        let frame_id = self.reserve_frame()?;

        let read_result = {
            let mut lock = self.frames[frame_id].write();
            self.disk.read_page(page_id, lock.as_mut_slice())
        };
        if let Err(e) = read_result {
            let mut state = self.state.lock();
            state.free_list.push(frame_id);
            return Err(e.into());
        }

        let mut state = self.state.lock();

        // Another thread may have loaded this page while we were doing
        // I/O; if so, discard our frame and share theirs.
        if let Some(&existing) = state.page_table.get(&page_id) {
            state.free_list.push(frame_id);
            state.meta[existing].pin_count += 1;
            state.replacer.pin(existing);
            return Ok(existing);
        }

        state.page_table.insert(page_id, frame_id);
        let meta = &mut state.meta[frame_id];
        meta.page_id = Some(page_id);
        meta.pin_count = 1;
        meta.is_dirty = false;
        Ok(frame_id)
    }

    /// Claims a frame from the free list, evicting a victim if needed.
    ///
    /// The returned frame is non-resident and unpinned; it belongs to the
    /// caller until it is published in the page table or returned to the
    /// free list.
    fn reserve_frame(&self) -> Result<FrameId, BufferError> {
        {
            let mut state = self.state.lock();
            if let Some(frame_id) = state.free_list.pop() {
                return Ok(frame_id);
            }
        }

        loop {
            let victim = {
                let mut state = self.state.lock();
                state.replacer.victim()
            };
            let Some(frame_id) = victim else {
                return Err(BufferError::NoFreeFrames);
            };

            let (old_page, was_dirty) = {
                let state = self.state.lock();
                (state.meta[frame_id].page_id, state.meta[frame_id].is_dirty)
            };

            if let Some(old_page) = old_page {
                if was_dirty {
                    let lock = self.frames[frame_id].read();
                    self.disk.write_page(old_page, lock.as_slice())?;
                    debug!(
                        page_id = old_page.page_num(),
                        frame_id, "evicted dirty page written back"
                    );
                }
            }

            {
                let mut state = self.state.lock();
                let meta = &state.meta[frame_id];
                // The frame may have been re-pinned (or re-dirtied after
                // our write-back) while we were doing I/O; if so, give it
                // up and pick another victim.
                if meta.pin_count > 0 || (meta.is_dirty && !was_dirty) {
                    continue;
                }
                if let Some(old_page) = old_page {
                    state.page_table.remove(&old_page);
                }
                state.meta[frame_id].reset();
                return Ok(frame_id);
            }
        }
    }
}

impl<D: DiskManager, R: Replacer> Drop for BufferPool<D, R> {
    fn drop(&mut self) {
        if let Err(e) = self.flush_all() {
            warn!(error = %e, "failed to flush buffer pool on drop");
        }
    }
}

//! Disk manager: page I/O backend implementations.
//!
//! This module provides the `DiskManager` trait for whole-page I/O,
//! along with in-memory and file-backed implementations.

mod file;
mod memory;

pub use file::FileDisk;
pub use memory::MemoryDisk;

use super::error::StorageError;
use super::page::PageId;

/// Page I/O backend trait.
///
/// This trait defines the interface for reading and writing 8KB pages
/// using caller-owned buffers. Implementations include:
/// - `MemoryDisk`: in-memory backend for testing
/// - `FileDisk`: a single flat page file on disk
///
/// # Design Decisions
///
/// 1. **Blocking I/O**: all calls run to completion on the calling OS
///    thread. The buffer pool holds latches across these calls, so the
///    interface is deliberately synchronous.
///
/// 2. **Caller-owned buffers**: the disk manager reads and writes raw
///    bytes only. Memory management is the responsibility of the caller
///    (the buffer pool).
///
/// 3. **Page-id allocation lives above**: the buffer pool owns a
///    monotonic page-id counter; `write_page` past the current end of
///    the backing store extends it. `page_count` reports the high-water
///    mark so the counter can be re-seeded when a store is reopened.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`. The buffer pool handles
/// page-level locking; this trait handles only raw I/O.
pub trait DiskManager: Send + Sync {
    /// Reads a page into a caller-provided buffer.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::PageNotFound` if the page lies past the
    /// high-water mark. Returns `StorageError::InvalidBufferSize` if
    /// `buf.len() != PAGE_SIZE`.
    fn read_page(&self, page_id: PageId, buf: &mut [u8]) -> Result<(), StorageError>;

    /// Writes a page from a caller-provided buffer, extending the
    /// backing store if the page lies past the current end.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::InvalidBufferSize` if `buf.len() != PAGE_SIZE`.
    fn write_page(&self, page_id: PageId, buf: &[u8]) -> Result<(), StorageError>;

    /// Returns the number of pages in the backing store (high-water mark).
    fn page_count(&self) -> u64;

    /// Syncs all pending writes to physical disk (fsync).
    ///
    /// For `MemoryDisk`, this is a no-op.
    /// For `FileDisk`, this calls `sync_all()` to ensure durability.
    fn sync_all(&self) -> Result<(), StorageError>;
}

#[cfg(test)]
pub(crate) mod tests {
    //! Generic conformance tests shared by every `DiskManager` backend.

    use super::*;
    use crate::storage::page::PAGE_SIZE;

    /// Writes a page filled with `fill` and returns its id.
    pub(crate) fn write_filled(disk: &impl DiskManager, page_num: u64, fill: u8) -> PageId {
        let page_id = PageId::new(page_num);
        let buf = vec![fill; PAGE_SIZE];
        disk.write_page(page_id, &buf).unwrap();
        page_id
    }

    /// Asserts that the page contains only `fill` bytes.
    pub(crate) fn verify_filled(disk: &impl DiskManager, page_id: PageId, fill: u8) {
        let mut buf = vec![0u8; PAGE_SIZE];
        disk.read_page(page_id, &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == fill));
    }

    pub(crate) fn test_basic_operations(disk: impl DiskManager) {
        assert_eq!(disk.page_count(), 0);

        let p0 = write_filled(&disk, 0, 0xAA);
        let p1 = write_filled(&disk, 1, 0xBB);
        assert_eq!(disk.page_count(), 2);

        verify_filled(&disk, p0, 0xAA);
        verify_filled(&disk, p1, 0xBB);

        // Overwrite in place
        write_filled(&disk, 0, 0xCC);
        verify_filled(&disk, p0, 0xCC);
        assert_eq!(disk.page_count(), 2);
    }

    pub(crate) fn test_write_extends(disk: impl DiskManager) {
        // Writing past the current end grows the store
        write_filled(&disk, 4, 0x11);
        assert_eq!(disk.page_count(), 5);
        verify_filled(&disk, PageId::new(4), 0x11);
    }

    pub(crate) fn test_page_not_found(disk: impl DiskManager) {
        let mut buf = vec![0u8; PAGE_SIZE];
        let result = disk.read_page(PageId::new(999), &mut buf);
        assert!(matches!(result, Err(StorageError::PageNotFound(_))));
    }

    pub(crate) fn test_buffer_size_validation(disk: impl DiskManager) {
        write_filled(&disk, 0, 0);

        let mut small = vec![0u8; 100];
        assert!(matches!(
            disk.read_page(PageId::new(0), &mut small),
            Err(StorageError::InvalidBufferSize { .. })
        ));
        assert!(matches!(
            disk.write_page(PageId::new(0), &small),
            Err(StorageError::InvalidBufferSize { .. })
        ));
    }
}

//! In-memory disk manager.

use parking_lot::Mutex;

use super::DiskManager;
use crate::storage::error::StorageError;
use crate::storage::page::{PageData, PageId, PAGE_SIZE};

/// In-memory page store for testing and development.
///
/// Stores pages in a Vec backed by aligned allocations. Writes past the
/// current end extend the store with zeroed pages, mirroring the way a
/// page file grows on disk.
pub struct MemoryDisk {
    pages: Mutex<Vec<PageData>>,
}

impl MemoryDisk {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            pages: Mutex::new(Vec::new()),
        }
    }
}

impl Default for MemoryDisk {
    fn default() -> Self {
        Self::new()
    }
}

impl DiskManager for MemoryDisk {
    fn read_page(&self, page_id: PageId, buf: &mut [u8]) -> Result<(), StorageError> {
        if buf.len() != PAGE_SIZE {
            return Err(StorageError::InvalidBufferSize {
                expected: PAGE_SIZE,
                actual: buf.len(),
            });
        }

        let pages = self.pages.lock();
        let page = pages
            .get(page_id.page_num() as usize)
            .ok_or(StorageError::PageNotFound(page_id))?;

        buf.copy_from_slice(page.as_slice());
        Ok(())
    }

    fn write_page(&self, page_id: PageId, buf: &[u8]) -> Result<(), StorageError> {
        if buf.len() != PAGE_SIZE {
            return Err(StorageError::InvalidBufferSize {
                expected: PAGE_SIZE,
                actual: buf.len(),
            });
        }

        let mut pages = self.pages.lock();
        let index = page_id.page_num() as usize;
        while pages.len() <= index {
            pages.push(PageData::new());
        }
        pages[index].as_mut_slice().copy_from_slice(buf);
        Ok(())
    }

    fn page_count(&self) -> u64 {
        self.pages.lock().len() as u64
    }

    fn sync_all(&self) -> Result<(), StorageError> {
        // No-op for in-memory storage
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests as generic;
    use super::*;

    #[test]
    fn test_basic_operations() {
        generic::test_basic_operations(MemoryDisk::new());
    }

    #[test]
    fn test_write_extends() {
        generic::test_write_extends(MemoryDisk::new());
    }

    #[test]
    fn test_page_not_found() {
        generic::test_page_not_found(MemoryDisk::new());
    }

    #[test]
    fn test_buffer_size_validation() {
        generic::test_buffer_size_validation(MemoryDisk::new());
    }

    #[test]
    fn test_sparse_write_zero_fills_gap() {
        let disk = MemoryDisk::new();
        generic::write_filled(&disk, 3, 0x7F);
        assert_eq!(disk.page_count(), 4);
        // Pages 0..3 exist and are zeroed
        generic::verify_filled(&disk, PageId::new(1), 0);
    }

    #[test]
    fn test_sync_all() {
        let disk = MemoryDisk::new();
        disk.sync_all().unwrap();
    }
}

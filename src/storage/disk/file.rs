//! File-backed disk manager.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use super::DiskManager;
use crate::storage::error::StorageError;
use crate::storage::page::{PageId, PAGE_SIZE};

/// File-backed disk manager.
///
/// Stores pages as contiguous 8KB blocks in a single flat file.
///
/// # File Layout
///
/// ```text
/// +------------------+------------------+------------------+
/// | Page 0 (8KB)     | Page 1 (8KB)     | Page 2 (8KB)     | ...
/// +------------------+------------------+------------------+
/// ^ offset 0         ^ offset 8192      ^ offset 16384
/// ```
///
/// # Concurrency
///
/// Uses a mutex around the file handle to serialize I/O operations.
/// Concurrency across different pages comes from the buffer pool above,
/// not from this layer.
///
/// # Durability
///
/// `sync_all()` calls `File::sync_all()` to ensure data reaches disk.
/// Without it, data may be lost on crash.
pub struct FileDisk {
    /// Path to the page file
    path: PathBuf,
    /// File handle wrapped in a mutex for serialized access
    file: Mutex<File>,
    /// Number of pages currently in the file (high-water mark)
    page_count: AtomicU64,
}

impl FileDisk {
    /// Opens or creates a page file at the given path.
    ///
    /// If the file exists, its page count is calculated from file size.
    /// If the file doesn't exist, it is created empty.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Corrupted` if the file size is not a multiple
    /// of PAGE_SIZE.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        let file_size = file.metadata()?.len();
        if file_size % PAGE_SIZE as u64 != 0 {
            return Err(StorageError::Corrupted(format!(
                "file size {} is not a multiple of page size {}",
                file_size, PAGE_SIZE
            )));
        }

        Ok(Self {
            path,
            file: Mutex::new(file),
            page_count: AtomicU64::new(file_size / PAGE_SIZE as u64),
        })
    }

    /// Returns the path to the page file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DiskManager for FileDisk {
    fn read_page(&self, page_id: PageId, buf: &mut [u8]) -> Result<(), StorageError> {
        if buf.len() != PAGE_SIZE {
            return Err(StorageError::InvalidBufferSize {
                expected: PAGE_SIZE,
                actual: buf.len(),
            });
        }

        if page_id.page_num() >= self.page_count.load(Ordering::Acquire) {
            return Err(StorageError::PageNotFound(page_id));
        }

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(page_id.byte_offset()))?;
        file.read_exact(buf)?;

        Ok(())
    }

    fn write_page(&self, page_id: PageId, buf: &[u8]) -> Result<(), StorageError> {
        if buf.len() != PAGE_SIZE {
            return Err(StorageError::InvalidBufferSize {
                expected: PAGE_SIZE,
                actual: buf.len(),
            });
        }

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(page_id.byte_offset()))?;
        file.write_all(buf)?;

        // Keep the high-water mark current while the file lock is held.
        let written = page_id.page_num() + 1;
        self.page_count.fetch_max(written, Ordering::AcqRel);

        Ok(())
    }

    fn page_count(&self) -> u64 {
        self.page_count.load(Ordering::Acquire)
    }

    fn sync_all(&self) -> Result<(), StorageError> {
        let file = self.file.lock();
        file.sync_all()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests as generic;
    use super::*;
    use tempfile::{tempdir, TempDir};

    /// Helper for creating temporary FileDisk instances for testing.
    struct TempFileDisk {
        dir: TempDir,
    }

    impl TempFileDisk {
        fn new() -> Self {
            Self {
                dir: tempdir().unwrap(),
            }
        }

        fn disk(&self) -> FileDisk {
            FileDisk::open(self.dir.path().join("test.db")).unwrap()
        }
    }

    // === Generic tests ===

    #[test]
    fn test_basic_operations() {
        generic::test_basic_operations(TempFileDisk::new().disk());
    }

    #[test]
    fn test_write_extends() {
        generic::test_write_extends(TempFileDisk::new().disk());
    }

    #[test]
    fn test_page_not_found() {
        generic::test_page_not_found(TempFileDisk::new().disk());
    }

    #[test]
    fn test_buffer_size_validation() {
        generic::test_buffer_size_validation(TempFileDisk::new().disk());
    }

    // === FileDisk-specific tests ===

    #[test]
    fn test_create_new_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");
        let disk = FileDisk::open(&path).unwrap();
        assert_eq!(disk.page_count(), 0);
        assert!(path.exists());
    }

    #[test]
    fn test_corrupted_file_size() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");
        std::fs::write(&path, vec![0u8; 100]).unwrap();
        let result = FileDisk::open(&path);
        assert!(matches!(result, Err(StorageError::Corrupted(_))));
    }

    #[test]
    fn test_persistence_across_instances() {
        let temp = TempFileDisk::new();
        let mut page_ids = Vec::new();

        {
            let disk = temp.disk();
            for i in 0..5u64 {
                page_ids.push(generic::write_filled(&disk, i, (i * 10) as u8));
            }
            disk.sync_all().unwrap();
        }

        {
            let disk = temp.disk();
            assert_eq!(disk.page_count(), 5);
            for (i, &page_id) in page_ids.iter().enumerate() {
                generic::verify_filled(&disk, page_id, (i * 10) as u8);
            }
        }
    }
}

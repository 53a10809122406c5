//! Tree header page.
//!
//! A single persistent page records where the root currently lives, so
//! the tree survives reopening the page file. Layout:
//!
//! ```text
//! offset 0: magic    u32  ("ARBR")
//! offset 4: version  u32
//! offset 8: root     u64  (u64::MAX = empty tree)
//! ```

use super::node::{decode_page_ref, encode_page_ref, read_u64, write_u64};
use crate::index::error::IndexError;
use crate::storage::PageId;

/// Magic number for the tree header page ("ARBR" in hex).
const MAGIC: u32 = 0x4152_4252;

/// Current header format version.
const VERSION: u32 = 1;

const OFF_MAGIC: usize = 0;
const OFF_VERSION: usize = 4;
const OFF_ROOT: usize = 8;

/// Typed view of the header page over any byte buffer.
pub(crate) struct HeaderPage<B>(B);

impl<B: AsRef<[u8]>> HeaderPage<B> {
    pub(crate) fn new(buf: B) -> Self {
        Self(buf)
    }

    /// The current root, or `None` if the tree is empty.
    pub(crate) fn root(&self) -> Option<PageId> {
        decode_page_ref(read_u64(self.0.as_ref(), OFF_ROOT))
    }

    /// Validates the magic and version stamps.
    pub(crate) fn validate(&self) -> Result<(), IndexError> {
        let data = self.0.as_ref();
        let magic = u32::from_le_bytes(data[OFF_MAGIC..OFF_MAGIC + 4].try_into().unwrap());
        if magic != MAGIC {
            return Err(IndexError::Corrupted(format!(
                "bad tree header magic {:#010x}",
                magic
            )));
        }
        let version = u32::from_le_bytes(data[OFF_VERSION..OFF_VERSION + 4].try_into().unwrap());
        if version != VERSION {
            return Err(IndexError::Corrupted(format!(
                "unsupported tree header version {}",
                version
            )));
        }
        Ok(())
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> HeaderPage<B> {
    /// Stamps a fresh header with an empty tree.
    pub(crate) fn init(buf: B) -> Self {
        let mut header = Self(buf);
        let data = header.0.as_mut();
        data[OFF_MAGIC..OFF_MAGIC + 4].copy_from_slice(&MAGIC.to_le_bytes());
        data[OFF_VERSION..OFF_VERSION + 4].copy_from_slice(&VERSION.to_le_bytes());
        write_u64(data, OFF_ROOT, encode_page_ref(None));
        header
    }

    pub(crate) fn set_root(&mut self, root: Option<PageId>) {
        write_u64(self.0.as_mut(), OFF_ROOT, encode_page_ref(root));
    }
}

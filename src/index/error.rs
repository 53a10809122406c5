//! Index errors.

use crate::storage::BufferError;

/// Errors from B+tree operations.
#[derive(Debug)]
pub enum IndexError {
    /// Buffer pool failure (pool exhausted, I/O error, ...).
    Buffer(BufferError),

    /// A page did not contain what the tree expected of it.
    Corrupted(String),
}

impl std::fmt::Display for IndexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexError::Buffer(e) => write!(f, "buffer pool error: {}", e),
            IndexError::Corrupted(msg) => write!(f, "corrupted index page: {}", msg),
        }
    }
}

impl std::error::Error for IndexError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            IndexError::Buffer(e) => Some(e),
            _ => None,
        }
    }
}

impl From<BufferError> for IndexError {
    fn from(e: BufferError) -> Self {
        IndexError::Buffer(e)
    }
}

//! Concurrent B+tree index over the buffer pool.
//!
//! The tree maps fixed-width 64-bit keys to record identifiers. Nodes are
//! pages: internal nodes route by separator keys, leaves hold the sorted
//! `(key, record id)` pairs and are chained left-to-right for ordered
//! scans. A dedicated header page tracks the root persistently.

pub mod error;
mod header;
mod internal;
pub mod iterator;
mod leaf;
mod node;
pub mod tree;

pub use error::IndexError;
pub use iterator::TreeIter;
pub use tree::{BPlusTree, TreeOptions};

use crate::storage::PageId;

/// Key type stored in the tree.
///
/// Fixed-width keys keep node arithmetic trivial; serialization of richer
/// key payloads belongs to the layer above.
pub type IndexKey = i64;

/// Global identifier for a record (page + slot), the value type stored in
/// tree leaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordId {
    /// Page containing the record.
    pub page_id: PageId,
    /// Slot within the page.
    pub slot: u16,
}

impl RecordId {
    /// Creates a new record identifier.
    pub fn new(page_id: PageId, slot: u16) -> Self {
        Self { page_id, slot }
    }
}
